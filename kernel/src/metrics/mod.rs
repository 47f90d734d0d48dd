//! Metrics collection for coordinated commits.
//!
//! Snapshot resolution, coordinated commits and backfills emit [`MetricEvent`]s through the
//! engine's optional [`MetricsReporter`]. A snapshot build is assigned a [`MetricId`] when it
//! starts, and the events it produces carry that id so reporters can correlate them.
//!
//! # Example: a reporter that logs coordinator activity
//!
//! ```
//! use cc_kernel::metrics::{MetricsReporter, MetricEvent};
//!
//! #[derive(Debug)]
//! struct CommitLogger;
//!
//! impl MetricsReporter for CommitLogger {
//!     fn report(&self, event: MetricEvent) {
//!         match event {
//!             MetricEvent::CoordinatedCommitCompleted { version, duration, .. } => {
//!                 println!("committed v{version} in {duration:?}");
//!             }
//!             MetricEvent::BackfillCompleted { version, .. } => {
//!                 println!("backfilled through v{version}");
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! # Storage Metrics
//!
//! `DefaultEngine` with a reporter also emits `StorageListCompleted` and
//! `StorageCopyCompleted` from its storage handler. These are not tied to any operation id.

mod events;
mod reporter;

pub use events::{MetricEvent, MetricId};
pub use reporter::MetricsReporter;
#[cfg(test)]
pub(crate) use reporter::test_utils;
