//! A [`CommitCoordinatorClient`] backed by a remote commit-coordinator service.
//!
//! Writers stage commit files in the table's storage through the engine, and the service
//! ratifies them in version order. Backfilling copies ratified staged commits to their published
//! location and then tells the service how far the table has been published, so it can stop
//! tracking them.
//!
//! Tables opt in by naming the `"rest"` coordinator in their metadata, with a coordinator
//! configuration holding the service `url`, a bearer `token` and optionally `maxRetries`:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use cc_coordinator::RestCommitCoordinatorBuilder;
//! # use cc_kernel::coordinated_commits::CommitCoordinatorRegistry;
//! # fn main() -> cc_kernel::DeltaResult<()> {
//! CommitCoordinatorRegistry::global().register(Arc::new(RestCommitCoordinatorBuilder::new()))?;
//! # Ok(())
//! # }
//! ```
//!
//! [`CommitCoordinatorClient`]: cc_kernel::coordinated_commits::CommitCoordinatorClient

mod builder;
mod coordinator;

pub use builder::{RestCommitCoordinatorBuilder, MAX_RETRIES_KEY, TOKEN_KEY, URL_KEY};
pub use coordinator::{RestCommitCoordinator, TABLE_ID_KEY};
