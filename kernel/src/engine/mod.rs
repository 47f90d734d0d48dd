//! Provides an engine implementation that implements the required traits. The tokio-backed
//! executors it runs on sit behind the `tokio` feature flag (on by default). See the
//! [`default`] module for more information.

pub mod default;
