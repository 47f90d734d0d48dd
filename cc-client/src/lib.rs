//! HTTP client for a remote commit-coordinator service.
//!
//! The service orders commits for the tables registered with it. Writers stage their commit
//! files in the table's storage themselves and only ask the service to ratify them:
//!
//! - `POST tables` registers a table and returns the id the service knows it by.
//! - `POST commits` ratifies a staged commit, or reports how far the table has been backfilled.
//! - `GET commits` lists the ratified commits the service still tracks.
//!
//! Every call is retried on server errors and transport failures with linear backoff (see
//! [`ClientConfig`]). A `409 Conflict` answer to a commit means another writer got the version
//! first, and is reported as [`Error::CommitConflict`] without retrying.
//!
//! # Example
//!
//! ```no_run
//! # use cc_client::{ClientConfig, CoordinatorClient};
//! # use cc_client::models::CommitsRequest;
//! # async fn example() -> cc_client::Result<()> {
//! let config = ClientConfig::build("https://coordinator.example.com/api/", "token").build()?;
//! let client = CoordinatorClient::new(config)?;
//! let commits = client
//!     .get_commits(CommitsRequest::new("table-id", "s3://bucket/table/").with_start_version(5))
//!     .await?;
//! println!("latest version: {}", commits.latest_table_version);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod models;

pub use client::CoordinatorClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
