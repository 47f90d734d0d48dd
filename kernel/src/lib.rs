//! # Coordinated commits kernel
//!
//! This crate implements the coordinated-commit subsystem of a Delta table engine: the protocol
//! by which independent writers append versions to a shared transaction log through an external
//! commit coordinator, and the snapshot path that consumes it to resolve a table's version,
//! timestamp and log segment.
//!
//! The entry points are:
//! - [`Snapshot`]: resolves a table at a version, including commits a coordinator has accepted
//!   but not yet backfilled into `_delta_log`.
//! - [`coordinated_commits`]: the [`CommitCoordinatorClient`] contract, the process-wide
//!   [`CommitCoordinatorRegistry`], and the table-scoped handler.
//! - [`transaction::Transaction`]: the write path, committing through a [`committer::Committer`].
//!
//! All I/O is performed through the [`Engine`] trait. A default implementation built on
//! `object_store` lives in [`engine::default`].
//!
//! [`CommitCoordinatorClient`]: coordinated_commits::CommitCoordinatorClient
//! [`CommitCoordinatorRegistry`]: coordinated_commits::CommitCoordinatorRegistry

use std::any::Any;
use std::sync::Arc;

use url::Url;

pub mod actions;
pub mod committer;
pub mod config;
pub mod coordinated_commits;
pub mod engine;
pub mod error;
pub mod log_path;
pub mod metrics;
pub mod snapshot;
pub mod table_features;
pub mod table_properties;
pub mod transaction;

pub(crate) mod listed_log_files;
pub(crate) mod log_segment;
pub(crate) mod path;
pub(crate) mod table_configuration;
pub(crate) mod utils;

pub use actions::Action;
pub use config::{ConfigurationProvider, EmptyConfigurationProvider, MapConfigurationProvider};
pub use error::{DeltaResult, Error};
pub use log_path::LogPath;
pub use snapshot::{Snapshot, SnapshotRef};

use metrics::MetricsReporter;

/// Delta table version is 8 byte unsigned int
pub type Version = u64;

/// The size of a file in bytes
pub type FileSize = u64;

/// The metadata that describes an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileMeta {
    /// The fully qualified path to the object
    pub location: Url,
    /// The last modified time as milliseconds since unix epoch
    pub last_modified: i64,
    /// The size in bytes of the object
    pub size: FileSize,
}

impl FileMeta {
    /// Create a new instance of `FileMeta`
    pub fn new(location: Url, last_modified: i64, size: u64) -> Self {
        Self {
            location,
            last_modified,
            size,
        }
    }
}

/// Extension trait that makes it easier to work with traits objects that implement [`Any`],
/// implemented automatically for any type that satisfies `Any`, `Send`, and `Sync`. In particular,
/// given some `trait T: Any + Send + Sync`, it allows upcasting `T` to `dyn Any + Send + Sync`,
/// which in turn allows downcasting the result to a concrete type.
pub trait AsAny: Any + Send + Sync {
    /// Obtains a `dyn Any` reference to the object.
    fn any_ref(&self) -> &(dyn Any + Send + Sync);

    /// Obtains an `Arc<dyn Any>` reference to the object.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Converts the object to `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    /// Convenient wrapper for [`std::any::type_name`], since [`Any`] does not provide it and
    /// [`Any::type_id`] is useless as a debugging aid (its `Debug` is just a mess of hex digits).
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn any_ref(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Provides file system related functionalities to the kernel.
///
/// Implementations must be safe to share across threads.
pub trait StorageHandler: AsAny {
    /// List the paths in the same directory that are lexicographically greater than
    /// (UTF-8 sorting) the given `path`. The result should also be sorted by the file name.
    ///
    /// If the path is directory-like (ends with '/'), the result should contain
    /// all the files in the directory.
    fn list_from(&self, path: &Url)
        -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<FileMeta>>>>;

    /// Copy a file atomically from source to destination. If the destination file already exists,
    /// it must return Err(Error::FileAlreadyExists).
    fn copy_atomic(&self, src: &Url, dest: &Url) -> DeltaResult<()>;

    /// Perform a HEAD request for the given file at a Url, returning the file metadata.
    ///
    /// If the file does not exist, this must return an `Err` with [`Error::FileNotFound`].
    fn head(&self, path: &Url) -> DeltaResult<FileMeta>;
}

/// Provides JSON handling functionality to the kernel. Commit files are newline-delimited JSON,
/// one [`Action`] per line.
pub trait JsonHandler: AsAny {
    /// Read and parse the JSON commit files at given locations. Each file yields the actions it
    /// contains, in file order, and files are returned in the order they were requested.
    fn read_json_files(
        &self,
        files: &[FileMeta],
    ) -> DeltaResult<Box<dyn Iterator<Item = DeltaResult<Vec<Action>>> + Send>>;

    /// Atomically (!) write a single JSON file. Each action is written as its own line. This
    /// method must fail with [`Error::FileAlreadyExists`] if the file already exists and
    /// `overwrite` is false.
    fn write_json_file(
        &self,
        path: &Url,
        data: Box<dyn Iterator<Item = DeltaResult<Action>> + Send + '_>,
        overwrite: bool,
    ) -> DeltaResult<()>;
}

/// The `Engine` trait encapsulates all the functionality an engine or connector needs to provide
/// to the kernel in order to resolve snapshots and commit to coordinated tables.
///
/// The coordinated-commit subsystem treats the engine as an opaque capability carrier: clients
/// and builders receive it, but never inspect it beyond these handlers.
pub trait Engine: AsAny {
    /// Get the connector provided [`StorageHandler`].
    fn storage_handler(&self) -> Arc<dyn StorageHandler>;

    /// Get the connector provided [`JsonHandler`].
    fn json_handler(&self) -> Arc<dyn JsonHandler>;

    /// Engine-level configuration. Consulted when mapping a commit coordinator name to a builder
    /// through `io.delta.kernel.commitCoordinatorBuilder.<name>.impl`.
    fn configuration(&self) -> Arc<dyn ConfigurationProvider> {
        Arc::new(EmptyConfigurationProvider)
    }

    /// Get the connector provided [`MetricsReporter`] for metrics collection.
    ///
    /// Returns an optional reporter that will receive metric events from kernel operations.
    /// The default implementation returns None, which means no metrics are reported.
    fn get_metrics_reporter(&self) -> Option<Arc<dyn MetricsReporter>> {
        None
    }
}
