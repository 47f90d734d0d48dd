//! Definitions of errors that the kernel can encounter

use std::backtrace::{Backtrace, BacktraceStatus};

use crate::Version;

/// A [`std::result::Result`] that has the kernel [`Error`] as the error variant
pub type DeltaResult<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that the kernel can run into
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// This is an error that includes a backtrace. To have a particular type of error include such
    /// backtrace (when RUST_BACKTRACE is set), create the variant with
    /// `Error::MyError(...).with_backtrace()`.
    #[error("{source}\n{backtrace}")]
    Backtraced {
        source: Box<Self>,
        backtrace: Box<Backtrace>,
    },

    /// A generic error with a message
    #[error("Generic kernel error: {0}")]
    Generic(String),

    /// A generic error wrapping another error
    #[error("Generic error: {source}")]
    GenericError {
        /// Source error
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// An error performing operations on an object store
    #[error(transparent)]
    ObjectStore(object_store::Error),

    /// An error converting a URL into an object store path
    #[error("Object store path error: {0}")]
    ObjectStorePath(#[from] object_store::path::Error),

    /// An error performing file io
    #[error(transparent)]
    IOError(std::io::Error),

    /// An internal error that means kernel found an unexpected situation, which is likely a bug
    #[error("Internal error {0}. This is a kernel bug, please report.")]
    InternalError(String),

    /// A file could not be found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// A file already exists and the write was not allowed to overwrite it
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    /// A url could not be parsed
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Deserializing or serializing JSON failed
    #[error(transparent)]
    MalformedJson(serde_json::Error),

    /// A path in the log directory is not a valid log path
    #[error("Invalid log path: {0}")]
    InvalidLogPath(String),

    /// The table location is not valid
    #[error("Invalid table location: {0}.")]
    InvalidTableLocation(String),

    /// No metadata action was found while replaying the log
    #[error("No table metadata found in delta log.")]
    MissingMetadata,

    /// No protocol action was found while replaying the log
    #[error("No protocol found in delta log.")]
    MissingProtocol,

    /// The protocol action is malformed
    #[error("Invalid protocol action in the delta log: {0}")]
    InvalidProtocol(String),

    /// The operation or table feature is not supported
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// No commit coordinator is registered (or configured) under the given name
    #[error("Unknown commit-coordinator: {0}")]
    UnknownCommitCoordinator(String),

    /// The table names a commit coordinator but its coordinated-commits configuration cannot be
    /// parsed
    #[error("Invalid coordinated-commits configuration: {0}")]
    InvalidCoordinatedCommitsConfig(String),

    /// A builder was registered under a name that already has one
    #[error("commit-coordinator {name} is already registered with builder {existing}")]
    CommitCoordinatorAlreadyRegistered {
        /// The coordinator name
        name: String,
        /// Type name of the builder that already owns the name
        existing: String,
    },

    /// The coordinator refused the commit because `version` is not the next version. The caller
    /// can recover by re-reading the table state and retrying at a later version.
    #[error("Commit conflict at version {version}: {message}")]
    CommitConflict {
        /// The version that was attempted
        version: Version,
        /// The latest version the coordinator knows about, when it reported one
        latest_version: Option<Version>,
        /// Human readable details from the coordinator
        message: String,
    },

    /// The coordinator rejected the commit for a reason retrying cannot fix: malformed input,
    /// unregistered table, mismatched table configuration.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// The coordinator could not be reached. Retry policy belongs to the caller.
    #[error("Commit coordinator unavailable: {0}")]
    CommitCoordinatorUnavailable(String),

    /// Backfill was requested beyond the latest version the coordinator has accepted
    #[error("Cannot backfill to version {version}: latest commit version is {latest_version:?}")]
    InvalidBackfillVersion {
        /// The version backfill was requested up to
        version: Version,
        /// The latest version accepted by the coordinator, if any
        latest_version: Option<Version>,
    },

    /// In-commit timestamps are enabled but the commit at this version has no commit info or no
    /// `inCommitTimestamp` in it. The log is corrupt; file modification times are not a substitute.
    #[error("In-Commit Timestamp not found in commit file for version {0}: the delta log is corrupt")]
    MissingInCommitTimestamp(Version),
}

// Convenience constructors for Error types that take a String argument
impl Error {
    pub fn generic_err(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::GenericError {
            source: source.into(),
        }
    }
    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }
    pub fn file_not_found(path: impl ToString) -> Self {
        Self::FileNotFound(path.to_string())
    }
    pub fn invalid_log_path(msg: impl ToString) -> Self {
        Self::InvalidLogPath(msg.to_string())
    }
    pub fn invalid_table_location(location: impl ToString) -> Self {
        Self::InvalidTableLocation(location.to_string())
    }
    pub fn internal_error(msg: impl ToString) -> Self {
        Self::InternalError(msg.to_string()).with_backtrace()
    }
    pub fn invalid_protocol(msg: impl ToString) -> Self {
        Self::InvalidProtocol(msg.to_string())
    }
    pub fn unsupported(msg: impl ToString) -> Self {
        Self::Unsupported(msg.to_string())
    }
    pub fn unknown_commit_coordinator(name: impl ToString) -> Self {
        Self::UnknownCommitCoordinator(name.to_string())
    }
    pub fn invalid_coordinated_commits_config(msg: impl ToString) -> Self {
        Self::InvalidCoordinatedCommitsConfig(msg.to_string())
    }
    pub fn commit_failed(msg: impl ToString) -> Self {
        Self::CommitFailed(msg.to_string())
    }
    pub fn commit_conflict(
        version: Version,
        latest_version: Option<Version>,
        msg: impl ToString,
    ) -> Self {
        Self::CommitConflict {
            version,
            latest_version,
            message: msg.to_string(),
        }
    }
    pub fn commit_coordinator_unavailable(msg: impl ToString) -> Self {
        Self::CommitCoordinatorUnavailable(msg.to_string())
    }

    /// Capture a backtrace for this error, if backtraces are enabled.
    pub fn with_backtrace(self) -> Self {
        let backtrace = Backtrace::capture();
        match backtrace.status() {
            BacktraceStatus::Captured => Self::Backtraced {
                source: Box::new(self),
                backtrace: Box::new(backtrace),
            },
            _ => self,
        }
    }

    /// The error with any captured backtrace stripped off.
    pub fn without_backtrace(&self) -> &Self {
        match self {
            Self::Backtraced { source, .. } => source.without_backtrace(),
            e => e,
        }
    }

    /// Whether the failed operation may succeed if attempted again. Conflicts are retryable after
    /// re-reading table state; io and transport failures may succeed as is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.without_backtrace(),
            Self::CommitConflict { .. }
                | Self::CommitCoordinatorUnavailable(_)
                | Self::IOError(_)
                | Self::ObjectStore(_)
        )
    }
}

macro_rules! from_with_backtrace(
    ( $(($error_type: ty, $error_variant:ident)), * ) => {
        $(
            impl From<$error_type> for Error {
                fn from(value: $error_type) -> Self {
                    Self::$error_variant(value).with_backtrace()
                }
            }
        )*
    };
);

from_with_backtrace!(
    (serde_json::Error, MalformedJson),
    (std::io::Error, IOError)
);

impl From<object_store::Error> for Error {
    fn from(value: object_store::Error) -> Self {
        match value {
            object_store::Error::NotFound { path, .. } => Self::file_not_found(path),
            err => Self::ObjectStore(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::commit_conflict(3, Some(3), "taken").is_retryable());
        assert!(Error::commit_coordinator_unavailable("down").is_retryable());
        assert!(!Error::commit_failed("bad input").is_retryable());
        assert!(!Error::unknown_commit_coordinator("nope").is_retryable());

        // a backtrace wrapper must not change the classification
        let wrapped = Error::Backtraced {
            source: Box::new(Error::commit_coordinator_unavailable("down")),
            backtrace: Box::new(Backtrace::disabled()),
        };
        assert!(wrapped.is_retryable());
    }

    #[test]
    fn test_object_store_not_found_maps_to_file_not_found() {
        let err: Error = object_store::Error::NotFound {
            path: "_delta_log/00000000000000000001.json".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(matches!(err, Error::FileNotFound(path) if path.ends_with("1.json")));
    }

    #[test]
    fn test_error_messages() {
        let err = Error::unknown_commit_coordinator("dynamodb");
        assert_eq!(err.to_string(), "Unknown commit-coordinator: dynamodb");

        let err = Error::CommitCoordinatorAlreadyRegistered {
            name: "in-memory".to_string(),
            existing: "InMemoryCommitCoordinatorBuilder".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "commit-coordinator in-memory is already registered with builder InMemoryCommitCoordinatorBuilder"
        );
    }
}
