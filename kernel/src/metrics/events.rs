//! Metric event types and utilities.

use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::Version;

/// Unique identifier for a metrics operation.
///
/// Each snapshot build gets a unique MetricId that is used to correlate all events from that
/// build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(Uuid);

impl MetricId {
    /// Generate a new unique MetricId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MetricId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metric events emitted while resolving snapshots and committing through a coordinator.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    /// Log segment loading completed (listing published commits and merging the log tail).
    LogSegmentLoaded {
        operation_id: MetricId,
        duration: Duration,
        num_commit_files: u64,
        /// How many of the commits came from the coordinator and are not yet backfilled
        num_staged_commits: u64,
    },

    /// Snapshot creation completed successfully.
    SnapshotCompleted {
        operation_id: MetricId,
        version: Version,
        total_duration: Duration,
    },

    /// Snapshot creation failed.
    SnapshotFailed {
        operation_id: MetricId,
        duration: Duration,
    },

    /// A coordinator accepted a commit.
    CoordinatedCommitCompleted {
        version: Version,
        duration: Duration,
    },

    /// A coordinator backfilled its commits up to and including `version`.
    BackfillCompleted {
        version: Version,
        num_files: u64,
        duration: Duration,
    },

    /// A backfill up to `version` that a coordinator started on its own failed. The commit that
    /// triggered it still stands.
    BackfillFailed { version: Version, duration: Duration },

    /// Storage list operation completed.
    /// These events track storage-level latencies and are emitted automatically
    /// by the default storage handler implementation.
    StorageListCompleted { duration: Duration, num_files: u64 },

    /// Storage copy operation completed.
    StorageCopyCompleted { duration: Duration },
}

impl fmt::Display for MetricEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricEvent::LogSegmentLoaded {
                operation_id,
                duration,
                num_commit_files,
                num_staged_commits,
            } => write!(
                f,
                "LogSegmentLoaded(id={operation_id}, duration={duration:?}, commits={num_commit_files}, staged={num_staged_commits})"
            ),
            MetricEvent::SnapshotCompleted {
                operation_id,
                version,
                total_duration,
            } => write!(
                f,
                "SnapshotCompleted(id={operation_id}, version={version}, duration={total_duration:?})"
            ),
            MetricEvent::SnapshotFailed {
                operation_id,
                duration,
            } => write!(f, "SnapshotFailed(id={operation_id}, duration={duration:?})"),
            MetricEvent::CoordinatedCommitCompleted { version, duration } => write!(
                f,
                "CoordinatedCommitCompleted(version={version}, duration={duration:?})"
            ),
            MetricEvent::BackfillCompleted {
                version,
                num_files,
                duration,
            } => write!(
                f,
                "BackfillCompleted(version={version}, files={num_files}, duration={duration:?})"
            ),
            MetricEvent::BackfillFailed { version, duration } => {
                write!(f, "BackfillFailed(version={version}, duration={duration:?})")
            }
            MetricEvent::StorageListCompleted {
                duration,
                num_files,
            } => write!(
                f,
                "StorageListCompleted(duration={duration:?}, files={num_files})"
            ),
            MetricEvent::StorageCopyCompleted { duration } => {
                write!(f, "StorageCopyCompleted(duration={duration:?})")
            }
        }
    }
}
