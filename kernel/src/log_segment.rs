//! Represents a segment of a delta log. [`LogSegment`] wraps the set of commit files (published
//! and, for coordinated tables, staged) that make up a table version.
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use url::Url;

use crate::actions::{Action, CommitInfo, Metadata, Protocol};
use crate::listed_log_files::ListedLogFiles;
use crate::metrics::{MetricEvent, MetricId, MetricsReporter};
use crate::path::{LogPathFileType, ParsedLogPath};
use crate::utils::require;
use crate::{DeltaResult, Engine, Error, FileMeta, StorageHandler, Version};

/// A [`LogSegment`] represents a contiguous section of the log starting at version 0, and
/// guarantees the following:
///     1. Commit file versions will not have any gaps between them.
///     2. There is at least one commit, and the last one is at `end_version`.
///
/// Checkpoints are never read. A table whose early commits were cleaned up after a checkpoint
/// cannot be loaded.
///
/// [`LogSegment`] is used in [`Snapshot`] when built with [`LogSegment::for_snapshot`].
///
/// [`Snapshot`]: crate::snapshot::Snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogSegment {
    pub end_version: Version,
    pub log_root: Url,
    /// Sorted commit files in the log segment (ascending)
    pub ascending_commit_files: Vec<ParsedLogPath>,
    /// The maximum published commit version found during listing, if available.
    /// Note that this published commit file may not be included in
    /// [LogSegment::ascending_commit_files] if a staged commit for the same version took
    /// priority over it.
    pub max_published_version: Option<Version>,
}

impl LogSegment {
    pub(crate) fn try_new(
        listed_files: ListedLogFiles,
        log_root: Url,
        end_version: Option<Version>,
    ) -> DeltaResult<Self> {
        let (ascending_commit_files, latest_checkpoint_version, max_published_version) =
            listed_files.into_parts();

        // Ensure commit file versions are contiguous
        require!(
            ascending_commit_files
                .windows(2)
                .all(|cfs| cfs[0].version + 1 == cfs[1].version),
            Error::generic(format!(
                "Expected ordered contiguous commit files {:?}",
                ascending_commit_files
                    .iter()
                    .map(|f| f.location.location.as_str())
                    .collect::<Vec<_>>()
            ))
        );

        let first_version = ascending_commit_files.first().map(|commit| commit.version);
        if first_version != Some(0) {
            if let Some(checkpoint_version) = latest_checkpoint_version {
                return Err(Error::unsupported(format!(
                    "Table at {log_root} needs checkpoint {checkpoint_version} to be read, \
                     but only commit files are supported"
                )));
            }
            return match first_version {
                Some(version) => Err(Error::generic(format!(
                    "Log segment must start at version 0, found first commit {version}"
                ))),
                None => Err(Error::generic(format!("No files in log segment {log_root}"))),
            };
        }

        let effective_version = ascending_commit_files
            .last()
            .ok_or(Error::generic("No files in log segment"))?
            .version;
        if let Some(end_version) = end_version {
            require!(
                effective_version == end_version,
                Error::generic(format!(
                    "LogSegment end version {effective_version} not the same as the specified end version {end_version}"
                ))
            );
        }

        Ok(LogSegment {
            end_version: effective_version,
            log_root,
            ascending_commit_files,
            max_published_version,
        })
    }

    /// Constructs a [`LogSegment`] to be used for [`Snapshot`]. For a `Snapshot` at version `n`
    /// the segment holds every commit from 0 up to and including `n`.
    ///
    /// - `log_tail`: commits the caller already knows about, typically the unbackfilled commits
    ///   reported by the table's commit coordinator. They take precedence over listed files.
    /// - `time_travel_version`: The version of the log that the Snapshot will be at.
    ///
    /// Reports metrics: `LogSegmentLoaded`.
    ///
    /// [`Snapshot`]: crate::snapshot::Snapshot
    pub(crate) fn for_snapshot(
        storage: &dyn StorageHandler,
        log_root: Url,
        log_tail: Vec<ParsedLogPath>,
        time_travel_version: impl Into<Option<Version>>,
        reporter: Option<&Arc<dyn MetricsReporter>>,
        operation_id: Option<MetricId>,
    ) -> DeltaResult<Self> {
        let operation_id = operation_id.unwrap_or_default();
        let start = Instant::now();

        let time_travel_version = time_travel_version.into();
        let listed_files =
            ListedLogFiles::list(storage, &log_root, log_tail, None, time_travel_version)?;
        let log_segment = LogSegment::try_new(listed_files, log_root, time_travel_version)?;

        log_segment.report_loaded(reporter, operation_id, start.elapsed());
        Ok(log_segment)
    }

    /// This segment with `log_tail` replacing its commits from the tail's first version on,
    /// ending at `end_version` (or wherever the commits end when `None`). Storage is not listed
    /// again, so the tail must connect to this segment's commits.
    pub(crate) fn with_tail(
        &self,
        log_tail: Vec<ParsedLogPath>,
        end_version: Option<Version>,
    ) -> DeltaResult<Self> {
        let end = end_version.unwrap_or(Version::MAX);
        let tail_start = log_tail.first().map(|commit| commit.version);
        let max_published_version = self
            .ascending_commit_files
            .iter()
            .chain(&log_tail)
            .filter(|commit| commit.file_type == LogPathFileType::Commit && commit.version <= end)
            .map(|commit| commit.version)
            .max();
        let ascending_commit_files = self
            .ascending_commit_files
            .iter()
            .filter(|commit| tail_start.is_none_or(|tail_start| commit.version < tail_start))
            .cloned()
            .chain(log_tail)
            .filter(|commit| commit.version <= end)
            .collect();
        LogSegment::try_new(
            ListedLogFiles::from_commits(ascending_commit_files, max_published_version),
            self.log_root.clone(),
            end_version,
        )
    }

    /// Log and report that this segment was loaded.
    pub(crate) fn report_loaded(
        &self,
        reporter: Option<&Arc<dyn MetricsReporter>>,
        operation_id: MetricId,
        duration: Duration,
    ) {
        let num_staged_commits = self.num_staged_commits();
        debug!(
            "loaded log segment at version {} ({} commits, {num_staged_commits} staged)",
            self.end_version,
            self.ascending_commit_files.len(),
        );
        reporter.inspect(|r| {
            r.report(MetricEvent::LogSegmentLoaded {
                operation_id,
                duration,
                num_commit_files: self.ascending_commit_files.len() as u64,
                num_staged_commits,
            });
        });
    }

    /// The commit file at `end_version`.
    pub(crate) fn last_commit(&self) -> DeltaResult<&ParsedLogPath> {
        self.ascending_commit_files
            .last()
            .ok_or_else(|| Error::internal_error("Log segment has no commit files"))
    }

    /// The commit file for `version`, if it is part of this segment.
    pub(crate) fn commit_file(&self, version: Version) -> Option<&ParsedLogPath> {
        // versions are contiguous from 0, so the version is the index
        let commit = self.ascending_commit_files.get(usize::try_from(version).ok()?)?;
        (commit.version == version).then_some(commit)
    }

    /// The modification time of the last commit file, used as the snapshot timestamp when
    /// in-commit timestamps are not enabled.
    pub(crate) fn last_commit_timestamp(&self) -> DeltaResult<i64> {
        Ok(self.last_commit()?.location.last_modified)
    }

    pub(crate) fn num_staged_commits(&self) -> u64 {
        self.ascending_commit_files
            .iter()
            .filter(|commit| commit.file_type == LogPathFileType::StagedCommit)
            .count() as u64
    }

    /// Read the `commitInfo` action of the commit at `version`, if the commit has one.
    pub(crate) fn read_commit_info(
        &self,
        engine: &dyn Engine,
        version: Version,
    ) -> DeltaResult<Option<CommitInfo>> {
        let commit = self.commit_file(version).ok_or_else(|| {
            Error::generic(format!(
                "Version {version} is not part of the log segment ending at {}",
                self.end_version
            ))
        })?;
        Ok(commit
            .read_actions(engine)?
            .into_iter()
            .find_map(|action| match action {
                Action::CommitInfo(commit_info) => Some(commit_info),
                _ => None,
            }))
    }

    /// Get the most up-to-date Protocol and Metadata actions
    pub(crate) fn read_metadata(&self, engine: &dyn Engine) -> DeltaResult<(Metadata, Protocol)> {
        match protocol_and_metadata(engine, self.ascending_commit_files.iter().rev())? {
            (Some(m), Some(p)) => Ok((m, p)),
            (None, Some(_)) => Err(Error::MissingMetadata),
            (Some(_), None) | (None, None) => Err(Error::MissingProtocol),
        }
    }
}

// Do a lightweight protocol+metadata log replay over `newest_first` commits, stopping as soon as
// both have been seen. The first occurrence of each wins.
pub(crate) fn protocol_and_metadata<'a>(
    engine: &dyn Engine,
    newest_first: impl Iterator<Item = &'a ParsedLogPath>,
) -> DeltaResult<(Option<Metadata>, Option<Protocol>)> {
    let files: Vec<FileMeta> = newest_first.map(|f| f.location.clone()).collect();
    let (mut metadata_opt, mut protocol_opt) = (None, None);
    for actions in engine.json_handler().read_json_files(&files)? {
        for action in actions? {
            match action {
                Action::Metadata(metadata) if metadata_opt.is_none() => {
                    metadata_opt = Some(metadata)
                }
                Action::Protocol(protocol) if protocol_opt.is_none() => {
                    protocol_opt = Some(protocol)
                }
                _ => {}
            }
        }
        if metadata_opt.is_some() && protocol_opt.is_some() {
            // we've found both, we can stop
            break;
        }
    }
    Ok((metadata_opt, protocol_opt))
}
