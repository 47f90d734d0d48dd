//! [`ListedLogFiles`] is a struct holding the result of listing the delta log. The only listing
//! API is [`ListedLogFiles::list`], which lists published commits between a start and end
//! version and merges in a `log_tail` of commits the caller already knows about (typically the
//! unbackfilled commits a commit coordinator reported).
//!
//! After listing, one can leverage the [`ListedLogFiles`] to construct a [`LogSegment`].
//!
//! [`LogSegment`]: crate::log_segment::LogSegment

use itertools::Itertools;
use tracing::debug;
use url::Url;

use crate::path::{LogPathFileType, ParsedLogPath};
use crate::{DeltaResult, StorageHandler, Version};

/// Represents the set of log files found during a listing operation in the Delta log directory.
///
/// - `ascending_commit_files`: All commit and staged commit files found, sorted by version. May
///   contain gaps.
/// - `latest_checkpoint_version`: The highest version any checkpoint file was listed at. Commit
///   only log segments use this to reject tables whose early commits were cleaned up.
/// - `max_published_version`: The highest published commit file version, or `None` if no
///   published commits were found.
#[derive(Debug, Default)]
pub(crate) struct ListedLogFiles {
    ascending_commit_files: Vec<ParsedLogPath>,
    latest_checkpoint_version: Option<Version>,
    max_published_version: Option<Version>,
}

impl ListedLogFiles {
    /// Files that are already known, e.g. when extending an existing log segment.
    pub(crate) fn from_commits(
        ascending_commit_files: Vec<ParsedLogPath>,
        max_published_version: Option<Version>,
    ) -> Self {
        ListedLogFiles {
            ascending_commit_files,
            latest_checkpoint_version: None,
            max_published_version,
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<ParsedLogPath>, Option<Version>, Option<Version>) {
        (
            self.ascending_commit_files,
            self.latest_checkpoint_version,
            self.max_published_version,
        )
    }

    pub(crate) fn ascending_commit_files(&self) -> &[ParsedLogPath] {
        &self.ascending_commit_files
    }

    pub(crate) fn max_published_version(&self) -> Option<Version> {
        self.max_published_version
    }

    /// Lists commit files over versions [start_version, end_version], taking into account the
    /// `log_tail`. If there are fewer files than requested (e.g. `end_version` is past the end of
    /// the log), the result will simply end before reaching `end_version`.
    ///
    /// The `log_tail` must strictly adhere to being a 'tail': it is a contiguous cover of
    /// versions `X..=Y` where `Y` is the latest version of the table. It may hold published or
    /// staged commits. Where it overlaps with commits listed from storage, the `log_tail` takes
    /// precedence. Storage is not listed at all when the tail covers the whole requested range.
    ///
    /// If `start_version` is not specified, the listing begins from version 0. If `end_version`
    /// is not specified, files up to the most recent version are included.
    pub(crate) fn list(
        storage: &dyn StorageHandler,
        log_root: &Url,
        log_tail: Vec<ParsedLogPath>,
        start_version: Option<Version>,
        end_version: Option<Version>,
    ) -> DeltaResult<Self> {
        debug_assert!(
            log_tail.iter().all(ParsedLogPath::is_commit),
            "log_tail should only contain commits"
        );

        let start_version = start_version.unwrap_or(0);
        let end_version = end_version.unwrap_or(Version::MAX);
        let tail_start = log_tail.first().map(|first| first.version);

        let mut latest_checkpoint_version = None;
        let mut max_published_version = None;
        let mut commits: Vec<ParsedLogPath> = Vec::new();

        if tail_start.is_none_or(|tail_start| start_version < tail_start) {
            let start_from = log_root.join(&format!("{start_version:020}"))?;
            let listed: Vec<ParsedLogPath> = storage
                .list_from(&start_from)?
                .map(|meta| ParsedLogPath::try_from(meta?))
                // staged commits are only valid when a coordinator vouches for them
                .filter_map_ok(|path_opt| path_opt.filter(ParsedLogPath::should_list))
                .take_while(|path_res| match path_res {
                    Ok(path) => path.version <= end_version,
                    Err(_) => true,
                })
                .try_collect()?;

            for path in listed {
                match path.file_type {
                    LogPathFileType::Commit => {
                        max_published_version = max_published_version.max(Some(path.version));
                        // the tail wins from its first version on
                        if tail_start.is_none_or(|tail_start| path.version < tail_start) {
                            commits.push(path);
                        }
                    }
                    LogPathFileType::Checkpoint => {
                        latest_checkpoint_version =
                            latest_checkpoint_version.max(Some(path.version));
                    }
                    LogPathFileType::StagedCommit
                    | LogPathFileType::Crc
                    | LogPathFileType::Unknown => {}
                }
            }
        }

        let tail: Vec<ParsedLogPath> = log_tail
            .into_iter()
            .filter(|entry| (start_version..=end_version).contains(&entry.version))
            .collect();
        let max_published_in_tail = tail
            .iter()
            .filter(|entry| entry.file_type == LogPathFileType::Commit)
            .map(|entry| entry.version)
            .max();
        max_published_version = max_published_version.max(max_published_in_tail);

        debug!(
            "listed {} commits from {log_root} and {} from the log tail",
            commits.len(),
            tail.len()
        );
        commits.extend(tail);

        Ok(ListedLogFiles {
            ascending_commit_files: commits,
            latest_checkpoint_version,
            max_published_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use object_store::ObjectStore;

    use super::*;
    use crate::utils::test_utils::{delta_path_for_version, setup_test};
    use crate::{Engine, FileMeta};

    async fn put(store: &dyn ObjectStore, version: Version, suffix: &str) {
        store
            .put(&delta_path_for_version(version, suffix), "{}".into())
            .await
            .unwrap();
    }

    fn log_root(table_root: &Url) -> Url {
        table_root.join("_delta_log/").unwrap()
    }

    fn staged_tail(log_root: &Url, versions: impl IntoIterator<Item = Version>) -> Vec<ParsedLogPath> {
        versions
            .into_iter()
            .map(|v| {
                let url = log_root
                    .join(&format!(
                        "_staged_commits/{v:020}.5b4c3cbd-40b6-4bd4-9c1c-3ef6ad12e9b0.json"
                    ))
                    .unwrap();
                ParsedLogPath::try_from(FileMeta::new(url, 0, 0))
                    .unwrap()
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_skips_staged_commits_and_tracks_checkpoints() {
        let (store, engine, table_root) = setup_test();
        for v in 0..3 {
            put(store.as_ref(), v, "json").await;
        }
        put(store.as_ref(), 1, "checkpoint.parquet").await;
        put(store.as_ref(), 2, "crc").await;
        store
            .put(
                &object_store::path::Path::from(
                    "_delta_log/_staged_commits/00000000000000000003.5b4c3cbd-40b6-4bd4-9c1c-3ef6ad12e9b0.json",
                ),
                "{}".into(),
            )
            .await
            .unwrap();

        let listed = ListedLogFiles::list(
            engine.storage_handler().as_ref(),
            &log_root(&table_root),
            vec![],
            None,
            None,
        )
        .unwrap();
        let versions: Vec<_> = listed
            .ascending_commit_files()
            .iter()
            .map(|p| p.version)
            .collect();
        assert_eq!(versions, vec![0, 1, 2]);
        assert_eq!(listed.max_published_version(), Some(2));
        let (_, checkpoint, _) = listed.into_parts();
        assert_eq!(checkpoint, Some(1));
    }

    #[tokio::test]
    async fn test_list_bounds() {
        let (store, engine, table_root) = setup_test();
        for v in 0..5 {
            put(store.as_ref(), v, "json").await;
        }
        let listed = ListedLogFiles::list(
            engine.storage_handler().as_ref(),
            &log_root(&table_root),
            vec![],
            Some(1),
            Some(3),
        )
        .unwrap();
        let versions: Vec<_> = listed
            .ascending_commit_files()
            .iter()
            .map(|p| p.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_log_tail_takes_precedence() {
        let (store, engine, table_root) = setup_test();
        for v in 0..3 {
            put(store.as_ref(), v, "json").await;
        }
        let log_root = log_root(&table_root);
        let listed = ListedLogFiles::list(
            engine.storage_handler().as_ref(),
            &log_root,
            staged_tail(&log_root, 2..5),
            None,
            None,
        )
        .unwrap();
        let files: Vec<_> = listed
            .ascending_commit_files()
            .iter()
            .map(|p| (p.version, p.file_type.clone()))
            .collect();
        assert_eq!(
            files,
            vec![
                (0, LogPathFileType::Commit),
                (1, LogPathFileType::Commit),
                (2, LogPathFileType::StagedCommit),
                (3, LogPathFileType::StagedCommit),
                (4, LogPathFileType::StagedCommit),
            ]
        );
        // the published commit at 2 was shadowed but still counts as published
        assert_eq!(listed.max_published_version(), Some(2));
    }

    #[tokio::test]
    async fn test_log_tail_covering_range_skips_listing() {
        let (_store, engine, table_root) = setup_test();
        let log_root = log_root(&table_root);
        let listed = ListedLogFiles::list(
            engine.storage_handler().as_ref(),
            &log_root,
            staged_tail(&log_root, 0..3),
            None,
            Some(1),
        )
        .unwrap();
        assert_eq!(listed.ascending_commit_files().len(), 2);
        assert_eq!(listed.max_published_version(), None);
    }
}
