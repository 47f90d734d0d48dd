//! Public-facing [`LogPath`] type for naming the commit files of a log tail.

use url::Url;

use crate::path::{LogPathFileType, LogRoot, ParsedLogPath, STAGED_COMMITS_DIR};
use crate::utils::require;
use crate::{DeltaResult, Error, FileMeta, FileSize, Version};

/// A path to a commit file of a delta table, either published (`_delta_log/{version}.json`) or
/// staged by a commit coordinator (`_delta_log/_staged_commits/{version}.{uuid}.json`).
///
/// Callers that already know the newest commits of a table hand them to
/// [`SnapshotBuilder::with_log_tail`] as `LogPath`s.
///
/// [`SnapshotBuilder::with_log_tail`]: crate::snapshot::SnapshotBuilder::with_log_tail
#[derive(Debug, Clone, PartialEq)]
pub struct LogPath(ParsedLogPath);

impl From<LogPath> for ParsedLogPath {
    fn from(p: LogPath) -> Self {
        p.0
    }
}

impl LogPath {
    /// Parse a `FileMeta` into a `LogPath`. Fails if the location is not a published or staged
    /// commit file.
    pub fn try_new(file_meta: FileMeta) -> DeltaResult<Self> {
        let location = file_meta.location.clone();
        let parsed = ParsedLogPath::try_from(file_meta)?
            .ok_or_else(|| Error::invalid_log_path(&location))?;
        require!(parsed.is_commit(), Error::invalid_log_path(&location));
        Ok(Self(parsed))
    }

    /// The published commit file of `version` under `table_root`, which must end with '/'.
    pub fn published_commit(
        table_root: Url,
        version: Version,
        last_modified: i64,
        size: FileSize,
    ) -> DeltaResult<LogPath> {
        let location = LogRoot::new(table_root)?.new_commit_path(version)?.location;
        LogPath::try_new(FileMeta::new(location, last_modified, size))
    }

    /// A staged commit file named `filename` (`{version:020}.{uuid}.json`) under `table_root`,
    /// which must end with '/'.
    pub fn staged_commit(
        table_root: Url,
        filename: &str,
        last_modified: i64,
        size: FileSize,
    ) -> DeltaResult<LogPath> {
        let log_root = LogRoot::new(table_root)?;
        let location = log_root
            .log_url()
            .join(STAGED_COMMITS_DIR)
            .and_then(|url| url.join(filename))
            .map_err(|_| Error::invalid_log_path(filename))?;
        let path = LogPath::try_new(FileMeta::new(location, last_modified, size))?;
        require!(path.is_staged(), Error::invalid_log_path(filename));
        Ok(path)
    }

    pub fn version(&self) -> Version {
        self.0.version
    }

    pub fn location(&self) -> &FileMeta {
        &self.0.location
    }

    /// Whether this commit still lives in the coordinator's staging area.
    pub fn is_staged(&self) -> bool {
        self.0.file_type == LogPathFileType::StagedCommit
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    const FILENAME: &str = "00000000000000000010.3a0d65cd-4a56-49a8-937b-95f9e3ee90e5.json";

    #[test]
    fn test_staged_commit_path_creation() {
        let table_root = Url::from_str("s3://my-bucket/my-table/").unwrap();
        let log_path = LogPath::staged_commit(table_root, FILENAME, 1234567890, 1024).unwrap();

        let expected = Url::from_str(&format!(
            "s3://my-bucket/my-table/_delta_log/_staged_commits/{FILENAME}"
        ))
        .unwrap();
        assert_eq!(log_path.location(), &FileMeta::new(expected, 1234567890, 1024));
        assert_eq!(log_path.version(), 10);
        assert!(log_path.is_staged());
    }

    #[test]
    fn test_published_commit_path_creation() {
        let table_root = Url::from_str("memory:///table/").unwrap();
        let log_path = LogPath::published_commit(table_root, 3, 7, 11).unwrap();
        assert_eq!(
            log_path.location().location.as_str(),
            "memory:///table/_delta_log/00000000000000000003.json"
        );
        assert!(!log_path.is_staged());
    }

    #[test]
    fn test_log_path_rejections() {
        // table root not ending with '/'
        let table_root = Url::from_str("s3://my-bucket/my-table").unwrap();
        let err = LogPath::staged_commit(table_root, FILENAME, 0, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidTableLocation(_)));

        let table_root = Url::from_str("s3://my-bucket/my-table/").unwrap();
        for filename in [
            "subdir/00000000000000000010.3a0d65cd-4a56-49a8-937b-95f9e3ee90e5.json",
            "00000000000000000010.not-a-uuid.json",
            "000000000000000000aa.3a0d65cd-4a56-49a8-937b-95f9e3ee90e5.json",
            "00000000000000000010.3a0d65cd-4a56-49a8-937b-95f9e3ee90e5.parquet",
            "00000000000000000010.json",
        ] {
            assert!(
                LogPath::staged_commit(table_root.clone(), filename, 0, 0).is_err(),
                "{filename} should not be a staged commit"
            );
        }

        // checkpoints are not commits
        let checkpoint =
            Url::from_str("s3://my-bucket/my-table/_delta_log/00000000000000000010.checkpoint.parquet")
                .unwrap();
        assert!(LogPath::try_new(FileMeta::new(checkpoint, 0, 0)).is_err());
    }
}
