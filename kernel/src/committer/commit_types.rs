//! Commit metadata types for the committer module.

use url::Url;

use crate::coordinated_commits::UpdatedActions;
use crate::path::LogRoot;
use crate::{DeltaResult, FileMeta, Version};

/// `CommitMetadata` bundles the metadata about a commit operation: where the commit goes, its
/// version and timestamp, and how it changes the table's protocol and metadata.
///
/// Note that this struct cannot be constructed. It is handed to the [`Committer`] (in the
/// [`commit`] method) by the kernel when a transaction is being committed.
///
/// [`Committer`]: super::Committer
/// [`commit`]: super::Committer::commit
#[derive(Debug)]
pub struct CommitMetadata {
    pub(crate) log_root: LogRoot,
    pub(crate) version: Version,
    pub(crate) in_commit_timestamp: i64,
    pub(crate) max_published_version: Option<Version>,
    pub(crate) updated_actions: UpdatedActions,
}

impl CommitMetadata {
    pub(crate) fn new(
        log_root: LogRoot,
        version: Version,
        in_commit_timestamp: i64,
        max_published_version: Option<Version>,
        updated_actions: UpdatedActions,
    ) -> Self {
        Self {
            log_root,
            version,
            in_commit_timestamp,
            max_published_version,
            updated_actions,
        }
    }

    /// The commit path is the absolute path (e.g. s3://bucket/table/_delta_log/{version}.json) to
    /// the published delta file for this commit.
    pub fn published_commit_path(&self) -> DeltaResult<Url> {
        self.log_root
            .new_commit_path(self.version)
            .map(|p| p.location)
    }

    /// The staged commit path is the absolute path (e.g.
    /// s3://bucket/table/_delta_log/_staged_commits/{version}.{uuid}.json) to a new, uniquely
    /// named staged commit file.
    pub fn staged_commit_path(&self) -> DeltaResult<Url> {
        self.log_root
            .new_staged_commit_path(self.version)
            .map(|p| p.location)
    }

    /// The version to which the transaction is being committed.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The commit timestamp. When in-commit timestamps are enabled this is the commit's
    /// `inCommitTimestamp`, which may differ from the commit file modification time.
    pub fn in_commit_timestamp(&self) -> i64 {
        self.in_commit_timestamp
    }

    /// The maximum published version of the table.
    pub fn max_published_version(&self) -> Option<Version> {
        self.max_published_version
    }

    /// The commit info of this commit and the protocol and metadata before and after it.
    pub fn updated_actions(&self) -> &UpdatedActions {
        &self.updated_actions
    }

    pub fn log_url(&self) -> &Url {
        self.log_root.log_url()
    }
}

/// `CommitResponse` is the result of committing a transaction. The committer uses this type to
/// indicate whether or not the commit was successful or conflicted. The kernel then transforms the
/// associated [`Transaction`] into the appropriate state.
///
/// If the commit was successful, the committer returns `CommitResponse::Committed` with the file
/// holding the commit. If the commit conflicted (e.g. another writer committed to the same
/// version), the Committer returns `CommitResponse::Conflict` with the version that was attempted.
///
/// [`Transaction`]: crate::transaction::Transaction
#[derive(Debug)]
pub enum CommitResponse {
    Committed { file_meta: FileMeta },
    Conflict { version: Version },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::unchanged_actions;

    #[test]
    fn test_commit_metadata() {
        let table_root = Url::parse("s3://my-bucket/path/to/table/").unwrap();
        let log_root = LogRoot::new(table_root).unwrap();
        let commit_metadata = CommitMetadata::new(log_root, 42, 1234, Some(41), unchanged_actions());

        assert_eq!(commit_metadata.version(), 42);
        assert_eq!(commit_metadata.in_commit_timestamp(), 1234);
        assert_eq!(commit_metadata.max_published_version(), Some(41));
        assert!(!commit_metadata.updated_actions().is_metadata_changed());
        assert_eq!(
            commit_metadata.log_url().as_str(),
            "s3://my-bucket/path/to/table/_delta_log/"
        );

        let published_path = commit_metadata.published_commit_path().unwrap();
        assert_eq!(
            published_path.as_str(),
            "s3://my-bucket/path/to/table/_delta_log/00000000000000000042.json"
        );

        let staged_path = commit_metadata.staged_commit_path().unwrap();
        let uuid_str = staged_path
            .as_str()
            .strip_prefix(
                "s3://my-bucket/path/to/table/_delta_log/_staged_commits/00000000000000000042.",
            )
            .and_then(|s| s.strip_suffix(".json"))
            .expect("Staged path should have expected format");
        uuid::Uuid::parse_str(uuid_str).expect("Staged path should contain a valid UUID");

        // every call names a new staged file
        assert_ne!(commit_metadata.staged_commit_path().unwrap(), staged_path);
    }
}
