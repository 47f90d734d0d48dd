//! File system committer for tables without coordinated commits.

use crate::coordinated_commits::CommitActions;
use crate::{DeltaResult, Engine, Error};

use super::commit_types::{CommitMetadata, CommitResponse};
use super::Committer;

/// The `FileSystemCommitter` is an implementation of the `Committer` trait which commits to a
/// file system directly via `Engine::json_handler().write_json_file`, relying on put-if-absent
/// to order writers.
///
/// It is _incorrect_ to use this committer for tables with coordinated commits enabled: writing
/// a published commit behind the coordinator's back would fork the log. Transactions refuse to
/// commit through it in that case.
#[derive(Debug, Default)]
pub struct FileSystemCommitter;

impl FileSystemCommitter {
    pub fn new() -> Self {
        Self {}
    }
}

impl Committer for FileSystemCommitter {
    fn commit(
        &self,
        engine: &dyn Engine,
        actions: CommitActions<'_>,
        commit_metadata: CommitMetadata,
    ) -> DeltaResult<CommitResponse> {
        let published_commit_path = commit_metadata.published_commit_path()?;

        match engine
            .json_handler()
            .write_json_file(&published_commit_path, actions, false)
        {
            Ok(()) => {
                let file_meta = engine.storage_handler().head(&published_commit_path)?;
                Ok(CommitResponse::Committed { file_meta })
            }
            Err(Error::FileAlreadyExists(_)) => Ok(CommitResponse::Conflict {
                version: commit_metadata.version,
            }),
            Err(e) => Err(e),
        }
    }
}
