//! Committer for tables with coordinated commits enabled.

use tracing::debug;

use crate::coordinated_commits::{CommitActions, TableCommitCoordinatorClientHandler};
use crate::{DeltaResult, Engine, Error};

use super::commit_types::{CommitMetadata, CommitResponse};
use super::Committer;

/// Commits through the table's commit coordinator. The coordinator's version guard decides the
/// outcome: a [`Error::CommitConflict`] becomes [`CommitResponse::Conflict`], every other error is
/// passed on.
///
/// The commit is accepted once this returns, but is only visible to readers that consult the
/// coordinator until it is backfilled.
#[derive(Debug, Clone)]
pub struct CoordinatedCommitter {
    handler: TableCommitCoordinatorClientHandler,
}

impl CoordinatedCommitter {
    pub fn new(handler: TableCommitCoordinatorClientHandler) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &TableCommitCoordinatorClientHandler {
        &self.handler
    }
}

impl Committer for CoordinatedCommitter {
    fn commit(
        &self,
        engine: &dyn Engine,
        actions: CommitActions<'_>,
        commit_metadata: CommitMetadata,
    ) -> DeltaResult<CommitResponse> {
        let version = commit_metadata.version();
        match self.handler.commit(
            engine,
            version,
            actions,
            commit_metadata.updated_actions(),
        ) {
            Ok(response) => Ok(CommitResponse::Committed {
                file_meta: response.into_commit().file().clone(),
            }),
            Err(Error::CommitConflict {
                latest_version,
                message,
                ..
            }) => {
                debug!("commit {version} conflicted (latest {latest_version:?}): {message}");
                Ok(CommitResponse::Conflict { version })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use url::Url;

    use super::*;
    use crate::coordinated_commits::{CommitCoordinatorBuilder, InMemoryCommitCoordinatorBuilder};
    use crate::path::{LogPathFileType, LogRoot, ParsedLogPath};
    use crate::utils::test_utils::{setup_test, unchanged_actions};
    use crate::Action;

    #[test]
    fn test_coordinated_committer() {
        let (_, engine, table_root) = setup_test();
        let engine = engine.as_ref();
        let log_root = LogRoot::new(table_root.clone()).unwrap();
        let builder = InMemoryCommitCoordinatorBuilder::new("mem");
        let client = builder.build(engine, &HashMap::new()).unwrap();
        let updated = unchanged_actions();
        let table_conf = client
            .register_table(
                engine,
                log_root.log_url(),
                None,
                0,
                updated.old_metadata(),
                updated.old_protocol(),
            )
            .unwrap();
        let handler = TableCommitCoordinatorClientHandler::new(
            client,
            log_root.log_url().clone(),
            table_conf.clone(),
        );
        let committer = CoordinatedCommitter::new(handler);

        let commit = |version| {
            let commit_metadata = CommitMetadata::new(
                LogRoot::new(table_root.clone()).unwrap(),
                version,
                1,
                Some(0),
                unchanged_actions(),
            );
            let actions = std::iter::once(Ok(Action::CommitInfo(Default::default())));
            committer.commit(engine, Box::new(actions), commit_metadata)
        };

        let CommitResponse::Committed { file_meta } = commit(1).unwrap() else {
            panic!("Expected Committed");
        };
        let parsed = ParsedLogPath::try_from(file_meta).unwrap().unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.file_type, LogPathFileType::StagedCommit);

        assert!(matches!(
            commit(1).unwrap(),
            CommitResponse::Conflict { version: 1 }
        ));
        assert!(matches!(
            commit(3).unwrap(),
            CommitResponse::Conflict { version: 3 }
        ));

        // anything but a conflict is an error
        let unregistered = CoordinatedCommitter::new(TableCommitCoordinatorClientHandler::new(
            builder.build(engine, &HashMap::new()).unwrap(),
            Url::parse("memory:///elsewhere/_delta_log/").unwrap(),
            table_conf,
        ));
        let commit_metadata = CommitMetadata::new(
            LogRoot::new(Url::parse("memory:///elsewhere/").unwrap()).unwrap(),
            1,
            1,
            None,
            unchanged_actions(),
        );
        let res = unregistered.commit(engine, Box::new(std::iter::empty()), commit_metadata);
        assert!(matches!(res, Err(Error::CommitFailed(_))));
    }
}
