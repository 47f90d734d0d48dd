use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

use cc_client::models::{
    CommitInfo, CommitRequest, CommitsRequest, CommitsResponse, RegisterTableRequest,
};
use cc_client::CoordinatorClient;
use cc_kernel::actions::{Metadata, Protocol};
use cc_kernel::coordinated_commits::{
    Commit, CommitActions, CommitCoordinatorClient, CommitResponse, GetCommitsResponse,
    TableDescriptor, TableIdentifier, UpdatedActions,
};
use cc_kernel::engine::default::executor::tokio::TokioBackgroundExecutor;
use cc_kernel::engine::default::executor::TaskExecutor;
use cc_kernel::metrics::MetricEvent;
use cc_kernel::{DeltaResult, Engine, Error, FileMeta, Version};

/// The table configuration key holding the id the service assigned at registration.
pub const TABLE_ID_KEY: &str = "tableId";

const STAGED_COMMITS_DIR: &str = "_staged_commits/";

/// Talks to a commit-coordinator service through a [`CoordinatorClient`]. Built by
/// [`RestCommitCoordinatorBuilder`](crate::RestCommitCoordinatorBuilder).
///
/// The kernel API is blocking, so each request is driven to completion on a background tokio
/// runtime; it is safe to call from inside an async context.
#[derive(Debug)]
pub struct RestCommitCoordinator {
    client: CoordinatorClient,
    executor: Arc<TokioBackgroundExecutor>,
}

impl RestCommitCoordinator {
    pub fn new(client: CoordinatorClient, executor: Arc<TokioBackgroundExecutor>) -> Self {
        Self { client, executor }
    }

    /// The service endpoint this coordinator talks to.
    pub fn endpoint(&self) -> &Url {
        self.client.endpoint()
    }

    fn block_on<T, F, Fut>(&self, request: F) -> cc_client::Result<T>
    where
        F: FnOnce(CoordinatorClient) -> Fut,
        Fut: Future<Output = cc_client::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.executor.block_on(request(self.client.clone()))
    }

    fn fetch_commits(
        &self,
        table_id: &str,
        log_path: &Url,
        start_version: Option<Version>,
        end_version: Option<Version>,
    ) -> DeltaResult<CommitsResponse> {
        let mut request = CommitsRequest::new(table_id, table_uri(log_path)?);
        if let Some(start) = start_version {
            request = request.with_start_version(to_wire_version(start)?);
        }
        if let Some(end) = end_version {
            request = request.with_end_version(to_wire_version(end)?);
        }
        self.block_on(|client| async move { client.get_commits(request).await })
            .map_err(|e| into_kernel_error(e, None))
    }
}

impl CommitCoordinatorClient for RestCommitCoordinator {
    #[instrument(skip_all, fields(log_path = %log_path))]
    fn register_table(
        &self,
        _engine: &dyn Engine,
        log_path: &Url,
        table_identifier: Option<&TableIdentifier>,
        current_version: Version,
        current_metadata: &Metadata,
        current_protocol: &Protocol,
    ) -> DeltaResult<HashMap<String, String>> {
        let request = RegisterTableRequest {
            table_uri: table_uri(log_path)?,
            table_name: table_identifier.map(ToString::to_string),
            current_version: to_wire_version(current_version)?,
            metadata: serde_json::to_value(current_metadata)?,
            protocol: serde_json::to_value(current_protocol)?,
        };
        let response = self
            .block_on(|client| async move { client.register_table(request).await })
            .map_err(|e| into_kernel_error(e, None))?;
        info!("registered {log_path} as table {}", response.table_id);
        Ok(HashMap::from([(TABLE_ID_KEY.to_string(), response.table_id)]))
    }

    #[instrument(skip_all, fields(log_path = %table_descriptor.log_path(), version = commit_version))]
    fn commit(
        &self,
        engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        commit_version: Version,
        actions: CommitActions<'_>,
        updated_actions: &UpdatedActions,
    ) -> DeltaResult<CommitResponse> {
        let start = Instant::now();
        let log_path = table_descriptor.log_path();
        let table_id = table_id(table_descriptor)?;

        let file_name = format!("{commit_version:020}.{}.json", Uuid::new_v4());
        let staged = staged_commit_url(log_path, &file_name)?;
        engine
            .json_handler()
            .write_json_file(&staged, actions, false)?;
        let staged = engine.storage_handler().head(&staged)?;
        debug!("wrote staged commit {}", staged.location);

        let commit_timestamp = updated_actions
            .commit_info()
            .in_commit_timestamp
            .unwrap_or(staged.last_modified);
        let mut request = CommitRequest::new(
            table_id,
            table_uri(log_path)?,
            CommitInfo::new(
                to_wire_version(commit_version)?,
                commit_timestamp,
                file_name,
                i64::try_from(staged.size)
                    .map_err(|_| Error::generic("staged commit size does not fit into i64"))?,
                staged.last_modified,
            ),
            None,
        );
        if updated_actions.is_metadata_changed() {
            request = request.with_metadata(serde_json::to_value(updated_actions.new_metadata())?);
        }
        if updated_actions.is_protocol_changed() {
            request = request.with_protocol(serde_json::to_value(updated_actions.new_protocol())?);
        }

        self.block_on(|client| async move { client.commit(request).await })
            .map_err(|e| into_kernel_error(e, Some(commit_version)))?;

        info!("commit {commit_version} ratified by {}", self.endpoint());
        engine.get_metrics_reporter().inspect(|r| {
            r.report(MetricEvent::CoordinatedCommitCompleted {
                version: commit_version,
                duration: start.elapsed(),
            })
        });
        Ok(CommitResponse::new(Commit::new(
            commit_version,
            staged,
            commit_timestamp,
        )))
    }

    #[instrument(skip_all, fields(log_path = %table_descriptor.log_path()))]
    fn get_commits(
        &self,
        _engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        start_version: Option<Version>,
        end_version: Option<Version>,
    ) -> DeltaResult<GetCommitsResponse> {
        let log_path = table_descriptor.log_path();
        let response = self.fetch_commits(
            table_id(table_descriptor)?,
            log_path,
            start_version,
            end_version,
        )?;
        let commits: Vec<Commit> = response
            .commits
            .unwrap_or_default()
            .into_iter()
            .map(|commit| -> DeltaResult<Commit> {
                let file = FileMeta::new(
                    staged_commit_url(log_path, &commit.file_name)?,
                    commit.file_modification_timestamp,
                    u64::try_from(commit.file_size).map_err(|_| {
                        Error::commit_failed(format!(
                            "coordinator reported negative size for {}",
                            commit.file_name
                        ))
                    })?,
                );
                Ok(Commit::new(
                    from_wire_version(commit.version)?,
                    file,
                    commit.timestamp,
                ))
            })
            .try_collect()?;
        let contiguous = commits
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.version() + 1 == b.version());
        if !contiguous {
            return Err(Error::commit_failed(format!(
                "coordinator returned non-contiguous commits for {log_path}"
            )));
        }

        // a table with no commits since registration reports -1
        let last_listed = commits.last().map(Commit::version);
        let latest_table_version = match response.latest_table_version {
            -1 => last_listed.unwrap_or(0),
            latest => from_wire_version(latest)?.max(last_listed.unwrap_or(0)),
        };
        Ok(GetCommitsResponse::new(commits, latest_table_version))
    }

    #[instrument(skip_all, fields(log_path = %table_descriptor.log_path(), version = version))]
    fn backfill_to_version(
        &self,
        engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        version: Version,
        last_known_backfilled_version: Option<Version>,
    ) -> DeltaResult<()> {
        let start = Instant::now();
        let log_path = table_descriptor.log_path();
        let table_id = table_id(table_descriptor)?;
        let response = self.fetch_commits(
            table_id,
            log_path,
            last_known_backfilled_version.map(|v| v + 1),
            None,
        )?;
        let latest = match response.latest_table_version {
            -1 => None,
            latest => Some(from_wire_version(latest)?),
        };
        let storage = engine.storage_handler();
        match latest {
            Some(latest) if version <= latest => {}
            // nothing was ratified since registration, so only published versions qualify
            None => match storage.head(&published_commit_url(log_path, version)?) {
                Ok(_) => {
                    debug!("version {version} of {log_path} is already published");
                    return Ok(());
                }
                Err(Error::FileNotFound(_)) => {
                    return Err(Error::InvalidBackfillVersion {
                        version,
                        latest_version: None,
                    })
                }
                Err(e) => return Err(e),
            },
            latest_version => {
                return Err(Error::InvalidBackfillVersion {
                    version,
                    latest_version,
                })
            }
        }

        let mut num_files: u64 = 0;
        for commit in response.commits.unwrap_or_default() {
            let commit_version = from_wire_version(commit.version)?;
            if commit_version > version {
                break;
            }
            let staged = staged_commit_url(log_path, &commit.file_name)?;
            let published = published_commit_url(log_path, commit_version)?;
            match storage.copy_atomic(&staged, &published) {
                Ok(()) => num_files += 1,
                // already backfilled, by us or another writer
                Err(Error::FileAlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let request = CommitRequest::backfilled(
            table_id,
            table_uri(log_path)?,
            to_wire_version(version)?,
        );
        self.block_on(|client| async move { client.commit(request).await })
            .map_err(|e| into_kernel_error(e, None))?;

        if num_files > 0 {
            info!("backfilled {num_files} commits of {log_path} up to version {version}");
            engine.get_metrics_reporter().inspect(|r| {
                r.report(MetricEvent::BackfillCompleted {
                    version,
                    num_files,
                    duration: start.elapsed(),
                })
            });
        }
        Ok(())
    }

    fn semantic_equals(&self, other: &dyn CommitCoordinatorClient) -> bool {
        other
            .any_ref()
            .downcast_ref::<RestCommitCoordinator>()
            .is_some_and(|other| other.endpoint() == self.endpoint())
    }
}

fn table_id(table_descriptor: &TableDescriptor) -> DeltaResult<&str> {
    table_descriptor
        .table_conf()
        .get(TABLE_ID_KEY)
        .map(String::as_str)
        .ok_or_else(|| {
            Error::commit_failed(format!(
                "Table configuration of {} is missing '{TABLE_ID_KEY}'",
                table_descriptor.log_path()
            ))
        })
}

// The service knows tables by their root, the parent of `_delta_log/`.
fn table_uri(log_path: &Url) -> DeltaResult<String> {
    if !log_path.path().ends_with("/_delta_log/") {
        return Err(Error::invalid_table_location(log_path));
    }
    Ok(log_path.join("../")?.to_string())
}

fn staged_commit_url(log_path: &Url, file_name: &str) -> DeltaResult<Url> {
    Ok(log_path.join(STAGED_COMMITS_DIR)?.join(file_name)?)
}

fn published_commit_url(log_path: &Url, version: Version) -> DeltaResult<Url> {
    Ok(log_path.join(&format!("{version:020}.json"))?)
}

fn to_wire_version(version: Version) -> DeltaResult<i64> {
    i64::try_from(version).map_err(|_| Error::generic(format!("version {version} exceeds i64")))
}

fn from_wire_version(version: i64) -> DeltaResult<Version> {
    Version::try_from(version)
        .map_err(|_| Error::commit_failed(format!("coordinator reported version {version}")))
}

fn into_kernel_error(error: cc_client::Error, version: Option<Version>) -> Error {
    match (error, version) {
        (cc_client::Error::CommitConflict(message), Some(version)) => {
            Error::commit_conflict(version, None, message)
        }
        (e, _) if e.is_transport() => Error::commit_coordinator_unavailable(e),
        (e, _) => Error::commit_failed(e),
    }
}
