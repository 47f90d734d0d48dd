//! A commit coordinator that keeps its bookkeeping in process memory.
//!
//! Commits are staged through the engine into `_delta_log/_staged_commits/`, exactly like a
//! remote coordinator would, so the table's storage sees the real file layout. Only the record
//! of which staged file holds which version lives in memory. This makes it a good stand-in for
//! a coordinator service in tests, and for single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{
    Commit, CommitActions, CommitCoordinatorBuilder, CommitCoordinatorClient, CommitResponse,
    GetCommitsResponse, TableDescriptor, TableIdentifier, UpdatedActions,
};
use crate::actions::{Metadata, Protocol};
use crate::metrics::MetricEvent;
use crate::path::LogRoot;
use crate::utils::require;
use crate::{DeltaResult, Engine, Error, Version};

/// The table configuration key the in-memory coordinator issues at registration.
pub(crate) const TABLE_ID_KEY: &str = "tableId";

const DEFAULT_NAME: &str = "in-memory";

#[derive(Debug)]
struct TableState {
    table_id: String,
    registered_version: Version,
    /// Every accepted commit, ascending and gapless from `registered_version + 1`
    commits: Vec<Commit>,
    last_backfilled_version: Version,
}

impl TableState {
    fn latest_version(&self) -> Version {
        self.commits
            .last()
            .map_or(self.registered_version, Commit::version)
    }
}

type Tables = Arc<Mutex<HashMap<String, Arc<Mutex<TableState>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> DeltaResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::generic("poisoned in-memory commit coordinator lock"))
}

/// Builds [`InMemoryCommitCoordinator`]s.
///
/// All clients built by one builder (and its clones) share the same table state, and are
/// [`semantic_equals`](CommitCoordinatorClient::semantic_equals) to each other. Two builders
/// created separately never share state, even under the same name.
#[derive(Debug, Clone)]
pub struct InMemoryCommitCoordinatorBuilder {
    name: String,
    backfill_interval: u64,
    tables: Tables,
}

impl Default for InMemoryCommitCoordinatorBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NAME)
    }
}

impl InMemoryCommitCoordinatorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backfill_interval: 0,
            tables: Tables::default(),
        }
    }

    /// Backfill synchronously once `backfill_interval` commits have been accepted since the last
    /// backfill. `0`, the default, leaves backfilling to explicit
    /// [`backfill_to_version`](CommitCoordinatorClient::backfill_to_version) calls.
    pub fn with_backfill_interval(mut self, backfill_interval: u64) -> Self {
        self.backfill_interval = backfill_interval;
        self
    }
}

impl CommitCoordinatorBuilder for InMemoryCommitCoordinatorBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(
        &self,
        _engine: &dyn Engine,
        _conf: &HashMap<String, String>,
    ) -> DeltaResult<Arc<dyn CommitCoordinatorClient>> {
        Ok(Arc::new(InMemoryCommitCoordinator {
            name: self.name.clone(),
            backfill_interval: self.backfill_interval,
            tables: self.tables.clone(),
        }))
    }
}

/// A [`CommitCoordinatorClient`] whose commit bookkeeping lives in process memory. Tables are
/// keyed by their log path. See the [module docs](self).
#[derive(Debug)]
pub struct InMemoryCommitCoordinator {
    name: String,
    backfill_interval: u64,
    tables: Tables,
}

impl InMemoryCommitCoordinator {
    /// The name of the builder this client came from.
    pub fn name(&self) -> &str {
        &self.name
    }

    // The state of a registered table, after checking the descriptor carries the table id this
    // coordinator issued for it.
    fn table(&self, table_descriptor: &TableDescriptor) -> DeltaResult<Arc<Mutex<TableState>>> {
        let log_path = table_descriptor.log_path();
        let table = lock(&self.tables)?
            .get(log_path.as_str())
            .cloned()
            .ok_or_else(|| {
                Error::commit_failed(format!(
                    "Table {log_path} is not registered with commit coordinator {}",
                    self.name
                ))
            })?;
        let expected = lock(&table)?.table_id.clone();
        match table_descriptor.table_conf().get(TABLE_ID_KEY) {
            Some(table_id) if *table_id == expected => Ok(table),
            Some(table_id) => Err(Error::commit_failed(format!(
                "Table configuration of {log_path} names table {table_id}, but the table is \
                 registered as {expected}"
            ))),
            None => Err(Error::commit_failed(format!(
                "Table configuration of {log_path} is missing '{TABLE_ID_KEY}'"
            ))),
        }
    }

    fn backfill(
        &self,
        engine: &dyn Engine,
        log_path: &Url,
        table: &Mutex<TableState>,
        version: Version,
    ) -> DeltaResult<()> {
        let start = Instant::now();
        let log_root = log_root(log_path)?;
        let storage = engine.storage_handler();
        let mut guard = lock(table)?;
        let state = &mut *guard;
        let latest_version = state.latest_version();
        require!(
            version <= latest_version,
            Error::InvalidBackfillVersion {
                version,
                latest_version: Some(latest_version),
            }
        );

        let mut num_files: u64 = 0;
        for commit in state
            .commits
            .iter_mut()
            .take_while(|commit| commit.version() <= version)
            .filter(|commit| !commit.is_backfilled())
        {
            let published = log_root.new_commit_path(commit.version())?.location;
            match storage.copy_atomic(&commit.file().location, &published) {
                Ok(()) => num_files += 1,
                // someone already published this version
                Err(Error::FileAlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
            let published = storage.head(&published)?;
            *commit = commit.clone().with_published_file(published);
            state.last_backfilled_version = state.last_backfilled_version.max(commit.version());
        }

        if num_files == 0 {
            debug!("nothing to backfill up to version {version} of {log_path}");
            return Ok(());
        }
        info!("backfilled {num_files} commits of {log_path} up to version {version}");
        engine.get_metrics_reporter().inspect(|r| {
            r.report(MetricEvent::BackfillCompleted {
                version,
                num_files,
                duration: start.elapsed(),
            })
        });
        Ok(())
    }
}

// The coordinator talks about the `_delta_log/` directory, which must end with '/'.
fn log_root(log_path: &Url) -> DeltaResult<LogRoot> {
    require!(
        log_path.path().ends_with('/'),
        Error::invalid_table_location(log_path)
    );
    LogRoot::new(log_path.join("../")?)
}

impl CommitCoordinatorClient for InMemoryCommitCoordinator {
    fn register_table(
        &self,
        _engine: &dyn Engine,
        log_path: &Url,
        table_identifier: Option<&TableIdentifier>,
        current_version: Version,
        _current_metadata: &Metadata,
        _current_protocol: &Protocol,
    ) -> DeltaResult<HashMap<String, String>> {
        log_root(log_path)?;
        let mut tables = lock(&self.tables)?;
        if let Some(table) = tables.get(log_path.as_str()) {
            let state = lock(table)?;
            require!(
                state.registered_version == current_version && state.commits.is_empty(),
                Error::commit_failed(format!(
                    "Table {log_path} is already registered with commit coordinator {} at \
                     version {} (latest version {})",
                    self.name,
                    state.registered_version,
                    state.latest_version()
                ))
            );
            return Ok(HashMap::from([(
                TABLE_ID_KEY.to_string(),
                state.table_id.clone(),
            )]));
        }

        let table_id = Uuid::new_v4().to_string();
        let name = table_identifier.map_or_else(|| log_path.to_string(), ToString::to_string);
        debug!("registered {name} with commit coordinator {} at version {current_version}", self.name);
        tables.insert(
            log_path.to_string(),
            Arc::new(Mutex::new(TableState {
                table_id: table_id.clone(),
                registered_version: current_version,
                commits: Vec::new(),
                last_backfilled_version: current_version,
            })),
        );
        Ok(HashMap::from([(TABLE_ID_KEY.to_string(), table_id)]))
    }

    fn commit(
        &self,
        engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        commit_version: Version,
        actions: CommitActions<'_>,
        updated_actions: &UpdatedActions,
    ) -> DeltaResult<CommitResponse> {
        let start = Instant::now();
        let table = self.table(table_descriptor)?;
        let log_path = table_descriptor.log_path();

        // cheap early rejection, re-checked below once the staged file exists
        let check_version = |state: &TableState| -> DeltaResult<()> {
            let latest = state.latest_version();
            require!(
                commit_version == latest + 1,
                Error::commit_conflict(
                    commit_version,
                    Some(latest),
                    format!("expected version {}", latest + 1)
                )
            );
            Ok(())
        };
        check_version(&*lock(&table)?)?;

        let staged = log_root(log_path)?
            .new_staged_commit_path(commit_version)?
            .location;
        engine
            .json_handler()
            .write_json_file(&staged, actions, false)?;
        let file = engine.storage_handler().head(&staged)?;
        let commit_timestamp = updated_actions
            .commit_info()
            .in_commit_timestamp
            .unwrap_or(file.last_modified);
        let commit = Commit::new(commit_version, file, commit_timestamp);

        let since_backfill = {
            let mut state = lock(&table)?;
            check_version(&*state)?;
            state.commits.push(commit.clone());
            commit_version - state.last_backfilled_version
        };
        info!(
            "commit coordinator {} accepted version {commit_version} of {log_path}",
            self.name
        );
        engine.get_metrics_reporter().inspect(|r| {
            r.report(MetricEvent::CoordinatedCommitCompleted {
                version: commit_version,
                duration: start.elapsed(),
            })
        });

        if self.backfill_interval > 0 && since_backfill >= self.backfill_interval {
            // the commit is accepted either way; a later backfill picks up what this one missed
            let backfill_start = Instant::now();
            if let Err(e) = self.backfill(engine, log_path, &table, commit_version) {
                warn!("backfill of {log_path} up to version {commit_version} failed: {e}");
                engine.get_metrics_reporter().inspect(|r| {
                    r.report(MetricEvent::BackfillFailed {
                        version: commit_version,
                        duration: backfill_start.elapsed(),
                    })
                });
            }
        }
        Ok(CommitResponse::new(commit))
    }

    fn get_commits(
        &self,
        _engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        start_version: Option<Version>,
        end_version: Option<Version>,
    ) -> DeltaResult<GetCommitsResponse> {
        let table = self.table(table_descriptor)?;
        let state = lock(&table)?;
        let range = start_version.unwrap_or(0)..=end_version.unwrap_or(Version::MAX);
        let commits = state
            .commits
            .iter()
            .filter(|commit| range.contains(&commit.version()))
            .cloned()
            .collect();
        Ok(GetCommitsResponse::new(commits, state.latest_version()))
    }

    fn backfill_to_version(
        &self,
        engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        version: Version,
        last_known_backfilled_version: Option<Version>,
    ) -> DeltaResult<()> {
        // the hint only saves work for coordinators that do not track backfill state; this one does
        debug!(
            "backfill to {version} requested, caller last saw {last_known_backfilled_version:?}"
        );
        let table = self.table(table_descriptor)?;
        self.backfill(engine, table_descriptor.log_path(), &table, version)
    }

    fn semantic_equals(&self, other: &dyn CommitCoordinatorClient) -> bool {
        other
            .any_ref()
            .downcast_ref::<InMemoryCommitCoordinator>()
            .is_some_and(|other| {
                self.name == other.name && Arc::ptr_eq(&self.tables, &other.tables)
            })
    }
}
