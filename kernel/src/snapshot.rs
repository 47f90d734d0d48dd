//! In-memory representation of snapshots of tables (snapshot is a table at given point in time, it
//! has a version, protocol and metadata, and a frozen log segment)

use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;
use url::Url;

use crate::actions::{Metadata, Protocol};
use crate::committer::{Committer, CoordinatedCommitter, FileSystemCommitter};
use crate::coordinated_commits::{
    Commit, CommitCoordinatorRegistry, TableCommitCoordinatorClientHandler,
};
use crate::listed_log_files::ListedLogFiles;
use crate::log_segment::{protocol_and_metadata, LogSegment};
use crate::path::ParsedLogPath;
use crate::table_configuration::{InCommitTimestampEnablement, TableConfiguration};
use crate::table_properties::TableProperties;
use crate::transaction::Transaction;
use crate::{DeltaResult, Engine, Error, Version};

mod builder;
pub use builder::SnapshotBuilder;

pub type SnapshotRef = Arc<Snapshot>;

/// In-memory representation of a specific snapshot of a Delta table. While a `DeltaTable` exists
/// throughout time, `Snapshot`s represent a view of a table at a specific point in time; they
/// have a defined protocol and metadata, specific version, and frozen log segment.
///
/// For tables with coordinated commits enabled, the log segment includes the commits the
/// coordinator has accepted but not yet backfilled.
pub struct Snapshot {
    log_segment: LogSegment,
    table_configuration: TableConfiguration,
    /// Registry used to resolve the table's commit coordinator. `None` means the global one.
    coordinator_registry: Option<Arc<CommitCoordinatorRegistry>>,
    timestamp: Mutex<Option<i64>>,
    coordinator_handler: OnceLock<Option<TableCommitCoordinatorClientHandler>>,
}

// Two snapshots are equal when they describe the same table state. Memoized values are not
// compared.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.log_segment == other.log_segment
            && self.table_configuration == other.table_configuration
    }
}

impl Eq for Snapshot {}

impl Drop for Snapshot {
    fn drop(&mut self) {
        debug!("Dropping snapshot");
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("path", &self.log_segment.log_root.as_str())
            .field("version", &self.version())
            .field("metadata", &self.table_configuration().metadata())
            .finish()
    }
}

impl Snapshot {
    /// Create a new [`SnapshotBuilder`] to build a new [`Snapshot`] for a given table root. If you
    /// instead have an existing [`Snapshot`] you would like to do minimal work to update, consider
    /// using [`Snapshot::builder_from`].
    pub fn builder_for(table_root: Url) -> SnapshotBuilder {
        SnapshotBuilder::new_for(table_root)
    }

    /// Create a new [`SnapshotBuilder`] to incrementally update a [`Snapshot`] to a more recent
    /// version.
    ///
    /// We implement a simple heuristic:
    /// 1. if the new version == existing version, just return the existing snapshot
    /// 2. if the new version < existing version, error: there is no optimization to do here
    /// 3. list from (existing snapshot version + 1) onward, including the commits the table's
    ///    coordinator reports if coordinated commits are enabled
    /// 4. do a lightweight P+M replay on the new commits only and extend the existing log
    ///    segment with them
    pub fn builder_from(existing_snapshot: SnapshotRef) -> SnapshotBuilder {
        SnapshotBuilder::new_from(existing_snapshot)
    }

    pub(crate) fn new(
        log_segment: LogSegment,
        table_configuration: TableConfiguration,
        coordinator_registry: Option<Arc<CommitCoordinatorRegistry>>,
    ) -> Self {
        Self {
            log_segment,
            table_configuration,
            coordinator_registry,
            timestamp: Mutex::new(None),
            coordinator_handler: OnceLock::new(),
        }
    }

    /// Create a new [`Snapshot`] instance from an existing [`Snapshot`]. This is useful when you
    /// already have a [`Snapshot`] lying around and want to do the minimal work to 'update' the
    /// snapshot to a later version.
    fn try_new_from(
        existing_snapshot: Arc<Snapshot>,
        log_tail: Vec<ParsedLogPath>,
        engine: &dyn Engine,
        version: impl Into<Option<Version>>,
        coordinator_registry: Option<Arc<CommitCoordinatorRegistry>>,
    ) -> DeltaResult<Arc<Self>> {
        let old_log_segment = &existing_snapshot.log_segment;
        let old_version = existing_snapshot.version();
        let new_version = version.into();
        if let Some(new_version) = new_version {
            if new_version == old_version {
                // Re-requesting the same version
                return Ok(existing_snapshot.clone());
            }
            if new_version < old_version {
                // Hint is too new: error since this is effectively an incorrect optimization
                return Err(Error::Generic(format!(
                    "Requested snapshot version {new_version} is older than snapshot hint version {old_version}"
                )));
            }
        }

        // an explicit registry replaces the one the existing snapshot resolved through
        let handler = match coordinator_registry.as_deref() {
            Some(registry) => existing_snapshot.resolve_coordinator_handler(engine, registry)?,
            None => existing_snapshot.table_commit_coordinator_handler(engine)?,
        };
        let coordinator_registry =
            coordinator_registry.or_else(|| existing_snapshot.coordinator_registry.clone());

        // callers that pass their own tail know better than the coordinator
        let log_tail = match handler {
            Some(handler) if log_tail.is_empty() => {
                let response = handler.get_commits(engine, Some(old_version + 1), new_version)?;
                log_tail_from_commits(response.into_commits())?
            }
            _ => log_tail,
        };

        let log_root = old_log_segment.log_root.clone();
        let storage = engine.storage_handler();
        let new_listed_files = ListedLogFiles::list(
            storage.as_ref(),
            &log_root,
            log_tail,
            Some(old_version + 1),
            new_version,
        )?;

        let new_commits = new_listed_files.ascending_commit_files();
        if new_commits.is_empty() {
            return match new_version {
                Some(new_version) => Err(Error::Generic(format!(
                    "Requested snapshot version {new_version} is newer than the latest version {old_version}"
                ))),
                // No new commits, just return the same snapshot
                None => Ok(existing_snapshot.clone()),
            };
        }

        // we have new commits: we replay them for P+M and then create a new snapshot by
        // combining log segments and building a new TableConfiguration
        let (new_metadata, new_protocol) = protocol_and_metadata(engine, new_commits.iter().rev())?;
        let max_published_version = old_log_segment
            .max_published_version
            .max(new_listed_files.max_published_version());
        let (new_commits, _, _) = new_listed_files.into_parts();

        let mut ascending_commit_files = old_log_segment.ascending_commit_files.clone();
        ascending_commit_files.extend(new_commits);
        let combined_log_segment = LogSegment::try_new(
            ListedLogFiles::from_commits(ascending_commit_files, max_published_version),
            log_root,
            new_version,
        )?;
        let table_configuration = TableConfiguration::try_new_from(
            existing_snapshot.table_configuration(),
            new_metadata,
            new_protocol,
            combined_log_segment.end_version,
        )?;
        debug!(
            "refreshed snapshot of {} from version {old_version} to {}",
            existing_snapshot.table_root(),
            combined_log_segment.end_version
        );
        Ok(Arc::new(Snapshot::new(
            combined_log_segment,
            table_configuration,
            coordinator_registry,
        )))
    }

    /// Create a new [`Snapshot`] instance.
    pub(crate) fn try_new_from_log_segment(
        location: Url,
        log_segment: LogSegment,
        engine: &dyn Engine,
        coordinator_registry: Option<Arc<CommitCoordinatorRegistry>>,
    ) -> DeltaResult<Self> {
        let (metadata, protocol) = log_segment.read_metadata(engine)?;
        let table_configuration =
            TableConfiguration::try_new(metadata, protocol, location, log_segment.end_version)?;
        Ok(Self::new(
            log_segment,
            table_configuration,
            coordinator_registry,
        ))
    }

    /// Log segment this snapshot uses
    pub(crate) fn log_segment(&self) -> &LogSegment {
        &self.log_segment
    }

    pub fn table_root(&self) -> &Url {
        self.table_configuration.table_root()
    }

    /// Version of this `Snapshot` in the table.
    pub fn version(&self) -> Version {
        self.table_configuration().version()
    }

    /// The table [`Metadata`] at this version.
    pub fn metadata(&self) -> &Metadata {
        self.table_configuration.metadata()
    }

    /// The table [`Protocol`] at this version.
    pub fn protocol(&self) -> &Protocol {
        self.table_configuration.protocol()
    }

    /// Get the [`TableProperties`] for this [`Snapshot`].
    pub fn table_properties(&self) -> &TableProperties {
        self.table_configuration().table_properties()
    }

    /// Get the [`TableConfiguration`] for this [`Snapshot`].
    pub(crate) fn table_configuration(&self) -> &TableConfiguration {
        &self.table_configuration
    }

    /// The registry this snapshot resolves its commit coordinator through.
    pub(crate) fn coordinator_registry(&self) -> &CommitCoordinatorRegistry {
        self.coordinator_registry
            .as_deref()
            .unwrap_or_else(|| CommitCoordinatorRegistry::global())
    }

    /// Create a [`Transaction`] for this `SnapshotRef`. Commits go through the table's commit
    /// coordinator when coordinated commits are enabled, and straight to storage otherwise.
    pub fn transaction(self: Arc<Self>, engine: &dyn Engine) -> DeltaResult<Transaction> {
        let committer: Box<dyn Committer> = match self.table_commit_coordinator_handler(engine)? {
            Some(handler) => Box::new(CoordinatedCommitter::new(handler)),
            None => Box::new(FileSystemCommitter::new()),
        };
        Transaction::try_new(self, committer)
    }

    /// Create a [`Transaction`] for this `SnapshotRef` with the specified [`Committer`].
    pub fn transaction_with_committer(
        self: Arc<Self>,
        committer: Box<dyn Committer>,
    ) -> DeltaResult<Transaction> {
        Transaction::try_new(self, committer)
    }

    /// The commit timestamp of this snapshot's version, in milliseconds since the epoch.
    ///
    /// With in-commit timestamps enabled this is the `inCommitTimestamp` of the version's commit
    /// info, and a commit without one is reported as [`Error::MissingInCommitTimestamp`].
    /// Otherwise it is the modification time of the last commit file. The value is computed
    /// once, on first access.
    pub fn timestamp(&self, engine: &dyn Engine) -> DeltaResult<i64> {
        let mut timestamp = self
            .timestamp
            .lock()
            .map_err(|_| Error::generic("poisoned snapshot timestamp lock"))?;
        if let Some(timestamp) = *timestamp {
            return Ok(timestamp);
        }
        let resolved = match self.get_in_commit_timestamp(engine)? {
            Some(ict) => ict,
            None => self.log_segment.last_commit_timestamp()?,
        };
        *timestamp = Some(resolved);
        Ok(resolved)
    }

    /// Get the In-Commit Timestamp (ICT) for this snapshot.
    ///
    /// Returns the `inCommitTimestamp` from the CommitInfo action of the commit that created this snapshot.
    ///
    /// # Returns
    /// - `Ok(Some(timestamp))` - ICT is enabled and available for this version
    /// - `Ok(None)` - ICT is not enabled
    /// - `Err(...)` - ICT is enabled but cannot be read, or enablement version is invalid
    pub(crate) fn get_in_commit_timestamp(&self, engine: &dyn Engine) -> DeltaResult<Option<i64>> {
        let enablement = self
            .table_configuration()
            .in_commit_timestamp_enablement()?;

        if matches!(enablement, InCommitTimestampEnablement::NotEnabled) {
            return Ok(None);
        }

        if let InCommitTimestampEnablement::Enabled {
            enablement: Some((enablement_version, _)),
        } = enablement
        {
            if self.version() < enablement_version {
                return Err(Error::generic(format!(
                    "Invalid state: snapshot at version {} has ICT enablement version {} in the future",
                    self.version(),
                    enablement_version
                )));
            }
        }

        let ict = self
            .log_segment
            .last_commit()?
            .read_in_commit_timestamp(engine)?;
        Ok(Some(ict))
    }

    /// The commit coordinator of this table, bound to it, or `None` if the table does not use
    /// coordinated commits.
    ///
    /// The coordinator name and backend configuration are read from the table's metadata and
    /// resolved through the snapshot's [`CommitCoordinatorRegistry`], which is the global one
    /// unless the snapshot was built with
    /// [`SnapshotBuilder::with_coordinator_registry`]. The handler is resolved once and then
    /// cached for the lifetime of the snapshot.
    pub fn table_commit_coordinator_handler(
        &self,
        engine: &dyn Engine,
    ) -> DeltaResult<Option<TableCommitCoordinatorClientHandler>> {
        if let Some(handler) = self.coordinator_handler.get() {
            return Ok(handler.clone());
        }
        let handler = self.resolve_coordinator_handler(engine, self.coordinator_registry())?;
        Ok(self.coordinator_handler.get_or_init(|| handler).clone())
    }

    /// Seed the handler cache, e.g. with the handler resolved while building this snapshot.
    pub(crate) fn with_coordinator_handler(
        self,
        handler: Option<TableCommitCoordinatorClientHandler>,
    ) -> Self {
        // a fresh snapshot has an empty cache, so this cannot fail
        let _ = self.coordinator_handler.set(handler);
        self
    }

    fn resolve_coordinator_handler(
        &self,
        engine: &dyn Engine,
        registry: &CommitCoordinatorRegistry,
    ) -> DeltaResult<Option<TableCommitCoordinatorClientHandler>> {
        let Some(config) = self.table_configuration.coordinated_commits_config()? else {
            return Ok(None);
        };
        let client = registry.resolve(
            config.coordinator_name,
            engine,
            &config.coordinator_conf,
        )?;
        debug!(
            "resolved commit coordinator {} for table {}",
            config.coordinator_name,
            self.table_root()
        );
        Ok(Some(TableCommitCoordinatorClientHandler::new(
            client,
            self.log_segment.log_root.clone(),
            config.table_conf,
        )))
    }
}

/// Turn the commits a coordinator reported into a log tail. Backfilled commits point at their
/// published file.
pub(crate) fn log_tail_from_commits(commits: Vec<Commit>) -> DeltaResult<Vec<ParsedLogPath>> {
    commits
        .into_iter()
        .map(|commit| {
            let file = commit
                .published_file()
                .unwrap_or_else(|| commit.file())
                .clone();
            let location = file.location.clone();
            match ParsedLogPath::try_from(file)? {
                Some(path) if path.is_commit() && path.version == commit.version() => Ok(path),
                _ => Err(Error::invalid_log_path(format!(
                    "coordinator reported {location} for commit {}",
                    commit.version()
                ))),
            }
        })
        .collect()
}
