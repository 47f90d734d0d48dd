//! Builder for creating [`Snapshot`] instances.
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use url::Url;

use crate::coordinated_commits::CommitCoordinatorRegistry;
use crate::log_path::LogPath;
use crate::log_segment::LogSegment;
use crate::metrics::{MetricEvent, MetricId, MetricsReporter};
use crate::path::ParsedLogPath;
use crate::snapshot::{log_tail_from_commits, SnapshotRef};
use crate::{DeltaResult, Engine, Error, Snapshot, Version};

/// Builder for creating [`Snapshot`] instances.
///
/// # Example
///
/// ```no_run
/// # use cc_kernel::{Snapshot, Engine};
/// # use url::Url;
/// # fn example(engine: &dyn Engine) -> cc_kernel::DeltaResult<()> {
/// let table_root = Url::parse("file:///path/to/table/")?;
///
/// // Build a snapshot
/// let snapshot = Snapshot::builder_for(table_root.clone())
///     .at_version(5) // Optional: specify a time-travel version (default is latest version)
///     .build(engine)?;
///
/// # Ok(())
/// # }
/// ```
//
// Note the SnapshotBuilder must have either a table_root or an existing_snapshot (but not both).
// We enforce this in the constructors.
#[derive(Debug)]
pub struct SnapshotBuilder {
    table_root: Option<Url>,
    existing_snapshot: Option<SnapshotRef>,
    version: Option<Version>,
    log_tail: Vec<LogPath>,
    coordinator_registry: Option<Arc<CommitCoordinatorRegistry>>,
}

impl SnapshotBuilder {
    pub(crate) fn new_for(table_root: Url) -> Self {
        Self {
            table_root: Some(table_root),
            existing_snapshot: None,
            version: None,
            log_tail: Vec::new(),
            coordinator_registry: None,
        }
    }

    pub(crate) fn new_from(existing_snapshot: SnapshotRef) -> Self {
        Self {
            table_root: None,
            existing_snapshot: Some(existing_snapshot),
            version: None,
            log_tail: Vec::new(),
            coordinator_registry: None,
        }
    }

    /// Set the target version of the [`Snapshot`]. When omitted, the Snapshot is created at the
    /// latest version of the table.
    pub fn at_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the log tail to use when building the snapshot. This allows callers that already know
    /// the unbackfilled commits of a table to skip asking its commit coordinator.
    ///
    /// Note that the log tail must be a contiguous sequence of commits from M..=N where N is the
    /// latest version of the table and 0 <= M <= N.
    pub fn with_log_tail(mut self, log_tail: Vec<LogPath>) -> Self {
        self.log_tail = log_tail;
        self
    }

    /// Resolve the table's commit coordinator through `registry` instead of
    /// [`CommitCoordinatorRegistry::global`]. The snapshot keeps using it for
    /// [`Snapshot::table_commit_coordinator_handler`] and transactions.
    pub fn with_coordinator_registry(mut self, registry: Arc<CommitCoordinatorRegistry>) -> Self {
        self.coordinator_registry = Some(registry);
        self
    }

    /// Create a new [`Snapshot`]. This returns a [`SnapshotRef`] (`Arc<Snapshot>`), perhaps
    /// returning a reference to an existing snapshot if the request to build a new snapshot
    /// matches the version of an existing snapshot.
    ///
    /// Reports metrics: `SnapshotCompleted` or `SnapshotFailed`.
    ///
    /// # Parameters
    ///
    /// - `engine`: Implementation of [`Engine`] apis.
    pub fn build(self, engine: &dyn Engine) -> DeltaResult<SnapshotRef> {
        let operation_id = MetricId::new();
        let reporter = engine.get_metrics_reporter();
        let start = Instant::now();

        let result = self.build_impl(engine, operation_id, reporter.as_ref());
        match &result {
            Ok(snapshot) => reporter.inspect(|r| {
                r.report(MetricEvent::SnapshotCompleted {
                    operation_id,
                    version: snapshot.version(),
                    total_duration: start.elapsed(),
                });
            }),
            Err(_) => reporter.inspect(|r| {
                r.report(MetricEvent::SnapshotFailed {
                    operation_id,
                    duration: start.elapsed(),
                });
            }),
        };
        result
    }

    fn build_impl(
        self,
        engine: &dyn Engine,
        operation_id: MetricId,
        reporter: Option<&Arc<dyn MetricsReporter>>,
    ) -> DeltaResult<SnapshotRef> {
        let log_tail: Vec<ParsedLogPath> = self.log_tail.into_iter().map(Into::into).collect();
        if let Some(table_root) = self.table_root {
            build_for_table(
                engine,
                table_root,
                log_tail,
                self.version,
                self.coordinator_registry,
                operation_id,
                reporter,
            )
            .map(Arc::new)
        } else {
            let existing_snapshot = self.existing_snapshot.ok_or_else(|| {
                Error::internal_error(
                    "SnapshotBuilder should have either table_root or existing_snapshot",
                )
            })?;
            Snapshot::try_new_from(
                existing_snapshot,
                log_tail,
                engine,
                self.version,
                self.coordinator_registry,
            )
        }
    }
}

// Build a snapshot from scratch.
//
// Storage is listed once. A requested version that is already published is served from that
// listing alone. Otherwise the published log at its latest version decides whether the table uses
// coordinated commits, and if it does (and the caller did not hand us a log tail) the commits the
// coordinator has accepted but not yet backfilled are merged into the listing.
fn build_for_table(
    engine: &dyn Engine,
    table_root: Url,
    log_tail: Vec<ParsedLogPath>,
    version: Option<Version>,
    coordinator_registry: Option<Arc<CommitCoordinatorRegistry>>,
    operation_id: MetricId,
    reporter: Option<&Arc<dyn MetricsReporter>>,
) -> DeltaResult<Snapshot> {
    let start = Instant::now();
    let table_root = ensure_trailing_slash(table_root);
    let log_root = table_root.join("_delta_log/")?;
    let storage = engine.storage_handler();

    if !log_tail.is_empty() {
        let log_segment = LogSegment::for_snapshot(
            storage.as_ref(),
            log_root,
            log_tail,
            version,
            reporter,
            Some(operation_id),
        )?;
        return Snapshot::try_new_from_log_segment(
            table_root,
            log_segment,
            engine,
            coordinator_registry,
        );
    }

    let listed =
        LogSegment::for_snapshot(storage.as_ref(), log_root.clone(), vec![], None, None, None)?;
    let loaded = |log_segment: LogSegment| {
        log_segment.report_loaded(reporter, operation_id, start.elapsed());
        Snapshot::try_new_from_log_segment(
            table_root.clone(),
            log_segment,
            engine,
            coordinator_registry.clone(),
        )
    };

    if let Some(version) = version.filter(|version| *version <= listed.end_version) {
        return loaded(listed.with_tail(vec![], Some(version))?);
    }
    let published = Snapshot::try_new_from_log_segment(
        table_root.clone(),
        listed.clone(),
        engine,
        coordinator_registry.clone(),
    )?;
    let Some(handler) = published.table_commit_coordinator_handler(engine)? else {
        if let Some(version) = version {
            // past the end of an uncoordinated log: fails with the end version mismatch
            return loaded(listed.with_tail(vec![], Some(version))?);
        }
        listed.report_loaded(reporter, operation_id, start.elapsed());
        return Ok(published);
    };

    let commits = handler.get_commits(engine, None, version)?;
    let latest_version = commits.latest_table_version();
    debug!(
        "commit coordinator reports {} commits for {table_root}, latest version {latest_version}",
        commits.commits().len(),
    );
    let log_tail = log_tail_from_commits(commits.into_commits())?;
    // the coordinator may have backfilled and forgotten commits since we listed
    let connected = match log_tail.first() {
        Some(first) => first.version <= listed.end_version + 1,
        None => latest_version <= listed.end_version,
    };
    let log_segment = if connected {
        listed.with_tail(log_tail, version)?
    } else {
        debug!("log tail for {table_root} does not connect to the listing, listing again");
        LogSegment::for_snapshot(storage.as_ref(), log_root, log_tail, version, None, None)?
    };
    let snapshot = loaded(log_segment)?;
    // time travel to before coordinated commits were enabled keeps the snapshot uncoordinated
    let handler = snapshot
        .table_configuration()
        .is_coordinated_commits_enabled()
        .then_some(handler);
    Ok(snapshot.with_coordinator_handler(handler))
}

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
