//! Coordinated commits: writers append versions to a table's log through an external commit
//! coordinator instead of relying on atomic create-if-absent in storage.
//!
//! A coordinator accepts a commit once its version is exactly one past the last accepted
//! version, which gives all writers a single total order. Accepted commits live in the
//! coordinator's staging area (`_delta_log/_staged_commits/`) until they are *backfilled*, that
//! is copied to their published location `_delta_log/{version:020}.json`. Until then only the
//! coordinator can say which staged commits are valid, so readers that need the latest state ask
//! it through [`CommitCoordinatorClient::get_commits`].
//!
//! The pieces are:
//! - [`CommitCoordinatorClient`]: the contract a coordinator backend implements.
//! - [`CommitCoordinatorRegistry`]: maps the coordinator name stored in a table's metadata to a
//!   [`CommitCoordinatorBuilder`] that produces clients.
//! - [`TableCommitCoordinatorClientHandler`]: a client bound to one table.
//! - [`InMemoryCommitCoordinator`]: a reference coordinator that keeps its state in process.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use cc_kernel::coordinated_commits::{
//! #     CommitCoordinatorRegistry, InMemoryCommitCoordinatorBuilder,
//! # };
//! # use cc_kernel::{DeltaResult, Snapshot};
//! # fn example(engine: &dyn cc_kernel::Engine, table_root: url::Url) -> DeltaResult<()> {
//! let registry = CommitCoordinatorRegistry::global();
//! registry.register(Arc::new(InMemoryCommitCoordinatorBuilder::new("mem")))?;
//!
//! // tables whose metadata names the "mem" coordinator now resolve through it
//! let snapshot = Snapshot::builder_for(table_root).build(engine)?;
//! if let Some(handler) = snapshot.table_commit_coordinator_handler(engine)? {
//!     let commits = handler.get_commits(engine, None, None)?;
//!     println!("{} commits not yet backfilled", commits.commits().len());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;

use url::Url;

use crate::actions::{Action, Metadata, Protocol};
use crate::{AsAny, DeltaResult, Engine, Version};

mod in_memory;
mod registry;
mod table_handler;
mod types;

pub use in_memory::{InMemoryCommitCoordinator, InMemoryCommitCoordinatorBuilder};
pub use registry::{
    commit_coordinator_builder_conf_key, CommitCoordinatorBuilder, CommitCoordinatorRegistry,
    COMMIT_COORDINATOR_BUILDER_CONF_PREFIX,
};
pub use table_handler::TableCommitCoordinatorClientHandler;
pub use types::{
    Commit, CommitResponse, GetCommitsResponse, TableDescriptor, TableIdentifier, UpdatedActions,
};

/// The actions of a single commit, in the order they are written to the commit file.
pub type CommitActions<'a> = Box<dyn Iterator<Item = DeltaResult<Action>> + Send + 'a>;

/// A client for a commit coordinator: the service that orders commits for the tables registered
/// with it.
///
/// Every call receives the [`Engine`] so the coordinator can reach the table's storage; it is
/// never inspected beyond its handlers. Implementations are shared across threads behind an
/// `Arc` and must not hold per-table state outside of the [`TableDescriptor`] they are handed.
pub trait CommitCoordinatorClient: AsAny + Debug {
    /// Register a table that already exists at `current_version` with this coordinator.
    /// Coordinated commits begin at `current_version + 1`.
    ///
    /// Returns the table configuration the caller must persist in the table's metadata
    /// (`delta.coordinatedCommits.tableConf-preview`) and hand back on every later call through
    /// the [`TableDescriptor`]. Fails with [`Error::CommitFailed`] if the table is already
    /// registered with incompatible state.
    ///
    /// [`Error::CommitFailed`]: crate::Error::CommitFailed
    fn register_table(
        &self,
        engine: &dyn Engine,
        log_path: &Url,
        table_identifier: Option<&TableIdentifier>,
        current_version: Version,
        current_metadata: &Metadata,
        current_protocol: &Protocol,
    ) -> DeltaResult<HashMap<String, String>>;

    /// Atomically append `commit_version` to the table's log.
    ///
    /// Fails with [`Error::CommitConflict`] unless `commit_version` is exactly one past the last
    /// version the coordinator accepted; nothing of the rejected commit is visible afterwards.
    /// Any other failure is unrecoverable for this attempt. The commit is durably recorded by the
    /// coordinator before the call returns, but may not be backfilled yet.
    ///
    /// [`Error::CommitConflict`]: crate::Error::CommitConflict
    fn commit(
        &self,
        engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        commit_version: Version,
        actions: CommitActions<'_>,
        updated_actions: &UpdatedActions,
    ) -> DeltaResult<CommitResponse>;

    /// The commits the coordinator knows about in `[start_version, end_version]`, ascending. Open
    /// bounds mean "from the first tracked commit" and "up to the latest". Commits already
    /// backfilled and no longer tracked by the coordinator may be omitted.
    fn get_commits(
        &self,
        engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        start_version: Option<Version>,
        end_version: Option<Version>,
    ) -> DeltaResult<GetCommitsResponse>;

    /// Make sure every commit up to and including `version` is published in the table's log.
    ///
    /// `last_known_backfilled_version` is a hint only and may be stale. Backfilling versions that
    /// are already published is a no-op; backfilling past the latest accepted version fails with
    /// [`Error::InvalidBackfillVersion`].
    ///
    /// [`Error::InvalidBackfillVersion`]: crate::Error::InvalidBackfillVersion
    fn backfill_to_version(
        &self,
        engine: &dyn Engine,
        table_descriptor: &TableDescriptor,
        version: Version,
        last_known_backfilled_version: Option<Version>,
    ) -> DeltaResult<()>;

    /// Whether `other` is a client for the same logical coordinator. Clients are often built
    /// fresh per table, so this must never compare by pointer.
    fn semantic_equals(&self, other: &dyn CommitCoordinatorClient) -> bool;
}
