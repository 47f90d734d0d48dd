//! The `committer` module provides a [`Committer`] trait which allows different implementations to
//! define how to commit transactions to a table. For tables with coordinated commits enabled the
//! [`CoordinatedCommitter`] hands the commit to the table's commit coordinator. For all other
//! tables, the [`FileSystemCommitter`] should be used to commit directly to the object store (via
//! put-if-absent call to storage to atomically write new commit files).
//!
//! The goal terminal state of every [`Transaction`] is to be committed to the table. This means
//! writing the changes (we call these actions) in the transaction as a new version of the table.
//! The [`Committer`] trait exposes a single method, [`commit`] which takes an engine, an iterator
//! of [`Action`]s, and [`CommitMetadata`] (which includes critical commit metadata like the version
//! to commit).
//!
//! The implementation of [`commit`] must ensure that the actions are committed atomically to the
//! table at the given version and either (1) persisted directly to object storage as published
//! deltas or (2) accepted by the table's commit coordinator, which makes them available to readers
//! until they are backfilled.
//!
//! [`Transaction`]: crate::transaction::Transaction
//! [`commit`]: crate::committer::Committer::commit
//! [`Action`]: crate::Action

mod commit_types;
mod coordinated;
mod filesystem;

pub use commit_types::{CommitMetadata, CommitResponse};
pub use coordinated::CoordinatedCommitter;
pub use filesystem::FileSystemCommitter;

use crate::coordinated_commits::CommitActions;
use crate::{AsAny, DeltaResult, Engine};

/// A Committer is the system by which transactions are committed to a table. Transactions are
/// effectively a collection of actions performed on the table at a specific version.
///
/// Critically, a Committer must implement [`commit`] which takes an engine and an iterator of
/// actions to commit to the table at the given version ([`CommitMetadata::version`]).
///
/// [`commit`]: Committer::commit
//
// Note: While we could omit the Send bound, we keep it here for simplicity - so usage can be
// Box<dyn Committer> (instead of Box<dyn Committer + Send>).
pub trait Committer: Send + AsAny {
    fn commit(
        &self,
        engine: &dyn Engine,
        actions: CommitActions<'_>,
        commit_metadata: CommitMetadata,
    ) -> DeltaResult<CommitResponse>;
}
