use std::iter;

use tracing::debug;

use crate::actions::{CommitInfo, Metadata};
use crate::committer::{CommitMetadata, CommitResponse, Committer, FileSystemCommitter};
use crate::coordinated_commits::UpdatedActions;
use crate::error::Error;
use crate::path::LogRoot;
use crate::snapshot::SnapshotRef;
use crate::utils::{current_time_ms, require};
use crate::{Action, DeltaResult, Engine, FileMeta, Version};

/// A transaction represents an in-progress write to a table. After creating a transaction, changes
/// to the table may be staged via the transaction methods before calling `commit` to commit the
/// changes to the table.
///
/// The commit is attempted at the version after the snapshot the transaction was created from.
/// Nothing is rebased: if another writer got there first the result is a
/// [`CommitResult::ConflictedTransaction`].
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use cc_kernel::{DeltaResult, Engine, Snapshot};
/// # use cc_kernel::transaction::CommitResult;
/// # fn example(engine: &dyn Engine, table_root: url::Url) -> DeltaResult<()> {
/// let snapshot = Snapshot::builder_for(table_root).build(engine)?;
/// // commits go through the table's commit coordinator if it has one
/// let txn = snapshot
///     .transaction(engine)?
///     .with_operation("WRITE".to_string())
///     .with_engine_info("my engine");
/// match txn.commit(engine)? {
///     CommitResult::CommittedTransaction(committed) => {
///         println!("committed version {}", committed.commit_version())
///     }
///     CommitResult::ConflictedTransaction(conflicted) => {
///         println!("version {} was taken", conflicted.conflict_version())
///     }
///     CommitResult::RetryableTransaction(retryable) => return Err(retryable.error),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Transaction {
    read_snapshot: SnapshotRef,
    committer: Box<dyn Committer>,
    operation: Option<String>,
    engine_info: Option<String>,
    new_metadata: Option<Metadata>,
    actions: Vec<Action>,
    // commit-wide timestamp (in milliseconds since epoch) - used in ICT and commit info to keep
    // all timestamps within the same commit consistent.
    commit_timestamp: i64,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!(
            "Transaction {{ read_snapshot version: {}, engine_info: {} }}",
            self.read_snapshot.version(),
            self.engine_info.is_some()
        ))
    }
}

impl Transaction {
    /// Create a new transaction from a snapshot. The snapshot will be used to read the current
    /// state of the table (e.g. to read the current version).
    ///
    /// Instead of using this API, the more typical (user-facing) API is
    /// [Snapshot::transaction](crate::snapshot::Snapshot::transaction) to create a transaction from
    /// a snapshot.
    pub(crate) fn try_new(
        snapshot: impl Into<SnapshotRef>,
        committer: Box<dyn Committer>,
    ) -> DeltaResult<Self> {
        let read_snapshot = snapshot.into();

        // important! before writing to the table we must check it is supported
        read_snapshot
            .table_configuration()
            .ensure_write_supported()?;

        let commit_timestamp = current_time_ms()?;

        Ok(Transaction {
            read_snapshot,
            committer,
            operation: None,
            engine_info: None,
            new_metadata: None,
            actions: vec![],
            commit_timestamp,
        })
    }

    /// Set the committer that will be used to commit this transaction. Note that the
    /// [`FileSystemCommitter`] is refused for tables with coordinated commits enabled.
    ///
    /// See [`committer`] module for more details.
    ///
    /// [`committer`]: crate::committer
    pub fn with_committer(mut self, committer: Box<dyn Committer>) -> Self {
        self.committer = committer;
        self
    }

    /// Set the operation that this transaction is performing. This string will be persisted in the
    /// commit and visible to anyone who describes the table history.
    pub fn with_operation(mut self, operation: String) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Set the engine info field of this transaction's commit info action. This field is optional.
    pub fn with_engine_info(mut self, engine_info: impl Into<String>) -> Self {
        self.engine_info = Some(engine_info.into());
        self
    }

    /// Replace the table's metadata with `metadata` in this commit. The commit coordinator, if
    /// any, sees the change through [`UpdatedActions::new_metadata`].
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.new_metadata = Some(metadata);
        self
    }

    /// Add an action to be written in this commit, after the commit info and any metadata
    /// update. Commit info, metadata and protocol actions are managed by the transaction and are
    /// rejected at commit time.
    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// The version this transaction will try to commit.
    pub fn commit_version(&self) -> Version {
        self.read_snapshot.version() + 1
    }

    /// Consume the transaction and commit it to the table. The result is a result of
    /// [CommitResult] with the following semantics:
    /// - Ok(CommitResult) for either success or a recoverable error (includes the failed
    ///   transaction in case of a conflict so the user can retry, etc.)
    /// - Err(Error) indicates a non-retryable error (e.g. logic/validation error).
    pub fn commit(self, engine: &dyn Engine) -> DeltaResult<CommitResult> {
        if let Some(action) = self.actions.iter().find(|action| {
            matches!(
                action,
                Action::CommitInfo(_) | Action::Metadata(_) | Action::Protocol(_)
            )
        }) {
            return Err(Error::generic(format!(
                "Transactions write their own commit info, metadata and protocol actions, got {action:?}"
            )));
        }

        let table_configuration = self.read_snapshot.table_configuration();
        require!(
            !(self.committer.as_ref().any_ref().is::<FileSystemCommitter>()
                && table_configuration.is_coordinated_commits_enabled()),
            Error::generic(
                "The FileSystemCommitter cannot be used to commit to tables with coordinated \
                 commits enabled. Create the transaction with Snapshot::transaction to commit \
                 through the table's commit coordinator."
            )
        );

        // Construct commit info with ICT if enabled
        let in_commit_timestamp = self
            .read_snapshot
            .get_in_commit_timestamp(engine)?
            .map(|prev_ict| {
                // The Delta protocol requires the timestamp to be "the larger of two values":
                // - The time at which the writer attempted the commit (current_time)
                // - One millisecond later than the previous commit's inCommitTimestamp
                self.commit_timestamp.max(prev_ict + 1)
            });
        let commit_info = CommitInfo::new(
            self.commit_timestamp,
            in_commit_timestamp,
            self.operation.clone(),
            self.engine_info.clone(),
        );

        let old_metadata = table_configuration.metadata().clone();
        let old_protocol = table_configuration.protocol().clone();
        let updated_actions = UpdatedActions::new(
            commit_info.clone(),
            self.new_metadata.clone().unwrap_or_else(|| old_metadata.clone()),
            old_protocol.clone(),
            old_metadata,
            old_protocol,
        );

        // the commit info must always be the first action in the commit
        let actions: Vec<Action> = iter::once(Action::CommitInfo(commit_info))
            .chain(self.new_metadata.clone().map(Action::Metadata))
            .chain(self.actions.iter().cloned())
            .collect();

        let commit_version = self.commit_version();
        let log_root = LogRoot::new(self.read_snapshot.table_root().clone())?;
        let commit_metadata = CommitMetadata::new(
            log_root,
            commit_version,
            in_commit_timestamp.unwrap_or(self.commit_timestamp),
            self.read_snapshot.log_segment().max_published_version,
            updated_actions,
        );
        debug!(
            "committing version {commit_version} of {} through {}",
            self.read_snapshot.table_root(),
            self.committer.as_ref().type_name()
        );
        match self.committer.commit(
            engine,
            Box::new(actions.into_iter().map(Ok)),
            commit_metadata,
        ) {
            Ok(CommitResponse::Committed { file_meta }) => Ok(CommitResult::CommittedTransaction(
                self.into_committed(commit_version, file_meta),
            )),
            Ok(CommitResponse::Conflict { version }) => Ok(CommitResult::ConflictedTransaction(
                self.into_conflicted(version),
            )),
            Err(e) if e.is_retryable() => {
                Ok(CommitResult::RetryableTransaction(self.into_retryable(e)))
            }
            Err(e) => Err(e),
        }
    }

    fn into_committed(self, commit_version: Version, commit_file: FileMeta) -> CommittedTransaction {
        CommittedTransaction {
            transaction: self,
            commit_version,
            commit_file,
        }
    }

    fn into_conflicted(self, conflict_version: Version) -> ConflictedTransaction {
        ConflictedTransaction {
            transaction: self,
            conflict_version,
        }
    }

    fn into_retryable(self, error: Error) -> RetryableTransaction {
        RetryableTransaction {
            transaction: self,
            error,
        }
    }
}

/// The result of attempting to commit this transaction. If the commit was
/// successful/conflicted/retryable, the result is Ok(CommitResult), otherwise, if a nonrecoverable
/// error occurred, the result is Err(Error).
///
/// The commit result can be one of the following:
/// - [CommittedTransaction]: the transaction was successfully committed.
/// - [ConflictedTransaction]: the transaction conflicted with an existing version. The caller
///   must build a new transaction from a fresh snapshot before retrying.
/// - [RetryableTransaction]: an IO or transport (retryable) error occurred during the commit.
///   This transaction can be retried without rebasing.
#[derive(Debug)]
#[must_use]
pub enum CommitResult {
    /// The transaction was successfully committed.
    CommittedTransaction(CommittedTransaction),
    /// This transaction conflicted with an existing version (see
    /// [ConflictedTransaction::conflict_version]).
    ConflictedTransaction(ConflictedTransaction),
    /// An IO or transport (retryable) error occurred during the commit.
    RetryableTransaction(RetryableTransaction),
}

impl CommitResult {
    /// Returns true if the commit was successful.
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::CommittedTransaction(_))
    }
}

/// This is the result of a successfully committed [Transaction].
#[derive(Debug)]
pub struct CommittedTransaction {
    transaction: Transaction,
    /// the version of the table that was just committed
    commit_version: Version,
    /// the file the commit was written to; a staged commit for coordinated tables
    commit_file: FileMeta,
}

impl CommittedTransaction {
    /// The version of the table that was just sucessfully committed
    pub fn commit_version(&self) -> Version {
        self.commit_version
    }

    /// The file holding the commit. For tables with coordinated commits enabled this is the
    /// staged commit, until the coordinator backfills it.
    pub fn commit_file(&self) -> &FileMeta {
        &self.commit_file
    }

    /// The version of the snapshot the transaction was built on.
    pub fn read_version(&self) -> Version {
        self.transaction.read_snapshot.version()
    }
}

/// This is the result of a conflicted [Transaction]. One can retrieve the [conflict version] from
/// this struct.
///
/// [conflict version]: Self::conflict_version
#[derive(Debug)]
pub struct ConflictedTransaction {
    #[allow(dead_code)]
    transaction: Transaction,
    conflict_version: Version,
}

impl ConflictedTransaction {
    /// The version attempted commit that yielded a conflict
    pub fn conflict_version(&self) -> Version {
        self.conflict_version
    }
}

/// A transaction that failed to commit due to a retryable error (e.g. IO error). The transaction
/// can be recovered with `RetryableTransaction::transaction` and retried without rebasing. The
/// associated error can be inspected via `RetryableTransaction::error`.
#[derive(Debug)]
pub struct RetryableTransaction {
    /// The transaction that failed to commit due to a retryable error.
    pub transaction: Transaction,
    /// Transient error that caused the commit to fail.
    pub error: Error,
}
