//! Request and response values exchanged with a [`CommitCoordinatorClient`].
//!
//! [`CommitCoordinatorClient`]: super::CommitCoordinatorClient

use std::collections::HashMap;
use std::fmt;

use url::Url;

use crate::actions::{CommitInfo, Metadata, Protocol};
use crate::{FileMeta, Version};

/// The catalog-qualified name of a table, e.g. `catalog.schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentifier {
    namespace: Vec<String>,
    name: String,
}

impl TableIdentifier {
    pub fn new(
        namespace: impl IntoIterator<Item = impl Into<String>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.namespace {
            write!(f, "{part}.")?;
        }
        write!(f, "{}", self.name)
    }
}

/// Identifies a table to its coordinator: where its log lives, its catalog name if it has one,
/// and the table configuration the coordinator issued when the table was registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    log_path: Url,
    table_identifier: Option<TableIdentifier>,
    table_conf: HashMap<String, String>,
}

impl TableDescriptor {
    pub fn new(
        log_path: Url,
        table_identifier: Option<TableIdentifier>,
        table_conf: HashMap<String, String>,
    ) -> Self {
        Self {
            log_path,
            table_identifier,
            table_conf,
        }
    }

    /// The `_delta_log/` directory of the table.
    pub fn log_path(&self) -> &Url {
        &self.log_path
    }

    pub fn table_identifier(&self) -> Option<&TableIdentifier> {
        self.table_identifier.as_ref()
    }

    pub fn table_conf(&self) -> &HashMap<String, String> {
        &self.table_conf
    }
}

/// One entry of a table's ordered log as seen by a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    version: Version,
    file: FileMeta,
    commit_timestamp: i64,
    published_file: Option<FileMeta>,
}

impl Commit {
    /// A commit the coordinator accepted whose actions are in `file` (usually a staged commit).
    pub fn new(version: Version, file: FileMeta, commit_timestamp: i64) -> Self {
        Self {
            version,
            file,
            commit_timestamp,
            published_file: None,
        }
    }

    /// Mark the commit as backfilled to `published_file`.
    pub fn with_published_file(mut self, published_file: FileMeta) -> Self {
        self.published_file = Some(published_file);
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The file the coordinator recorded the commit's actions in.
    pub fn file(&self) -> &FileMeta {
        &self.file
    }

    /// The in-commit timestamp of the commit if it carries one, else the time the coordinator
    /// recorded it.
    pub fn commit_timestamp(&self) -> i64 {
        self.commit_timestamp
    }

    /// The published log file, once the commit has been backfilled.
    pub fn published_file(&self) -> Option<&FileMeta> {
        self.published_file.as_ref()
    }

    pub fn is_backfilled(&self) -> bool {
        self.published_file.is_some()
    }
}

/// The result of a successful commit: the commit as the coordinator recorded it. The version is
/// the one the coordinator assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    commit: Commit,
}

impl CommitResponse {
    pub fn new(commit: Commit) -> Self {
        Self { commit }
    }

    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    pub fn into_commit(self) -> Commit {
        self.commit
    }
}

/// Commits in a requested range, plus the newest version the coordinator knows about, which
/// may be past the end of the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCommitsResponse {
    commits: Vec<Commit>,
    latest_table_version: Version,
}

impl GetCommitsResponse {
    pub fn new(commits: Vec<Commit>, latest_table_version: Version) -> Self {
        Self {
            commits,
            latest_table_version,
        }
    }

    /// The commits, ascending by version with no gaps.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn into_commits(self) -> Vec<Commit> {
        self.commits
    }

    pub fn latest_table_version(&self) -> Version {
        self.latest_table_version
    }
}

/// What a commit changes about the table, so the coordinator can validate protocol and
/// metadata transitions before accepting it. Unchanged metadata or protocol is passed as both
/// the old and the new value.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedActions {
    commit_info: CommitInfo,
    new_metadata: Metadata,
    new_protocol: Protocol,
    old_metadata: Metadata,
    old_protocol: Protocol,
}

impl UpdatedActions {
    pub fn new(
        commit_info: CommitInfo,
        new_metadata: Metadata,
        new_protocol: Protocol,
        old_metadata: Metadata,
        old_protocol: Protocol,
    ) -> Self {
        Self {
            commit_info,
            new_metadata,
            new_protocol,
            old_metadata,
            old_protocol,
        }
    }

    pub fn commit_info(&self) -> &CommitInfo {
        &self.commit_info
    }

    pub fn new_metadata(&self) -> &Metadata {
        &self.new_metadata
    }

    pub fn new_protocol(&self) -> &Protocol {
        &self.new_protocol
    }

    pub fn old_metadata(&self) -> &Metadata {
        &self.old_metadata
    }

    pub fn old_protocol(&self) -> &Protocol {
        &self.old_protocol
    }

    pub fn is_metadata_changed(&self) -> bool {
        self.new_metadata != self.old_metadata
    }

    pub fn is_protocol_changed(&self) -> bool {
        self.new_protocol != self.old_protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_identifier_display() {
        let id = TableIdentifier::new(["main", "sales"], "orders");
        assert_eq!(id.to_string(), "main.sales.orders");
        assert_eq!(id.namespace(), ["main", "sales"]);
        assert_eq!(TableIdentifier::new(Vec::<String>::new(), "t").to_string(), "t");
    }

    #[test]
    fn test_commit_backfill_state() {
        let staged = Url::parse(
            "memory:///t/_delta_log/_staged_commits/00000000000000000001.3a0d65cd-4a56-49a8-937b-95f9e3ee90e5.json",
        )
        .unwrap();
        let published = Url::parse("memory:///t/_delta_log/00000000000000000001.json").unwrap();
        let commit = Commit::new(1, FileMeta::new(staged, 10, 20), 10);
        assert!(!commit.is_backfilled());

        let commit = commit.with_published_file(FileMeta::new(published.clone(), 11, 20));
        assert!(commit.is_backfilled());
        assert_eq!(commit.published_file().map(|f| &f.location), Some(&published));
        assert_eq!(commit.commit_timestamp(), 10);
    }
}
