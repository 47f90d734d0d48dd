//! Delta Table properties. Note this module implements per-table configuration which governs how
//! table-level capabilities/properties are configured (turned on/off etc.). This is orthogonal to
//! protocol-level 'table features' which enable or disable reader/writer features (which then
//! usually must be enabled/configured by table properties).
//!
//! Parsing is lenient: a recognized key whose value does not parse is kept in
//! [`TableProperties::unknown_properties`] rather than failing the whole table.

use std::collections::HashMap;

use crate::Version;

/// Whether in-commit timestamps are written (and authoritative) for this table.
pub const ENABLE_IN_COMMIT_TIMESTAMPS: &str = "delta.enableInCommitTimestamps";
/// The version at which in-commit timestamps were enabled.
pub const IN_COMMIT_TIMESTAMP_ENABLEMENT_VERSION: &str = "delta.inCommitTimestampEnablementVersion";
/// The in-commit timestamp of the commit that enabled in-commit timestamps.
pub const IN_COMMIT_TIMESTAMP_ENABLEMENT_TIMESTAMP: &str =
    "delta.inCommitTimestampEnablementTimestamp";
/// Whether the table only allows appends.
pub const APPEND_ONLY: &str = "delta.appendOnly";
/// Name of the commit coordinator that owns this table's commits.
pub const COORDINATED_COMMITS_COORDINATOR_NAME: &str =
    "delta.coordinatedCommits.commitCoordinator-preview";
/// JSON object configuring the coordinator backend (endpoint, credentials source, ...).
pub const COORDINATED_COMMITS_COORDINATOR_CONF: &str =
    "delta.coordinatedCommits.commitCoordinatorConf-preview";
/// JSON object of per-table coordinator state, as returned by table registration.
pub const COORDINATED_COMMITS_TABLE_CONF: &str = "delta.coordinatedCommits.tableConf-preview";

/// Delta table properties. These are parsed from the 'configuration' map in the most recent
/// 'Metadata' action of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableProperties {
    /// true for this Delta table to be append-only. If append-only, existing records cannot be
    /// deleted, and existing values cannot be updated.
    pub append_only: Option<bool>,

    /// Whether to enable In-Commit Timestamps. The in-commit timestamps writer feature strongly
    /// associates a monotonically increasing timestamp with each commit by storing it in the
    /// commit's metadata.
    pub enable_in_commit_timestamps: Option<bool>,

    /// The version of the table at which in-commit timestamps were enabled.
    pub in_commit_timestamp_enablement_version: Option<Version>,

    /// The timestamp of the table at which in-commit timestamps were enabled. This must be the same
    /// as the inCommitTimestamp of the commit when this feature was enabled.
    pub in_commit_timestamp_enablement_timestamp: Option<i64>,

    /// The commit coordinator this table is registered with. Absent means commits go straight to
    /// the filesystem.
    pub coordinated_commits_commit_coordinator: Option<String>,

    /// Configuration handed to the commit coordinator builder, as the JSON object it is stored
    /// as. Parsed when the coordinator is resolved, where a malformed value is an error.
    pub coordinated_commits_commit_coordinator_conf: Option<String>,

    /// Table state owned by the commit coordinator, replayed on every coordinator call. Stored
    /// as unparsed JSON like the coordinator configuration.
    pub coordinated_commits_table_conf: Option<String>,

    /// any properties that kernel doesn't recognize (or failed to parse)
    pub unknown_properties: HashMap<String, String>,
}

impl<K, V, I> From<I> for TableProperties
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str> + Into<String>,
    V: AsRef<str> + Into<String>,
{
    fn from(unparsed: I) -> Self {
        let mut props = TableProperties::default();
        for (k, v) in unparsed {
            let parsed = match k.as_ref() {
                APPEND_ONLY => parse_bool(v.as_ref()).map(|val| props.append_only = Some(val)),
                ENABLE_IN_COMMIT_TIMESTAMPS => parse_bool(v.as_ref())
                    .map(|val| props.enable_in_commit_timestamps = Some(val)),
                IN_COMMIT_TIMESTAMP_ENABLEMENT_VERSION => v
                    .as_ref()
                    .parse()
                    .ok()
                    .map(|val| props.in_commit_timestamp_enablement_version = Some(val)),
                IN_COMMIT_TIMESTAMP_ENABLEMENT_TIMESTAMP => v
                    .as_ref()
                    .parse()
                    .ok()
                    .map(|val| props.in_commit_timestamp_enablement_timestamp = Some(val)),
                COORDINATED_COMMITS_COORDINATOR_NAME => {
                    props.coordinated_commits_commit_coordinator = Some(v.as_ref().to_string());
                    Some(())
                }
                COORDINATED_COMMITS_COORDINATOR_CONF => {
                    props.coordinated_commits_commit_coordinator_conf = Some(v.as_ref().to_string());
                    Some(())
                }
                COORDINATED_COMMITS_TABLE_CONF => {
                    props.coordinated_commits_table_conf = Some(v.as_ref().to_string());
                    Some(())
                }
                _ => None,
            };
            if parsed.is_none() {
                props.unknown_properties.insert(k.into(), v.into());
            }
        }
        props
    }
}

/// Deserialize a string representing a boolean. Delta accepts any casing of `true`/`false`.
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
