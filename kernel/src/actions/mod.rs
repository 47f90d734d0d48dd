//! Log actions.
//!
//! Commit files hold one action per line, each a JSON object keyed by the action type. Only the
//! actions commit coordination reads are modeled: [`CommitInfo`], [`Metadata`] and [`Protocol`].
//! Every other action (`add`, `remove`, `txn`, ...) round-trips untouched as [`Action::Other`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::table_features::{TableFeature, SUPPORTED_WRITER_FEATURES};
use crate::table_properties::TableProperties;
use crate::utils::require;
use crate::{DeltaResult, Error};

/// The reader version at which table features were introduced
pub(crate) const TABLE_FEATURES_MIN_READER_VERSION: i32 = 3;
/// The writer version at which table features were introduced
pub(crate) const TABLE_FEATURES_MIN_WRITER_VERSION: i32 = 7;

/// A single line of a commit file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    CommitInfo(CommitInfo),
    #[serde(rename = "metaData")]
    Metadata(Metadata),
    Protocol(Protocol),
    /// Any action this crate does not interpret, kept verbatim
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl Action {
    pub fn as_commit_info(&self) -> Option<&CommitInfo> {
        match self {
            Action::CommitInfo(commit_info) => Some(commit_info),
            _ => None,
        }
    }
}

impl From<CommitInfo> for Action {
    fn from(value: CommitInfo) -> Self {
        Action::CommitInfo(value)
    }
}

impl From<Metadata> for Action {
    fn from(value: Metadata) -> Self {
        Action::Metadata(value)
    }
}

impl From<Protocol> for Action {
    fn from(value: Protocol) -> Self {
        Action::Protocol(value)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    /// Name of the encoding for files in this table
    pub provider: String,
    /// A map containing configuration options for the format
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Format {
    fn parquet() -> Self {
        Self {
            provider: "parquet".to_string(),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique identifier for this table
    pub(crate) id: String,
    /// User-provided identifier for this table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    /// User-provided description for this table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    /// Specification of the encoding for the files stored in the table
    pub(crate) format: Format,
    /// Schema of the table, serialized as JSON. Kept opaque here.
    pub(crate) schema_string: String,
    /// Column names by which the data should be partitioned
    #[serde(default)]
    pub(crate) partition_columns: Vec<String>,
    /// The time when this metadata action is created, in milliseconds since the Unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) created_time: Option<i64>,
    /// Configuration options for the metadata action. These are parsed into [`TableProperties`].
    #[serde(default)]
    pub(crate) configuration: HashMap<String, String>,
}

impl Metadata {
    /// Create a new metadata action with a fresh table id.
    pub fn try_new(
        name: Option<String>,
        description: Option<String>,
        schema_string: impl Into<String>,
        partition_columns: Vec<String>,
        created_time: i64,
        configuration: HashMap<String, String>,
    ) -> DeltaResult<Self> {
        let schema_string = schema_string.into();
        // the schema is opaque to this crate, but it must at least be a JSON object
        let schema: serde_json::Value = serde_json::from_str(&schema_string)?;
        require!(
            schema.is_object(),
            Error::generic(format!("Table schema must be a JSON object: {schema_string}"))
        );
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            format: Format::parquet(),
            schema_string,
            partition_columns,
            created_time: Some(created_time),
            configuration,
        })
    }

    /// A copy of this metadata with `configuration` merged over the existing configuration.
    pub fn with_configuration(
        mut self,
        configuration: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.configuration.extend(configuration);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn schema_string(&self) -> &str {
        &self.schema_string
    }

    pub fn partition_columns(&self) -> &[String] {
        &self.partition_columns
    }

    pub fn created_time(&self) -> Option<i64> {
        self.created_time
    }

    pub fn configuration(&self) -> &HashMap<String, String> {
        &self.configuration
    }

    pub fn parse_table_properties(&self) -> TableProperties {
        TableProperties::from(self.configuration.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// The minimum version of the Delta read protocol that a client must implement
    /// in order to correctly read this table
    min_reader_version: i32,
    /// The minimum version of the Delta write protocol that a client must implement
    /// in order to correctly write this table
    min_writer_version: i32,
    /// A collection of features that a client must implement in order to correctly
    /// read this table (exist only when minReaderVersion is set to 3)
    #[serde(skip_serializing_if = "Option::is_none")]
    reader_features: Option<Vec<TableFeature>>,
    /// A collection of features that a client must implement in order to correctly
    /// write this table (exist only when minWriterVersion is set to 7)
    #[serde(skip_serializing_if = "Option::is_none")]
    writer_features: Option<Vec<TableFeature>>,
}

impl Protocol {
    /// Try to create a new Protocol instance from reader/writer versions and table features. This
    /// can fail if the protocol is invalid.
    pub fn try_new(
        min_reader_version: i32,
        min_writer_version: i32,
        reader_features: Option<impl IntoIterator<Item = TableFeature>>,
        writer_features: Option<impl IntoIterator<Item = TableFeature>>,
    ) -> DeltaResult<Self> {
        let reader_features = reader_features.map(|f| f.into_iter().collect::<Vec<_>>());
        let writer_features = writer_features.map(|f| f.into_iter().collect::<Vec<_>>());
        if min_reader_version == TABLE_FEATURES_MIN_READER_VERSION {
            require!(
                reader_features.is_some(),
                Error::invalid_protocol(
                    "Reader features must be present when minimum reader version = 3"
                )
            );
        }
        if min_writer_version == TABLE_FEATURES_MIN_WRITER_VERSION {
            require!(
                writer_features.is_some(),
                Error::invalid_protocol(
                    "Writer features must be present when minimum writer version = 7"
                )
            );
        }
        Ok(Protocol {
            min_reader_version,
            min_writer_version,
            reader_features,
            writer_features,
        })
    }

    pub fn min_reader_version(&self) -> i32 {
        self.min_reader_version
    }

    pub fn min_writer_version(&self) -> i32 {
        self.min_writer_version
    }

    pub fn reader_features(&self) -> Option<&[TableFeature]> {
        self.reader_features.as_deref()
    }

    pub fn writer_features(&self) -> Option<&[TableFeature]> {
        self.writer_features.as_deref()
    }

    /// True if this protocol has the requested feature in either its reader or writer features
    pub(crate) fn has_table_feature(&self, feature: &TableFeature) -> bool {
        self.reader_features()
            .into_iter()
            .chain(self.writer_features())
            .flatten()
            .any(|f| f == feature)
    }

    /// Check if writing to a table with this protocol is supported. Writers here only append
    /// commit-level actions, so the check is limited to protocol versions and known features.
    pub(crate) fn ensure_write_supported(&self) -> DeltaResult<()> {
        require!(
            self.min_reader_version <= TABLE_FEATURES_MIN_READER_VERSION,
            Error::unsupported(format!(
                "Unsupported minimum reader version {}",
                self.min_reader_version
            ))
        );
        match self.min_writer_version {
            version if version < TABLE_FEATURES_MIN_WRITER_VERSION => Ok(()),
            TABLE_FEATURES_MIN_WRITER_VERSION => {
                let unsupported: Vec<_> = self
                    .writer_features()
                    .into_iter()
                    .flatten()
                    .filter(|f| !SUPPORTED_WRITER_FEATURES.contains(f))
                    .map(|f| f.to_string())
                    .collect();
                require!(
                    unsupported.is_empty(),
                    Error::unsupported(format!(
                        "Unknown WriterFeatures: {}",
                        unsupported.join(", ")
                    ))
                );
                Ok(())
            }
            version => Err(Error::unsupported(format!(
                "Unsupported minimum writer version {version}"
            ))),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    /// The time this logical file was created, as milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// The time this logical file was created, as milliseconds since the epoch. Unlike
    /// `timestamp`, this is monotonic across commits and authoritative when in-commit
    /// timestamps are enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_commit_timestamp: Option<i64>,
    /// An arbitrary string that identifies the operation associated with this commit. This is
    /// specified by the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Map of arbitrary string key-value pairs that provide additional information about the
    /// operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_parameters: Option<HashMap<String, String>>,
    /// The version of the engine that made the commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_info: Option<String>,
    /// A unique transaction identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
}

impl CommitInfo {
    pub(crate) fn new(
        timestamp: i64,
        in_commit_timestamp: Option<i64>,
        operation: Option<String>,
        engine_info: Option<String>,
    ) -> Self {
        Self {
            timestamp: Some(timestamp),
            in_commit_timestamp,
            operation: Some(operation.unwrap_or_else(|| "UNKNOWN".to_string())),
            operation_parameters: Some(HashMap::new()),
            engine_info,
            txn_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }
}
