use serde::{Deserialize, Serialize};

/// Register an existing table with the service. Commits through the service start at
/// `current_version + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterTableRequest {
    pub table_uri: String,
    /// Catalog-qualified name, e.g. `catalog.schema.table`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub current_version: i64,
    pub metadata: serde_json::Value,
    pub protocol: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterTableResponse {
    /// The id to send with every later request for this table.
    pub table_id: String,
}
