#![allow(dead_code)]
//! Helpers shared by the integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use serde_json::{json, Value};
use url::Url;

use cc_kernel::actions::{CommitInfo, Metadata, Protocol};
use cc_kernel::coordinated_commits::{
    CommitCoordinatorBuilder, CommitCoordinatorClient, InMemoryCommitCoordinatorBuilder,
    TableDescriptor, UpdatedActions,
};
use cc_kernel::engine::default::executor::tokio::TokioBackgroundExecutor;
use cc_kernel::engine::default::DefaultEngine;
use cc_kernel::table_features::TableFeature;
use cc_kernel::table_properties::{
    COORDINATED_COMMITS_COORDINATOR_CONF, COORDINATED_COMMITS_COORDINATOR_NAME,
    COORDINATED_COMMITS_TABLE_CONF,
};
use cc_kernel::{Action, DeltaResult, Engine, Version};

pub const SCHEMA_STRING: &str = r#"{"type":"struct","fields":[{"name":"id","type":"long","nullable":true,"metadata":{}}]}"#;

pub fn setup_test() -> (
    Arc<InMemory>,
    Arc<DefaultEngine<TokioBackgroundExecutor>>,
    Url,
) {
    let storage = Arc::new(InMemory::new());
    let table_root = Url::parse("memory:///").unwrap();
    let engine = Arc::new(DefaultEngine::new(storage.clone()));
    (storage, engine, table_root)
}

pub fn delta_path_for_version(version: Version) -> Path {
    Path::from(format!("_delta_log/{version:020}.json"))
}

pub fn actions_to_string(actions: impl IntoIterator<Item = Value>) -> String {
    actions
        .into_iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn add_commit(
    store: &dyn ObjectStore,
    version: Version,
    data: String,
) -> Result<(), Box<dyn std::error::Error>> {
    store
        .put(&delta_path_for_version(version), data.into())
        .await?;
    Ok(())
}

pub fn commit_info(timestamp: i64, ict: Option<i64>) -> Value {
    let mut commit_info = json!({ "timestamp": timestamp, "operation": "WRITE" });
    if let Some(ict) = ict {
        commit_info["inCommitTimestamp"] = json!(ict);
    }
    json!({ "commitInfo": commit_info })
}

pub fn protocol(ict_enabled: bool) -> Value {
    if ict_enabled {
        json!({"protocol": {
            "minReaderVersion": 3,
            "minWriterVersion": 7,
            "readerFeatures": [],
            "writerFeatures": ["inCommitTimestamp"]
        }})
    } else {
        json!({"protocol": {"minReaderVersion": 1, "minWriterVersion": 2}})
    }
}

pub fn metadata(configuration: Value) -> Value {
    json!({"metaData": {
        "id": "5fba94ed-9794-4965-ba6e-6ee3c0d22af9",
        "format": {"provider": "parquet", "options": {}},
        "schemaString": SCHEMA_STRING,
        "partitionColumns": [],
        "configuration": configuration,
        "createdTime": 1677811175819u64
    }})
}

/// Metadata and protocol of a table with no features, for calls that need "the table's state"
/// without caring what it is.
pub fn base_metadata_and_protocol() -> (Metadata, Protocol) {
    let metadata =
        Metadata::try_new(None, None, SCHEMA_STRING, vec![], 0, HashMap::new()).unwrap();
    let protocol =
        Protocol::try_new(1, 2, None::<Vec<TableFeature>>, None::<Vec<TableFeature>>).unwrap();
    (metadata, protocol)
}

pub fn unchanged_actions(commit_info: CommitInfo) -> UpdatedActions {
    let (metadata, protocol) = base_metadata_and_protocol();
    UpdatedActions::new(
        commit_info,
        metadata.clone(),
        protocol.clone(),
        metadata,
        protocol,
    )
}

/// Register a table at version 0 with a fresh client of `builder`, and write a published commit 0
/// whose metadata points at the coordinator. Returns the descriptor the coordinator expects.
pub async fn create_coordinated_table(
    store: &dyn ObjectStore,
    engine: &dyn Engine,
    builder: &InMemoryCommitCoordinatorBuilder,
    table_root: &Url,
    ict_enabled: bool,
) -> DeltaResult<TableDescriptor> {
    let client = builder.build(engine, &HashMap::new())?;
    let log_path = table_root.join("_delta_log/")?;
    let (base_metadata, base_protocol) = base_metadata_and_protocol();
    let table_conf = client.register_table(
        engine,
        &log_path,
        None,
        0,
        &base_metadata,
        &base_protocol,
    )?;

    let mut configuration = json!({
        COORDINATED_COMMITS_COORDINATOR_NAME: builder.name(),
        COORDINATED_COMMITS_COORDINATOR_CONF: "{}",
        COORDINATED_COMMITS_TABLE_CONF: serde_json::to_string(&table_conf)?,
    });
    if ict_enabled {
        configuration["delta.enableInCommitTimestamps"] = json!("true");
    }
    add_commit(
        store,
        0,
        actions_to_string([
            commit_info(1_000, ict_enabled.then_some(1_000)),
            protocol(ict_enabled),
            metadata(configuration),
        ]),
    )
    .await
    .map_err(|e| cc_kernel::Error::generic(e.to_string()))?;
    Ok(TableDescriptor::new(log_path, None, table_conf))
}

/// Commit `version` straight through `client`, with a commit info carrying `ict`.
pub fn commit_through(
    client: &dyn CommitCoordinatorClient,
    engine: &dyn Engine,
    descriptor: &TableDescriptor,
    version: Version,
    ict: Option<i64>,
) -> DeltaResult<()> {
    let commit_info = CommitInfo {
        timestamp: Some(ict.unwrap_or(version as i64)),
        in_commit_timestamp: ict,
        operation: Some("WRITE".to_string()),
        ..Default::default()
    };
    let updated_actions = unchanged_actions(commit_info.clone());
    let actions = std::iter::once(Ok(Action::CommitInfo(commit_info)));
    client.commit(
        engine,
        descriptor,
        version,
        Box::new(actions),
        &updated_actions,
    )?;
    Ok(())
}
