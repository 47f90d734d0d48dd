use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use super::{
    CommitActions, CommitCoordinatorClient, CommitResponse, GetCommitsResponse, TableDescriptor,
    TableIdentifier, UpdatedActions,
};
use crate::{DeltaResult, Engine, Version};

/// A [`CommitCoordinatorClient`] bound to a single table.
///
/// The handler builds the table's [`TableDescriptor`] once, from its log path and the table
/// configuration persisted in its metadata, and passes it along on every call.
#[derive(Debug, Clone)]
pub struct TableCommitCoordinatorClientHandler {
    client: Arc<dyn CommitCoordinatorClient>,
    table_descriptor: TableDescriptor,
}

impl TableCommitCoordinatorClientHandler {
    pub fn new(
        client: Arc<dyn CommitCoordinatorClient>,
        log_path: Url,
        table_conf: HashMap<String, String>,
    ) -> Self {
        Self {
            client,
            table_descriptor: TableDescriptor::new(log_path, None, table_conf),
        }
    }

    /// Attach the catalog name of the table to the descriptor.
    pub fn with_table_identifier(self, table_identifier: TableIdentifier) -> Self {
        let descriptor = self.table_descriptor;
        Self {
            client: self.client,
            table_descriptor: TableDescriptor::new(
                descriptor.log_path().clone(),
                Some(table_identifier),
                descriptor.table_conf().clone(),
            ),
        }
    }

    pub fn table_descriptor(&self) -> &TableDescriptor {
        &self.table_descriptor
    }

    pub fn client(&self) -> &Arc<dyn CommitCoordinatorClient> {
        &self.client
    }

    /// See [`CommitCoordinatorClient::commit`].
    pub fn commit(
        &self,
        engine: &dyn Engine,
        commit_version: Version,
        actions: CommitActions<'_>,
        updated_actions: &UpdatedActions,
    ) -> DeltaResult<CommitResponse> {
        self.client.commit(
            engine,
            &self.table_descriptor,
            commit_version,
            actions,
            updated_actions,
        )
    }

    /// See [`CommitCoordinatorClient::get_commits`].
    pub fn get_commits(
        &self,
        engine: &dyn Engine,
        start_version: Option<Version>,
        end_version: Option<Version>,
    ) -> DeltaResult<GetCommitsResponse> {
        self.client
            .get_commits(engine, &self.table_descriptor, start_version, end_version)
    }

    /// See [`CommitCoordinatorClient::backfill_to_version`].
    pub fn backfill_to_version(
        &self,
        engine: &dyn Engine,
        version: Version,
        last_known_backfilled_version: Option<Version>,
    ) -> DeltaResult<()> {
        self.client.backfill_to_version(
            engine,
            &self.table_descriptor,
            version,
            last_known_backfilled_version,
        )
    }

    /// Whether this handler's client and `other` are the same logical coordinator.
    pub fn semantic_equals_client(&self, other: &dyn CommitCoordinatorClient) -> bool {
        self.client.semantic_equals(other)
    }

    /// Whether both handlers wrap clients for the same logical coordinator. The table each
    /// handler is bound to is not compared.
    pub fn semantic_equals(&self, other: &TableCommitCoordinatorClientHandler) -> bool {
        self.semantic_equals_client(other.client.as_ref())
    }
}
