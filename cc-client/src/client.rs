use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{build_http_client, execute_once, execute_with_retry, handle_response};
use crate::models::{
    CommitRequest, CommitsRequest, CommitsResponse, RegisterTableRequest, RegisterTableResponse,
};

/// An HTTP client for a commit-coordinator service. Cheap to clone; clones share the
/// connection pool.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http_client: reqwest::Client,
    config: ClientConfig,
    base_url: Url,
}

impl CoordinatorClient {
    /// Create a new client from [ClientConfig].
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(&config)?,
            base_url: config.endpoint.clone(),
            config,
        })
    }

    /// Create from existing reqwest Client.
    pub fn with_http_client(http_client: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            base_url: config.endpoint.clone(),
            http_client,
            config,
        }
    }

    /// The service endpoint all requests go to.
    pub fn endpoint(&self) -> &Url {
        &self.base_url
    }

    /// Register an existing table. Registering a table again with the same state returns the
    /// same id.
    #[instrument(skip(self, request), fields(table_uri = %request.table_uri))]
    pub async fn register_table(
        &self,
        request: RegisterTableRequest,
    ) -> Result<RegisterTableResponse> {
        let url = self.base_url.join("tables")?;
        let response = execute_with_retry(&self.config, || {
            self.http_client.post(url.clone()).json(&request).send()
        })
        .await?;

        let registered: RegisterTableResponse = handle_response(response).await?;
        debug!("registered table as {}", registered.table_id);
        Ok(registered)
    }

    /// Ratify a staged commit and/or report backfill progress. Fails with
    /// [`Error::CommitConflict`] if the version was already ratified.
    ///
    /// Sent exactly once: after a server or transport error the commit may or may not have been
    /// applied, and only the caller can find out which by listing commits.
    #[instrument(skip(self, request), fields(table_id = %request.table_id))]
    pub async fn commit(&self, request: CommitRequest) -> Result<()> {
        let url = self.base_url.join("commits")?;
        let response = execute_once(self.http_client.post(url).json(&request).send()).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::TableNotRegistered(request.table_id.clone()));
        }
        #[derive(Deserialize)]
        struct EmptyResponse {}
        let _: EmptyResponse = handle_response(response).await?;
        Ok(())
    }

    /// List the ratified commits the service still tracks.
    #[instrument(skip(self, request), fields(table_id = %request.table_id))]
    pub async fn get_commits(&self, request: CommitsRequest) -> Result<CommitsResponse> {
        let url = self.base_url.join("commits")?;
        let response = execute_with_retry(&self.config, || {
            self.http_client
                .request(reqwest::Method::GET, url.clone())
                .json(&request)
                .send()
        })
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::TableNotRegistered(request.table_id.clone()));
        }
        handle_response(response).await
    }
}
