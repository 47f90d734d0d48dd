use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use cc_client::{ClientConfig, CoordinatorClient};
use cc_kernel::coordinated_commits::{CommitCoordinatorBuilder, CommitCoordinatorClient};
use cc_kernel::engine::default::executor::tokio::TokioBackgroundExecutor;
use cc_kernel::{DeltaResult, Engine, Error};

use crate::coordinator::RestCommitCoordinator;

/// Coordinator configuration key for the service endpoint.
pub const URL_KEY: &str = "url";
/// Coordinator configuration key for the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Optional coordinator configuration key for the number of retries of read and registration
/// requests. Commits are never retried.
pub const MAX_RETRIES_KEY: &str = "maxRetries";

const DEFAULT_NAME: &str = "rest";

/// Builds [`RestCommitCoordinator`]s from a table's coordinator configuration. All clients it
/// builds share one background runtime.
#[derive(Debug, Clone)]
pub struct RestCommitCoordinatorBuilder {
    name: String,
    executor: Arc<TokioBackgroundExecutor>,
}

impl Default for RestCommitCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RestCommitCoordinatorBuilder {
    pub fn new() -> Self {
        Self::with_name(DEFAULT_NAME)
    }

    /// A builder registered under `name` instead of `"rest"`.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executor: Arc::new(TokioBackgroundExecutor::new()),
        }
    }
}

impl CommitCoordinatorBuilder for RestCommitCoordinatorBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(
        &self,
        _engine: &dyn Engine,
        conf: &HashMap<String, String>,
    ) -> DeltaResult<Arc<dyn CommitCoordinatorClient>> {
        let required = |key: &str| {
            conf.get(key).ok_or_else(|| {
                Error::generic(format!(
                    "commit coordinator {} requires '{key}' in its configuration",
                    self.name
                ))
            })
        };
        let mut config = ClientConfig::build(required(URL_KEY)?, required(TOKEN_KEY)?);
        if let Some(max_retries) = conf.get(MAX_RETRIES_KEY) {
            let max_retries = max_retries.parse().map_err(|_| {
                Error::generic(format!(
                    "'{MAX_RETRIES_KEY}' must be a non-negative integer, got {max_retries}"
                ))
            })?;
            config = config.with_max_retries(max_retries);
        }
        let config = config.build().map_err(Error::generic_err)?;
        debug!("building commit coordinator for {}", config.endpoint);
        let client = CoordinatorClient::new(config).map_err(Error::generic_err)?;
        Ok(Arc::new(RestCommitCoordinator::new(
            client,
            self.executor.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use cc_kernel::coordinated_commits::InMemoryCommitCoordinatorBuilder;
    use cc_kernel::engine::default::DefaultEngine;
    use object_store::memory::InMemory;

    use super::*;

    fn conf(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_build_from_conf() {
        let engine = DefaultEngine::new(Arc::new(InMemory::new()));
        let builder = RestCommitCoordinatorBuilder::new();
        assert_eq!(builder.name(), "rest");

        let client = builder
            .build(
                &engine,
                &conf(&[
                    (URL_KEY, "http://localhost:9000/api"),
                    (TOKEN_KEY, "t"),
                    (MAX_RETRIES_KEY, "1"),
                ]),
            )
            .unwrap();
        let rest = client
            .as_ref()
            .any_ref()
            .downcast_ref::<RestCommitCoordinator>()
            .unwrap();
        assert_eq!(rest.endpoint().as_str(), "http://localhost:9000/api/");

        for bad in [
            conf(&[(TOKEN_KEY, "t")]),
            conf(&[(URL_KEY, "http://localhost:9000/")]),
            conf(&[
                (URL_KEY, "http://localhost:9000/"),
                (TOKEN_KEY, "t"),
                (MAX_RETRIES_KEY, "-1"),
            ]),
            conf(&[(URL_KEY, "ftp://localhost/"), (TOKEN_KEY, "t")]),
        ] {
            assert!(builder.build(&engine, &bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_semantic_equality_is_by_endpoint() {
        let engine = DefaultEngine::new(Arc::new(InMemory::new()));
        let build = |builder: &RestCommitCoordinatorBuilder, url: &str, token: &str| {
            builder
                .build(&engine, &conf(&[(URL_KEY, url), (TOKEN_KEY, token)]))
                .unwrap()
        };
        let first = RestCommitCoordinatorBuilder::new();
        let second = RestCommitCoordinatorBuilder::with_name("other-rest");

        let a = build(&first, "http://localhost:9000/api/", "t1");
        let b = build(&second, "http://localhost:9000/api", "t2");
        let c = build(&first, "http://localhost:9001/api/", "t1");
        assert!(a.semantic_equals(b.as_ref()));
        assert!(b.semantic_equals(a.as_ref()));
        assert!(!a.semantic_equals(c.as_ref()));

        let in_memory = InMemoryCommitCoordinatorBuilder::new("rest")
            .build(&engine, &HashMap::new())
            .unwrap();
        assert!(!a.semantic_equals(in_memory.as_ref()));
        assert!(!in_memory.semantic_equals(a.as_ref()));
    }
}
