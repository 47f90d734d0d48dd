use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Connection settings for a [`CoordinatorClient`](crate::CoordinatorClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the service API. Always ends with '/', so endpoint paths can be joined onto it.
    pub endpoint: Url,
    /// Bearer token sent with every request.
    pub token: String,
    /// Timeout for a whole request.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    /// Retry `n` waits `retry_base_delay * n` before it is sent.
    pub retry_base_delay: Duration,
}

impl ClientConfig {
    /// Start building a config for the service at `endpoint`.
    pub fn build(endpoint: impl Into<String>, token: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            endpoint: endpoint.into(),
            token: token.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    endpoint: String,
    token: String,
    timeout: Duration,
    connect_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ClientConfigBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, retry_base_delay: Duration) -> Self {
        self.retry_base_delay = retry_base_delay;
        self
    }

    /// Validate the settings. The endpoint must be an http(s) URL; a missing trailing '/' is
    /// added.
    pub fn build(self) -> Result<ClientConfig> {
        let mut endpoint = Url::parse(&self.endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got {endpoint}"
            )));
        }
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        if self.token.is_empty() {
            return Err(Error::InvalidConfig("token must not be empty".to_string()));
        }
        Ok(ClientConfig {
            endpoint,
            token: self.token,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let config = ClientConfig::build("https://coordinator.example.com/api", "secret")
            .with_max_retries(5)
            .with_retry_base_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        assert_eq!(config.endpoint.as_str(), "https://coordinator.example.com/api/");
        assert_eq!(config.token, "secret");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(10));
        assert_eq!(
            config.endpoint.join("commits").unwrap().as_str(),
            "https://coordinator.example.com/api/commits"
        );
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            ClientConfig::build("not a url", "secret").build(),
            Err(Error::UrlParse(_))
        ));
        assert!(matches!(
            ClientConfig::build("file:///tmp/", "secret").build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            ClientConfig::build("http://localhost:8080/", "").build(),
            Err(Error::InvalidConfig(_))
        ));
    }
}
