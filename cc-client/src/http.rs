use std::future::Future;

use reqwest::{header, Client, Response, StatusCode};
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Build a configured HTTP client from the given config.
pub fn build_http_client(config: &ClientConfig) -> Result<Client> {
    let headers = header::HeaderMap::from_iter([
        (
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.token))?,
        ),
        (
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        ),
    ]);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()?;

    Ok(client)
}

/// Execute a request with retry logic for server errors and request failures.
/// Retries up to `max_retries` times with linear backoff: delay = `retry_base_delay * attempt`.
pub async fn execute_with_retry<F, Fut>(config: &ClientConfig, f: F) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<Response, reqwest::Error>>,
{
    for retry in 0..=config.max_retries {
        match f().await {
            Ok(response) if !response.status().is_server_error() => return Ok(response),
            Ok(response) if retry < config.max_retries => {
                warn!(
                    "Server error {}, retrying (attempt {}/{})",
                    response.status(),
                    retry + 1,
                    config.max_retries
                );
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Server error".to_string());
                return Err(Error::ApiError { status, message });
            }
            Err(e) if retry < config.max_retries => {
                warn!(
                    "Request failed, retrying (attempt {}/{}): {}",
                    retry + 1,
                    config.max_retries,
                    e
                );
            }
            Err(e) => return Err(Error::from(e)),
        }

        tokio::time::sleep(config.retry_base_delay * (retry + 1)).await;
    }

    // every iteration returns once retries are used up
    Err(Error::MaxRetriesExceeded)
}

/// Execute a request that must not be repeated. Server errors come back as
/// [`Error::ApiError`] and request failures as [`Error::Http`], both transport errors, so the
/// caller decides whether the request may have been applied.
pub async fn execute_once<Fut>(request: Fut) -> Result<Response>
where
    Fut: Future<Output = std::result::Result<Response, reqwest::Error>>,
{
    let response = request.await?;
    if response.status().is_server_error() {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Server error".to_string());
        return Err(Error::ApiError { status, message });
    }
    Ok(response)
}

/// Handle HTTP response and deserialize.
pub async fn handle_response<T>(response: Response) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();

    if status.is_success() {
        let body = response.bytes().await?;
        // an empty body reads as an empty object, so `()`-like responses still parse
        let body: &[u8] = if body.is_empty() { b"{}" } else { &body };
        serde_json::from_slice(body).map_err(Error::from)
    } else {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::AuthenticationFailed),
            StatusCode::CONFLICT => Err(Error::CommitConflict(error_body)),
            _ => Err(Error::ApiError {
                status: status.as_u16(),
                message: error_body,
            }),
        }
    }
}
