use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The service already ratified a commit at the requested version.
    #[error("Commit conflict: {0}")]
    CommitConflict(String),

    #[error("Table not registered with the commit coordinator: {0}")]
    TableNotRegistered(String),

    #[error("Max retries exceeded")]
    MaxRetriesExceeded,

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the service could not be reached or failed on its side, as opposed to rejecting
    /// the request.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Http(_) | Error::MaxRetriesExceeded => true,
            Error::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
