use thiserror::Error;

/// Failure of a single page fetch.
///
/// Every variant is terminal for the (source, category) pair in the current
/// cycle. [`FetchError::is_transient`] tells the retry layer which ones are
/// worth another attempt.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("could not build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Status codes that are retried before giving up on a page.
    pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => Self::RETRYABLE_STATUSES.contains(status),
            FetchError::Timeout { .. } | FetchError::Connect { .. } => true,
            FetchError::Request { .. } | FetchError::Client(_) => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        let url = url.to_string();
        if e.is_timeout() {
            FetchError::Timeout { url }
        } else if e.is_connect() {
            FetchError::Connect {
                url,
                message: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            FetchError::Request {
                url,
                message: e.to_string(),
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Problems found while loading a source registry. Fatal at startup.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("duplicate source name `{0}`")]
    DuplicateSource(String),

    #[error("source `{source_name}`: URL template `{template}` {reason}")]
    BadTemplate {
        source_name: String,
        template: String,
        reason: String,
    },

    #[error("source `{source_name}`: invalid selector `{selector}`")]
    BadSelector {
        source_name: String,
        selector: String,
    },

    #[error("registry contains no sources")]
    Empty,
}

#[derive(Error, Debug)]
#[error("sentiment scoring failed: {0}")]
pub struct ScoreError(pub String);
