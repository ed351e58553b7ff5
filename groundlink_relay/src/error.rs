use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("http error: {0}")]
    Http(String),
    #[error("relay rejected request: {0}")]
    Rejected(String),
    #[error("malformed relay response: {0}")]
    Json(String),
    #[error("relay request timed out")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("mac decoder: {0}")]
    Decoder(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
