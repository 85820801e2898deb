use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Constituents error: {0}")]
    ConstituentsError(String),

    #[error("No price data for {0}")]
    NoData(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl MonitorError {
    /// Whether a failed provider call is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::NetworkError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().map_or(false, |s| s.is_server_error() || s.as_u16() == 429)
            }
            MonitorError::ApiError { status, .. } => *status == 429 || *status >= 500,
            MonitorError::RateLimited(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
