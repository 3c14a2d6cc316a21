//! Error types for sheetproxy

use thiserror::Error;

/// Result type alias for sheetproxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Upstream (Google Sheets API) errors.
///
/// Clone is required so the request coalescer can deliver one producer's
/// failure to every waiter that joined the in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SheetsError {
    #[error("Spreadsheet not found: {spreadsheet_id}")]
    NotFound { spreadsheet_id: String },

    #[error("Spreadsheet is not public: {spreadsheet_id}")]
    NotPublic { spreadsheet_id: String },

    #[error("Google API rate limit exceeded for {spreadsheet_id}")]
    RateLimited { spreadsheet_id: String },

    #[error("Network error for {spreadsheet_id}: {message}")]
    Network {
        spreadsheet_id: String,
        message: String,
    },

    #[error("Google API key not configured")]
    Config,

    #[error("Google API error for {spreadsheet_id}: {message}")]
    Api {
        spreadsheet_id: String,
        message: String,
    },
}

impl SheetsError {
    /// Classify a transport-level reqwest failure.
    pub fn network(spreadsheet_id: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "failed to connect to the Sheets API".to_string()
        } else {
            err.to_string()
        };
        SheetsError::Network {
            spreadsheet_id: spreadsheet_id.to_string(),
            message,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Google API key not configured. Set GOOGLE_API_KEY or pass --api-key.")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
