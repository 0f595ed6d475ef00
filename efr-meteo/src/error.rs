/// Error types for the forecast API client
use thiserror::Error;

/// Main error type for forecast API operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeteoError {
    /// The request never produced an HTTP response
    #[error("HTTP request failed: {message}")]
    Transport { message: String, transient: bool },

    /// Non-success status without an API error payload
    #[error("Bad response status {status}: {body}")]
    Status { status: u16, body: String },

    /// The API rejected the request and said why
    #[error("Forecast API error ({status}): {reason}")]
    Api { status: u16, reason: String },

    /// Failed to parse the response body
    #[error("Failed to parse forecast response: {0}")]
    ResponseParse(String),

    /// A requested series is absent for one of the locations
    #[error("Response for location {location} has no {block} series {variable:?}")]
    MissingSeries {
        location: usize,
        block: &'static str,
        variable: String,
    },

    /// The response does not carry one entry per requested location
    #[error("Expected {expected} locations in response, found {found}")]
    LocationCount { expected: usize, found: usize },
}

impl MeteoError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, timeouts, rate limiting (429) and server errors
    /// (5xx) are transient; everything else is returned immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            MeteoError::Transport { transient, .. } => *transient,
            MeteoError::Status { status, .. } | MeteoError::Api { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for MeteoError {
    fn from(e: serde_json::Error) -> Self {
        MeteoError::ResponseParse(e.to_string())
    }
}

/// Type alias for Results using MeteoError
pub type Result<T> = std::result::Result<T, MeteoError>;
