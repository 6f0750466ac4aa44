//! Error types for facility fetches and aggregation cycles.

use thiserror::Error;

/// A single backend request failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("HTTP error {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Source refused the request (injected faults, closed sources)
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// An aggregation cycle produced no output.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// The facility list could not be fetched; nothing is emitted for the cycle.
    #[error("Facility list fetch failed: {0}")]
    PrimaryFetch(#[source] FetchError),
}

impl AggregationError {
    /// Every aggregation failure can be retried by starting a new cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            AggregationError::PrimaryFetch(_) => true,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AggregationError::PrimaryFetch(_) => "primary_fetch_failed",
        }
    }
}

/// A client message could not be turned into a session command.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    #[error("Invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("Invalid surface size: {width_px}x{height_px}")]
    InvalidSurface { width_px: f32, height_px: f32 },
}
