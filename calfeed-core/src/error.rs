//! Error types for calendar feed synthesis.

use thiserror::Error;

/// Errors that can occur while synthesizing a calendar feed.
///
/// Most failures inside the pipeline degrade to partial results and are
/// reported as diagnostics instead. The variants here are the ones that cross
/// a component boundary.
#[derive(Error, Debug)]
pub enum CalFeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No preferences found for token '{0}'")]
    PreferencesNotFound(String),

    #[error("Invalid preference token")]
    InvalidToken,

    #[error("Failed to fetch source '{source_name}': {message}")]
    Fetch {
        source_name: String,
        message: String,
    },

    #[error("Source '{source_name}' responded with HTTP {status}")]
    HttpStatus { source_name: String, status: u16 },

    #[error("Source '{0}' returned an empty document")]
    EmptyFeed(String),

    #[error("Fetching source '{source_name}' timed out after {secs}s")]
    FetchTimeout { source_name: String, secs: u64 },

    #[error("Event store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CalFeedError {
    /// True for the "we don't know this user" family of errors, which callers
    /// surface differently from a merely empty calendar.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CalFeedError::PreferencesNotFound(_) | CalFeedError::InvalidToken
        )
    }
}

/// Result type alias for calendar feed operations.
pub type CalFeedResult<T> = Result<T, CalFeedError>;
