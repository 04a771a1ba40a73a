//! Error types for agenda-core operations.
//!
//! Only failures that make a whole feed or refresh unusable are errors. Problems
//! scoped to one event are recorded as [`Warning`](crate::diagnostics::Warning)s
//! and recovered from locally.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The document is not an iCalendar object at all.
    #[error("Format error: {0}")]
    Format(String),

    /// The document exceeds the configured size ceiling and was not parsed.
    #[error("Feed too large: {size} bytes exceeds the {limit} byte limit")]
    FeedTooLarge { size: usize, limit: usize },

    /// The feed fetcher could not retrieve the document.
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
