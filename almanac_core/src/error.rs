//! Error types for the almanac_core library.

use crate::Series;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for almanac_core operations
///
/// The recurrence engine itself never produces one of these; they come from
/// storage, configuration and the editing workflows layered on top of it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No record with the given id exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// An identical series (name, start date and times) already exists
    #[error("Duplicate series: identical to existing series {}", .0.id)]
    Duplicate(Box<Series>),

    /// Caller supplied data that cannot be stored
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
