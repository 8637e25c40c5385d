//! Error types for the extraction pipeline.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Result type used throughout the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the pipeline can report. None of them are recovered locally.
#[derive(Error, Debug)]
pub enum Error {
    /// Region polygon is degenerate, self-intersecting or out of range
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid date range: start year {start} must be before end year {end}")]
    InvalidDateRange { start: i32, end: i32 },

    /// Any other malformed request parameter (CRS, scale)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Unknown dataset or band, or a filter the service rejected
    #[error("Remote query failed: {0}")]
    RemoteQuery(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Could not create directory `{}`: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}
