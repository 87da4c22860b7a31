//! Error types for the CDI engine.

use std::ops::Range;
use std::path::PathBuf;

/// Error type for every fallible operation in the crate.
///
/// `ShapeMismatch`, `MissingVariable` and `Configuration` are raised while a
/// run is being validated, before any parallel work starts. `WorkerFailure`
/// is raised by the executor when a partition cannot be computed. Missing
/// cell values are never errors.
#[derive(Debug, thiserror::Error)]
pub enum CdiError {
    /// Two grids that must be co-registered have different axes.
    #[error("shape mismatch on {axis} axis: {detail}")]
    ShapeMismatch {
        /// Axis name (`lat`, `lon`, `time` or `values`).
        axis: &'static str,
        /// Human-readable description of the difference.
        detail: String,
    },

    /// A requested variable is not present in a grid file.
    #[error("variable '{name}' not found in {}", path.display())]
    MissingVariable {
        /// Name of the missing variable.
        name: String,
        /// File that was inspected.
        path: PathBuf,
    },

    /// Invalid weights, worker counts or pipeline settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A parallel unit of work failed; the whole run is aborted.
    #[error("worker failure in partition {partition} (cells {}..{}): {cause}", cells.start, cells.end)]
    WorkerFailure {
        /// Index of the failing partition.
        partition: usize,
        /// Flattened cell range owned by the partition.
        cells: Range<usize>,
        /// Underlying cause.
        cause: String,
    },

    /// The time axis is not strictly increasing or could not be decoded.
    #[error("invalid time axis: {0}")]
    InvalidTimeAxis(String),

    /// A grid was constructed from inconsistent parts.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// A required file does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path that could not be found.
        path: PathBuf,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl CdiError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CdiError::Configuration(msg.into())
    }
}
