//! Error types for the table-to-container conversion library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a table or building a container.
#[derive(Debug, Error)]
pub enum Error {
    /// Source file missing or unreadable, or a variable that was never declared
    #[error("Not found: {0}")]
    NotFound(String),

    /// The source is not a valid dBASE table
    #[error("Malformed source: {0}")]
    MalformedSource(String),

    /// The source produced zero records
    #[error("Source contains no records")]
    EmptySource,

    /// The output path exists and overwriting was disabled
    #[error("Output already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The output path could not be created or truncated
    #[error("Cannot write output {}: {source}", .path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value cannot be stored in the element type fixed for its field
    #[error("Type mismatch for field '{field}' at record {record}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        record: usize,
        expected: String,
        found: String,
    },

    /// An array's length disagrees with its declared dimensions
    #[error("Shape mismatch for variable '{variable}': expected {expected} values, got {actual}")]
    ShapeMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },

    /// Invalid container definition or unreadable container file
    #[error("Container error: {0}")]
    Container(String),

    /// I/O error occurred while reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn not_found_path(path: &std::path::Path, err: std::io::Error) -> Self {
        Error::NotFound(format!("{}: {}", path.display(), err))
    }
}
