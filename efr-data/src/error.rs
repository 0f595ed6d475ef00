/// Error types for feature assembly
use thiserror::Error;

/// Data-shape errors raised while building or reading a feature matrix.
#[derive(Error, Debug, PartialEq)]
pub enum DataError {
    /// The inner join of all sources left nothing to predict on
    #[error("Feature join produced no rows")]
    EmptyJoin,

    /// Two sources produced the same feature column
    #[error("Column {0:?} is produced by more than one source")]
    DuplicateColumn(String),

    /// A column requested by a classifier is absent from the matrix
    #[error("Feature matrix has no column {0:?}")]
    MissingColumn(String),

    /// Per-row outputs do not line up with the matrix rows
    #[error("Expected {expected} values, found {found}")]
    LengthMismatch { expected: usize, found: usize },
}

/// Type alias for Results using DataError
pub type Result<T> = std::result::Result<T, DataError>;
