/// Error types for loading and evaluating classifiers
use efr_data::DataError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// The model file could not be read
    #[error("Failed to read model {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model file is not valid JSON or misses required fields
    #[error("Failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),

    /// The model parsed but is internally inconsistent
    #[error("Invalid model: {0}")]
    Invalid(String),

    #[error("Unsupported objective {0:?}")]
    UnsupportedObjective(String),

    /// A flood probability needs a two-class model
    #[error("Expected a binary classifier, found {0} classes")]
    NotBinary(usize),

    /// Input rows do not match the model's feature contract
    #[error("Expected {expected} features per row, found {found}")]
    FeatureCount { expected: usize, found: usize },

    /// The feature matrix could not satisfy the feature contract
    #[error(transparent)]
    Data(#[from] DataError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
