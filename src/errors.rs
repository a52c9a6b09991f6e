//! Errors
//!
//! Custom error types used throughout the `turbine_knn` crate.
use thiserror::Error;

/// Errors that can occur while preparing data, fitting, or evaluating a model.
#[derive(Debug, Error)]
pub enum KnnError {
    /// A required column is absent, has the wrong type, or the shapes of the inputs disagree.
    #[error("Schema error: {0}")]
    Schema(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// The data cannot support the requested evaluation, such as fewer rows than folds.
    #[error("Degenerate data: {0}")]
    DegenerateData(String),
    /// Unable to read a table or configuration.
    #[error("Unable to read from {0}")]
    UnableToRead(String),
    /// Unable to write a configuration.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
}
