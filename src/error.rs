//! Error types.
//!
//! Library operations return small typed errors so callers (and tests) can
//! match on the failure kind. The binary folds them into [`AppError`], which
//! only carries a message and a process exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while locating or reading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file could not be opened or read.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file was readable but holds no dataset with this name.
    #[error("dataset '{name}' not found in '{path}'")]
    NotFound { name: String, path: PathBuf },
    /// The file (or the requested dataset) is malformed.
    #[error("invalid dataset file '{path}': {message}")]
    Format { path: PathBuf, message: String },
}

/// Failure while parsing or binding a model expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid expression: {message}")]
pub struct ExpressionError {
    pub message: String,
    /// Byte offset into the expression, when the failure has a location.
    pub position: Option<usize>,
}

impl ExpressionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(position: usize, message: impl Into<String>) -> Self {
        Self {
            message: format!("{} (at offset {position})", message.into()),
            position: Some(position),
        }
    }
}

/// Failure of the fit routine. The model is left untouched when returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("fit range [{x_min}, {x_max}] contains no usable bins")]
    EmptyRange { x_min: f64, x_max: f64 },
    #[error("only {bins} usable bins for {params} free parameters")]
    TooFewBins { bins: usize, params: usize },
    #[error("model is not finite at the starting parameters (bin center x={x})")]
    NonFinite { x: f64 },
    #[error("model prediction <= 0 at the starting parameters (bin center x={x}); a likelihood fit needs a positive expectation")]
    NonPositive { x: f64 },
    #[error("fit did not converge after {evaluations} evaluations ({reason})")]
    NotConverged { evaluations: usize, reason: String },
    #[error("fit ended where '{first}' and '{second}' are not separately determined (correlation {correlation:.7})")]
    Degenerate { first: String, second: String, correlation: f64 },
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<DatasetError> for AppError {
    fn from(err: DatasetError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<ExpressionError> for AppError {
    fn from(err: ExpressionError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(3, err.to_string())
    }
}
