//! Error types for docweave.

use thiserror::Error;

/// Common error type for docweave.
#[derive(Error, Debug)]
pub enum DocweaveError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background build task could not complete.
    #[error("task error: {0}")]
    Task(String),

    /// Interpreter-level failure (sandbox setup, parse, top-level runtime).
    #[error("script error: {0}")]
    Script(String),

    /// A `require` path that cannot be resolved.
    #[error("module resolution error: {0}")]
    Resolution(String),

    /// The script could not be turned into a preprocessor.
    #[error("\"{path}\" is not a valid template preprocessor: {message}")]
    InvalidPreprocessor {
        /// Logical path of the offending script.
        path: String,
        /// Parse, compile or export-shape message.
        message: String,
    },

    /// Running `getOptions` or `transform` for a document failed.
    #[error("error in template preprocessor '{name}': {message}")]
    PreprocessorExecution {
        /// Display name of the preprocessor.
        name: String,
        /// Underlying failure message.
        message: String,
    },
}

impl DocweaveError {
    /// Wrap this error as a preprocessor execution error for `name`.
    ///
    /// Errors that already are execution errors pass through unchanged.
    pub fn into_execution(self, name: &str, function: &str) -> Self {
        match self {
            err @ DocweaveError::PreprocessorExecution { .. } => err,
            other => DocweaveError::PreprocessorExecution {
                name: name.to_string(),
                message: format!(
                    "Error running {function} function inside template preprocessor: {other}"
                ),
            },
        }
    }
}

impl From<mlua::Error> for DocweaveError {
    fn from(e: mlua::Error) -> Self {
        DocweaveError::Script(e.to_string())
    }
}

/// Result type alias for docweave operations.
pub type Result<T> = std::result::Result<T, DocweaveError>;
