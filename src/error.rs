use thiserror::Error;

use crate::source::Role;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("{role} source missing: {fields} must be specified")]
    MissingInput { role: Role, fields: String },

    #[error("{role} source conflict: {fields} are mutually exclusive")]
    ConflictingInput { role: Role, fields: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Eval(String),

    #[error("{0}")]
    Diagnostics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("Unsupported URL scheme: {url}")]
    UnsupportedScheme { url: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

impl WorkerError {
    /// Coarse failure category, used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            WorkerError::MissingInput { .. }
            | WorkerError::ConflictingInput { .. }
            | WorkerError::InvalidRequest(_) => "input",
            WorkerError::Compile(_) => "compile",
            WorkerError::Eval(_) => "eval",
            WorkerError::Diagnostics(_) => "diagnostics",
            WorkerError::Io(_)
            | WorkerError::Http(_)
            | WorkerError::HttpStatus { .. }
            | WorkerError::Timeout { .. }
            | WorkerError::UnsupportedScheme { .. } => "io",
            WorkerError::Concurrency { .. } => "concurrency",
        }
    }

    /// True for failures caused by the request itself rather than by the engine or I/O.
    pub fn is_input_error(&self) -> bool {
        self.category() == "input"
    }
}

/// Errors reported by an [`XmlEngine`](crate::engine::XmlEngine).
///
/// Cloneable so that a single failed build can be handed to every caller that
/// was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Eval(String),

    #[error("{0}")]
    FatalParse(String),
}

impl From<EngineError> for WorkerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Compile(message) => WorkerError::Compile(message),
            EngineError::Eval(message) => WorkerError::Eval(message),
            EngineError::FatalParse(message) => WorkerError::Diagnostics(message),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Engine result type alias
pub type EngineResult<T> = std::result::Result<T, EngineError>;
