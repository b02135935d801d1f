#[derive(Debug, thiserror::Error)]
pub enum RelqError {
    /// Rows or columns don't line up: mismatched column sets, duplicate or
    /// ambiguous names.
    #[error("shape: {0}")]
    Shape(String),

    #[error("missing column: {0}")]
    MissingColumn(String),

    /// The query or one of its consumers was used incorrectly.
    #[error("usage: {0}")]
    Usage(String),

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: String },

    #[error("integer overflow")]
    Overflow,

    /// An error raised by a caller-provided expression.
    #[error(transparent)]
    Expression(Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl RelqError {
    /// Wrap an arbitrary error raised inside an expression closure.
    pub fn expression<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        RelqError::Expression(err.into())
    }
}

pub type Result<T, E = RelqError> = std::result::Result<T, E>;

macro_rules! internal {
    ($($arg:tt)*) => {
        crate::errors::RelqError::Internal(std::format!($($arg)*))
    };
}
pub(crate) use internal;

macro_rules! shape {
    ($($arg:tt)*) => {
        crate::errors::RelqError::Shape(std::format!($($arg)*))
    };
}
pub(crate) use shape;

macro_rules! usage {
    ($($arg:tt)*) => {
        crate::errors::RelqError::Usage(std::format!($($arg)*))
    };
}
pub(crate) use usage;
