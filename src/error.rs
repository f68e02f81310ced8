use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatrixError>;

/// Every way a matrix expansion can fail. All of them abort the whole call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    // ─────────────────────────────────────────────
    // Structural
    // ─────────────────────────────────────────────
    #[error("matrix input must be an object or array, got {found}")]
    InvalidRoot { found: &'static str },

    #[error("expected object or array at {at}, got {found}")]
    ExpectedDocument { at: String, found: &'static str },

    #[error("`$multiply` must be an array of documents, got {found}")]
    MultiplyNotArray { found: &'static str },

    #[error("field `{field}` has an empty object, expected at least one key")]
    EmptyVariants { field: String },

    #[error("field `{field}`: unexpected {found} value")]
    UnexpectedValue { field: String, found: &'static str },

    #[error("`$dynamic` on field `{field}` must be a string expression, got {found}")]
    DynamicNotString { field: String, found: &'static str },

    #[error("`$if` must be a string or an array of strings, got {found}")]
    InvalidCondition { found: &'static str },

    // ─────────────────────────────────────────────
    // Expression
    // ─────────────────────────────────────────────
    #[error("empty predicate")]
    EmptyExpression,

    #[error("invalid predicate `{source_text}`: {message}")]
    InvalidExpression {
        source_text: String,
        message: String,
    },

    #[error("failed to evaluate `{source_text}`: {message}")]
    Evaluation {
        source_text: String,
        message: String,
    },

    #[error("circular dependency while resolving field `{field}` (expression `{expression}`)")]
    CircularDependency { field: String, expression: String },

    // ─────────────────────────────────────────────
    // Settings / runtime
    // ─────────────────────────────────────────────
    #[error("failed to load settings: {0}")]
    Settings(String),

    #[error("failed to build evaluation thread pool: {0}")]
    ThreadPool(String),
}

impl From<config::ConfigError> for MatrixError {
    fn from(err: config::ConfigError) -> Self {
        MatrixError::Settings(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for MatrixError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        MatrixError::ThreadPool(err.to_string())
    }
}
