use thiserror::Error;

/// Top-level error type for post-aggregation.
/// Each variant is a distinct failure class: configuration problems surface
/// while a node is built, the rest while it runs or while its cache key is
/// encoded.
#[derive(Error, Debug)]
pub enum CambioError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("unknown currency '{0}'")]
    UnknownCurrency(String),

    #[error("cache key error: {0}")]
    CacheKey(String),

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl CambioError {
    /// Whether this error was raised while building a node rather than
    /// while evaluating one.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Json { .. })
    }
}

pub type CambioResult<T> = Result<T, CambioError>;
