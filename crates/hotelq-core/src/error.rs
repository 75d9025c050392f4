use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown state field: {0}")]
    UnknownField(String),

    #[error("State field registered twice: {0}")]
    DuplicateField(String),

    #[error(
        "Field '{field}' is owned by {owners:?} but its reducer '{reducer}' is order-dependent"
    )]
    SharedFieldNotCommutative {
        field: String,
        reducer: &'static str,
        owners: Vec<String>,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an extractor. The engine substitutes the extractor's
/// default output and records the message as a diagnostic.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Failed(String),

    #[error("dependency unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by a search operation. Counted as an empty result.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid filters: {0}")]
    InvalidFilters(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding model error: {0}")]
    Model(String),

    #[error("embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
#[error("aggregation failed: {0}")]
pub struct AggregateError(pub String);
