use thiserror::Error;

/// Unrecoverable engine faults. Everything recoverable ends up as a
/// diagnostic in the state instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema registration or validation failed, or a merge hit an
    /// unregistered field.
    #[error(transparent)]
    Schema(#[from] hotelq_core::Error),

    #[error("query text is empty")]
    EmptyQuery,

    #[error("component registered twice: {0}")]
    DuplicateComponent(String),

    #[error("operation '{operation}' references unregistered field '{field}'")]
    UnknownOperationField { operation: String, field: String },

    /// The router or the loop broke one of its own guarantees.
    #[error("engine invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
