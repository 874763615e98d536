//! Error taxonomy for hookgate library operations.

/// hookgate library errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(String),

    /// Hook arguments or stdin git handed us could not be read.
    #[error("hook input error: {0}")]
    Input(String),

    #[error("context document error: {0}")]
    Context(String),

    #[error("audit ledger error: {0}")]
    Ledger(String),

    #[error("invalid step identifier: {0}")]
    InvalidStep(String),

    #[error("unknown persona: {0}")]
    UnknownPersona(String),

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hookgate library operations.
pub type Result<T> = std::result::Result<T, GateError>;
