use thiserror::Error;

/// Errors produced by the core stores and the job manager.
///
/// Every failing operation leaves the store it was called on unchanged,
/// so callers may retry or report without any cleanup.
#[derive(Debug, Error)]
pub enum JushError {
    #[error("variable name must be non-empty")]
    EmptyVarName,

    #[error("variable '{0}' is not set")]
    UnsetVariable(String),

    #[error("value of '{0}' is not an integer")]
    NotAnInteger(String),

    #[error("statement has no usable line number")]
    BadLineNumber,

    #[error("invalid line range {0}..{1}")]
    BadRange(u32, u32),

    #[error("pipeline has no commands")]
    EmptyPipeline,

    #[error("argument contains an embedded NUL byte")]
    NulArgument,

    #[error("no job with id {0}")]
    UnknownJob(u32),

    #[error("job {0} has not terminated")]
    JobNotTerminated(u32),

    #[error("job {0} has already terminated")]
    JobTerminated(u32),

    #[error("job {0} has already been canceled")]
    AlreadyCanceled(u32),

    #[error("jobs module is not initialized")]
    NotInitialized,

    #[error("jobs module is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Sys(#[from] nix::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
