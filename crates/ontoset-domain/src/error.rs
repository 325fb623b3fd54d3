//! Errors of domain assembly and world operations.

use ontoset_kernel::{ErrorClass, KernelError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// A referenced type or instance id does not exist.
    #[error("lookup failure: {0}")]
    LookupFailure(String),

    #[error("duplicate type id `{0}`")]
    DuplicateId(String),

    #[error("invalid type id `{0}`")]
    InvalidId(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A scenario step failed.
    #[error("step {index} ({op}): {source}")]
    Step {
        index: usize,
        op: String,
        #[source]
        source: Box<DomainError>,
    },
}

impl DomainError {
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::LookupFailure(message.into())
    }

    /// The error family, for reports that group failures.
    pub fn class(&self) -> ErrorClass {
        match self {
            DomainError::Kernel(err) => err.class(),
            DomainError::Step { source, .. } => source.class(),
            DomainError::LookupFailure(_) => ErrorClass::LookupFailure,
            DomainError::DuplicateId(_)
            | DomainError::InvalidId(_)
            | DomainError::Io { .. }
            | DomainError::Json { .. } => ErrorClass::InvalidArgument,
        }
    }
}
