//! Error types for ontoset kernel operations.
//!
//! Vetoed mutations are not errors: they come back as a [`crate::Event`]
//! whose `success()` is false. Everything here aborts the current call.

use crate::set::SetId;

/// Errors arising from invalid use of the classification runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// An argument is not acceptable for the requested operation
    /// (a non-set mutation target, a reserved member name, a missing
    /// configuration member such as `phaseGroupId`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A structural contract was not met (relator role slots).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The id does not name any set in this runtime.
    #[error("unknown set: {0}")]
    UnknownSet(SetId),

    /// The set was self-destructed and can no longer be used.
    #[error("set {0} is destroyed")]
    Destroyed(SetId),
}

impl KernelError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::ConstraintViolation(message.into())
    }
}

/// Which family an error belongs to, for reports that group failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    InvalidArgument,
    ConstraintViolation,
    LookupFailure,
}

impl KernelError {
    pub fn class(&self) -> ErrorClass {
        match self {
            KernelError::InvalidArgument(_) => ErrorClass::InvalidArgument,
            KernelError::ConstraintViolation(_) => ErrorClass::ConstraintViolation,
            KernelError::UnknownSet(_) | KernelError::Destroyed(_) => ErrorClass::LookupFailure,
        }
    }
}
