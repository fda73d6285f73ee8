//! Failure classification shared across the toolchain
//!
//! Every fallible operation returns a [`TypedResult`], pairing a broad
//! [`SystemError`] class with the concrete cause. The class lets callers
//! branch without parsing message text; the cause keeps the whole context
//! chain for the log.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias carrying a classified failure
pub type TypedResult<T> = Result<T, TypedError>;

/// A failure class recognised somewhere in the toolchain
///
/// Programming errors (empty-pipe underflow, self-routed messages, register 7
/// as a load target) are deliberately *not* represented here; those panic.
#[derive(Error, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    #[error("unsupported construct during HDL lowering")]
    Lowering,
    #[error("signal graph failed a sanity check")]
    Sanity,
    #[error("partitioning could not satisfy the I/O budget")]
    Partition,
    #[error("malformed message frame")]
    Codec,
    #[error("protocol violation on a message pipe")]
    Protocol,
    #[error("design load file error")]
    DesignLoad,
    #[error("configuration error")]
    Config,
    #[error("I/O error")]
    Io,
}

/// A classified failure: one [`SystemError`] class plus its concrete cause
#[derive(Error, Debug)]
#[error("{kind}: {cause:#}")]
pub struct TypedError {
    kind: SystemError,
    cause: anyhow::Error,
}

impl TypedError {
    pub fn new(kind: SystemError, cause: anyhow::Error) -> Self {
        Self { kind, cause }
    }

    /// The broad class this failure was filed under
    pub fn kind(&self) -> SystemError {
        self.kind
    }
}

/// Attaches a failure class to an error on its way out of a fallible call
pub trait Classify<T> {
    fn classify(self, kind: SystemError) -> TypedResult<T>;
}

impl<T, E: Into<anyhow::Error>> Classify<T> for Result<T, E> {
    fn classify(self, kind: SystemError) -> TypedResult<T> {
        self.map_err(|cause| TypedError::new(kind, cause.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_keeps_kind_and_cause() {
        let failed: Result<(), std::num::ParseIntError> = "x".parse::<u32>().map(|_| ());
        let typed = failed.classify(SystemError::Config).unwrap_err();
        assert_eq!(typed.kind(), SystemError::Config);
        let text = format!("{typed}");
        assert!(text.starts_with("configuration error: "));
    }
}
