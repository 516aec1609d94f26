//! Errors raised by pure domain code (keys, partitions, subsets).

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failure of a domain operation.
///
/// Storage and workspace failures are not domain errors; the crates that
/// own those concerns define their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed definition or input value.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid asset key: {0}")]
    InvalidAssetKey(String),

    /// The caller broke a precondition (e.g. asked for the full key universe
    /// of a partitioned asset without an evaluation time).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_asset_key(msg: impl Into<String>) -> Self {
        Self::InvalidAssetKey(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Whether the error signals a programming error rather than bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            DomainError::invalid_asset_key("empty path").to_string(),
            "invalid asset key: empty path"
        );
        assert!(DomainError::invariant("no time").is_invariant_violation());
        assert!(!DomainError::validation("dup").is_invariant_violation());
    }
}
