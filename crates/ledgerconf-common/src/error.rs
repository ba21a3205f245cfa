//! Error types and error codes for ledgerconf
//!
//! This module defines:
//! - `ConfigTxError`: every way a configuration transaction can be refused
//! - `ErrorCode`: structured error codes for callers that report outcomes

use serde::{Deserialize, Serialize};

use crate::path::GroupPath;

/// Errors surfaced by the configuration transaction protocol.
///
/// Every variant aborts the whole attempt; the committed tree and sequence
/// are never modified when one of these is returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigTxError {
    #[error("stale sequence: envelope is based on sequence {actual}, current sequence is {expected}")]
    StaleSequence { expected: u64, actual: u64 },

    #[error("unknown config key '{key}' at {path}")]
    UnknownKey { path: GroupPath, key: String },

    #[error("value '{key}' at {path} rejected: {reason}")]
    ValidationRejected {
        path: GroupPath,
        key: String,
        reason: String,
    },

    #[error("policy '{key}' at {path} is malformed: {reason}")]
    PolicyMalformed {
        path: GroupPath,
        key: String,
        reason: String,
    },

    #[error("authorization denied for {path} by mod policy '{policy}': {reason}")]
    AuthorizationDenied {
        path: GroupPath,
        policy: String,
        reason: String,
    },

    #[error("cannot initialize handlers for {path}: {reason}")]
    HandlerInitFailure { path: GroupPath, reason: String },

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("handler registry error: {0}")]
    Registry(String),
}

pub type Result<T> = std::result::Result<T, ConfigTxError>;

impl ConfigTxError {
    pub fn rejected(path: &GroupPath, key: &str, reason: impl Into<String>) -> Self {
        ConfigTxError::ValidationRejected {
            path: path.clone(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed_policy(path: &GroupPath, key: &str, reason: impl Into<String>) -> Self {
        ConfigTxError::PolicyMalformed {
            path: path.clone(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unknown_key(path: &GroupPath, key: &str) -> Self {
        ConfigTxError::UnknownKey {
            path: path.clone(),
            key: key.to_string(),
        }
    }

    /// Whether the caller may succeed by refreshing its view and resubmitting
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConfigTxError::StaleSequence { .. })
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            ConfigTxError::StaleSequence { .. } => STALE_SEQUENCE,
            ConfigTxError::UnknownKey { .. } => UNKNOWN_KEY,
            ConfigTxError::ValidationRejected { .. } => VALIDATION_REJECTED,
            ConfigTxError::PolicyMalformed { .. } => POLICY_MALFORMED,
            ConfigTxError::AuthorizationDenied { .. } => AUTHORIZATION_DENIED,
            ConfigTxError::HandlerInitFailure { .. } => HANDLER_INIT_FAILURE,
            ConfigTxError::InvalidEnvelope(_) => INVALID_ENVELOPE,
            ConfigTxError::Registry(_) => REGISTRY_CONFLICT,
        }
    }
}

/// Error code structure for reporting
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

// Transaction protocol errors

pub const STALE_SEQUENCE: ErrorCode<'static> = ErrorCode {
    code: 40001,
    message: "stale sequence",
};

pub const UNKNOWN_KEY: ErrorCode<'static> = ErrorCode {
    code: 40002,
    message: "unknown config key",
};

pub const VALIDATION_REJECTED: ErrorCode<'static> = ErrorCode {
    code: 40003,
    message: "config value rejected",
};

pub const POLICY_MALFORMED: ErrorCode<'static> = ErrorCode {
    code: 40004,
    message: "policy malformed",
};

pub const AUTHORIZATION_DENIED: ErrorCode<'static> = ErrorCode {
    code: 40005,
    message: "authorization denied",
};

pub const HANDLER_INIT_FAILURE: ErrorCode<'static> = ErrorCode {
    code: 40006,
    message: "handler initialization failure",
};

pub const INVALID_ENVELOPE: ErrorCode<'static> = ErrorCode {
    code: 40007,
    message: "invalid envelope",
};

// Construction-time errors

pub const REGISTRY_CONFLICT: ErrorCode<'static> = ErrorCode {
    code: 50001,
    message: "handler registry conflict",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigTxError::StaleSequence {
            expected: 5,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "stale sequence: envelope is based on sequence 4, current sequence is 5"
        );

        let path: GroupPath = "Application/Org1".parse().unwrap();
        let err = ConfigTxError::unknown_key(&path, "Foo");
        assert_eq!(err.to_string(), "unknown config key 'Foo' at /Application/Org1");

        let err = ConfigTxError::rejected(&GroupPath::root(), "BatchSize", "zero");
        assert_eq!(err.to_string(), "value 'BatchSize' at / rejected: zero");
    }

    #[test]
    fn test_error_codes() {
        let err = ConfigTxError::InvalidEnvelope("empty".to_string());
        assert_eq!(err.error_code(), INVALID_ENVELOPE);
        assert_eq!(err.error_code().code, 40007);

        let err = ConfigTxError::Registry("dup".to_string());
        assert_eq!(err.error_code().code, 50001);
    }

    #[test]
    fn test_only_stale_sequence_is_retryable() {
        assert!(
            ConfigTxError::StaleSequence {
                expected: 1,
                actual: 0
            }
            .is_retryable()
        );
        assert!(!ConfigTxError::InvalidEnvelope("x".to_string()).is_retryable());
        assert!(
            !ConfigTxError::HandlerInitFailure {
                path: GroupPath::root(),
                reason: "x".to_string()
            }
            .is_retryable()
        );
    }
}
