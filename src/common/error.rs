//! Common Error Types for the Shielding Portal
//!
//! Every module has its own error enum; `ShieldError` is the root the service
//! and the HTTP layer work with.

use thiserror::Error;

use crate::address::DeriveError;
use crate::btc_node::NodeError;
use crate::fee::FeeError;
use crate::storage::StorageError;
use crate::validation::RejectReason;

/// Root error type for the shielding portal
#[derive(Debug, Error)]
pub enum ShieldError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    /// Registration request failed validation
    #[error("{0}")]
    Rejected(#[from] RejectReason),

    /// No registration exists for the chain code
    #[error("no shielding address registered for {0}")]
    NoSuchDeposit(String),

    /// Malformed caller input outside of registration validation
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Store errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Bitcoin node errors
    #[error("bitcoin node error: {0}")]
    Node(#[from] NodeError),

    /// Fee endpoint errors
    #[error("fee estimate error: {0}")]
    Fee(#[from] FeeError),

    /// Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DeriveError> for ShieldError {
    fn from(err: DeriveError) -> Self {
        ShieldError::Rejected(RejectReason::from(err))
    }
}

impl ShieldError {
    /// Create an invalid params error
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Caller-side errors are answered with 4xx, everything else with 5xx
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ShieldError::Rejected(_) | ShieldError::NoSuchDeposit(_) | ShieldError::InvalidParams(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            ShieldError::Config(_) => "CONFIG_ERROR",
            ShieldError::Logging(_) => "LOGGING_ERROR",
            ShieldError::Rejected(reason) => reason.code(),
            ShieldError::NoSuchDeposit(_) => "NO_SUCH_DEPOSIT",
            ShieldError::InvalidParams(_) => "INVALID_PARAMS",
            ShieldError::Storage(_) => "STORAGE_ERROR",
            ShieldError::Node(_) => "BITCOIN_NODE_ERROR",
            ShieldError::Fee(_) => "FEE_ERROR",
            ShieldError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias using ShieldError
pub type Result<T> = std::result::Result<T, ShieldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ShieldError::NoSuchDeposit("acct".to_string());
        assert!(err.to_string().contains("acct"));
        assert_eq!(err.error_code(), "NO_SUCH_DEPOSIT");

        let err: ShieldError = RejectReason::AddressMismatch.into();
        assert_eq!(err.error_code(), "ADDRESS_MISMATCH");
    }

    #[test]
    fn test_client_errors() {
        assert!(ShieldError::from(RejectReason::InvalidSignature).is_client_error());
        assert!(ShieldError::invalid_params("to == 0").is_client_error());
        assert!(!ShieldError::internal("boom").is_client_error());
        assert!(!ShieldError::from(NodeError::Rpc("down".to_string())).is_client_error());
    }

    #[test]
    fn test_derive_error_becomes_rejection() {
        let err: ShieldError = DeriveError::InvalidThreshold {
            threshold: 4,
            keys: 3,
        }
        .into();
        assert!(matches!(
            err,
            ShieldError::Rejected(RejectReason::InvalidThreshold(_))
        ));
    }
}
