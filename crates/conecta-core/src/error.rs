use thiserror::Error;

/// Gateway errors.
///
/// Validation and authentication variants are resolved locally and never
/// trigger an outbound call. `BankUnavailable` is the only variant the caller
/// may retry; the core itself performs no retries.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing header, unknown commerce, or signature mismatch. One opaque
    /// message for all three so callers cannot distinguish which part failed.
    #[error("authentication failed")]
    Authentication,

    #[error("malformed {operation} operation: {detail}")]
    MalformedOperation {
        operation: &'static str,
        detail: String,
    },

    #[error("dispersion total mismatch: declared {declared}, parts sum to {parts}")]
    AmountMismatch { declared: String, parts: String },

    #[error("unknown bank code '{0}'")]
    UnknownBank(String),

    #[error("bank unavailable during {operation}: {reason}")]
    BankUnavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GatewayError {
    pub fn missing_field(operation: &'static str, field: &'static str) -> Self {
        Self::MalformedOperation {
            operation,
            detail: format!("missing or empty field '{}'", field),
        }
    }

    pub fn bank_unavailable(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::BankUnavailable {
            operation,
            reason: reason.into(),
        }
    }
}
