//! Canonical message construction.
//!
//! The canonical message is the exact byte string signed and verified for one
//! operation: the ordered field values concatenated with no separator and no
//! reformatting. "1000.00" stays "1000.00".

use crate::error::GatewayError;
use crate::operation::Operation;

/// Delimiter-free concatenation of an operation's canonical field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage(String);

impl CanonicalMessage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Build the canonical message for an operation.
///
/// Fails when a required field is absent or empty. Upstream schema validation
/// should have caught this already, but a truncated message must never be
/// signed, so the check is repeated here.
pub fn build(operation: &Operation) -> Result<CanonicalMessage, GatewayError> {
    let fields = operation
        .canonical_fields()
        .ok_or_else(|| GatewayError::MalformedOperation {
            operation: operation.name(),
            detail: "operation is token-authenticated and has no canonical message".to_string(),
        })?;

    let mut message = String::new();
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(GatewayError::missing_field(operation.name(), name));
        }
        message.push_str(value);
    }

    Ok(CanonicalMessage(message))
}
