//! Message authentication.
//!
//! Outbound requests are signed and inbound requests verified with
//! HMAC-SHA256 over the operation's canonical message, keyed by the
//! commerce's shared secret and hex-encoded. Verification is constant-time.
//! Every failure path collapses into the same opaque `Authentication` error
//! so a caller cannot learn whether the commerce id, the header, or the
//! signature was wrong.

use crate::canonical::CanonicalMessage;
use crate::error::GatewayError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Integrating merchant identity. Immutable per deployment.
#[derive(Clone)]
pub struct Commerce {
    id: String,
    secret: String,
    notification_token: String,
}

impl Commerce {
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        notification_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            notification_token: notification_token.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

// Secrets stay out of Debug output and error payloads.
impl fmt::Debug for Commerce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commerce").field("id", &self.id).finish()
    }
}

/// Signs and verifies canonical messages for registered commerces.
///
/// Commerce lookup happens per call; there is no process-wide secret.
#[derive(Debug, Clone, Default)]
pub struct AuthSigner {
    commerces: HashMap<String, Commerce>,
}

impl AuthSigner {
    pub fn new() -> Self {
        Self {
            commerces: HashMap::new(),
        }
    }

    pub fn register_commerce(&mut self, commerce: Commerce) {
        self.commerces.insert(commerce.id.clone(), commerce);
    }

    pub fn has_commerce(&self, commerce_id: &str) -> bool {
        self.commerces.contains_key(commerce_id)
    }

    /// Sign a canonical message with the commerce's shared secret.
    pub fn sign(
        &self,
        commerce_id: &str,
        message: &CanonicalMessage,
    ) -> Result<Signature, GatewayError> {
        let commerce = self.resolve(commerce_id)?;
        Ok(Signature(hmac_hex(&commerce.secret, message.as_bytes())?))
    }

    /// Verify a presented hex signature against the canonical message.
    pub fn verify(
        &self,
        commerce_id: &str,
        message: &CanonicalMessage,
        presented: &str,
    ) -> Result<(), GatewayError> {
        let commerce = self.resolve(commerce_id)?;
        let expected = hmac_hex(&commerce.secret, message.as_bytes())?;
        if constant_time_str_eq(presented, &expected) {
            Ok(())
        } else {
            Err(GatewayError::Authentication)
        }
    }

    /// Verify the static token presented on token-authenticated lookups.
    pub fn verify_token(&self, commerce_id: &str, presented: &str) -> Result<(), GatewayError> {
        let commerce = self.resolve(commerce_id)?;
        if constant_time_str_eq(presented, &commerce.notification_token) {
            Ok(())
        } else {
            Err(GatewayError::Authentication)
        }
    }

    fn resolve(&self, commerce_id: &str) -> Result<&Commerce, GatewayError> {
        self.commerces
            .get(commerce_id)
            .ok_or(GatewayError::Authentication)
    }
}

fn hmac_hex(secret: &str, message: &[u8]) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::Authentication)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison.
///
/// When lengths differ, performs a dummy comparison so timing does not leak
/// length information.
fn constant_time_str_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}
