//! OTP sequencing for immediate debit and point-of-sale charge flows.
//!
//! The OTP value itself is issued by the bank and delivered to the client out
//! of band; the core never generates one. What the core owns is sequencing:
//! an OTP must have been issued before it is consumed, an empty or stale OTP
//! is rejected before any signature work, and a flow completes only when the
//! adapter call comes back approved.

use crate::error::GatewayError;
use chrono::{DateTime, Duration, Utc};

/// Stages of one OTP-authorized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpStage {
    Requested,
    OtpIssued,
    OtpConsumed,
    Completed,
    OtpExpired,
    OtpMismatch,
    Failed,
}

impl OtpStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::OtpIssued => "otp_issued",
            Self::OtpConsumed => "otp_consumed",
            Self::Completed => "completed",
            Self::OtpExpired => "otp_expired",
            Self::OtpMismatch => "otp_mismatch",
            Self::Failed => "failed",
        }
    }

    /// `OtpExpired` and `OtpMismatch` are failure stages; nothing consumes a
    /// flow after them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::OtpExpired | Self::OtpMismatch | Self::Failed
        )
    }
}

/// State machine for one OTP-bearing operation.
///
/// The expiry window is bank-owned; the one enforced here is a defensive
/// bound, not the authoritative TTL.
#[derive(Debug, Clone)]
pub struct OtpFlow {
    operation: &'static str,
    stage: OtpStage,
    issued_at: Option<DateTime<Utc>>,
    max_delay: Duration,
}

impl OtpFlow {
    pub fn new(operation: &'static str, max_delay: Duration) -> Self {
        Self {
            operation,
            stage: OtpStage::Requested,
            issued_at: None,
            max_delay,
        }
    }

    pub fn stage(&self) -> OtpStage {
        self.stage
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// The bank confirmed it sent the OTP to the client.
    pub fn mark_issued(&mut self, at: DateTime<Utc>) -> Result<(), GatewayError> {
        self.advance(OtpStage::Requested, OtpStage::OtpIssued)?;
        self.issued_at = Some(at);
        Ok(())
    }

    /// The client presented an OTP value for consumption.
    ///
    /// Rejects empty values and values presented after the defensive delay
    /// bound, both without any signature work on the caller's side.
    pub fn present(&mut self, otp: &str, at: DateTime<Utc>) -> Result<(), GatewayError> {
        if otp.trim().is_empty() {
            self.stage = OtpStage::Failed;
            return Err(GatewayError::missing_field(self.operation, "OTP"));
        }

        self.advance(OtpStage::OtpIssued, OtpStage::OtpConsumed)?;

        if let Some(issued_at) = self.issued_at {
            if at - issued_at > self.max_delay {
                self.stage = OtpStage::OtpExpired;
                return Err(GatewayError::MalformedOperation {
                    operation: self.operation,
                    detail: "OTP presented after the acceptable delay".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The adapter call returned approved; the flow is done.
    pub fn complete(&mut self) -> Result<(), GatewayError> {
        self.advance(OtpStage::OtpConsumed, OtpStage::Completed)
    }

    /// The bank rejected the OTP value.
    pub fn mark_mismatch(&mut self) {
        self.stage = OtpStage::OtpMismatch;
    }

    /// Any other terminal failure (bank unavailable, rejection).
    pub fn fail(&mut self) {
        self.stage = OtpStage::Failed;
    }

    fn advance(&mut self, expected: OtpStage, next: OtpStage) -> Result<(), GatewayError> {
        if self.stage != expected {
            return Err(GatewayError::MalformedOperation {
                operation: self.operation,
                detail: format!(
                    "otp stage violation: expected '{}', got '{}'",
                    expected.name(),
                    self.stage.name()
                ),
            });
        }
        self.stage = next;
        Ok(())
    }
}
