//! Bank adapter capability surface and registry.
//!
//! Every issuing bank exposes the same capability set; banks differ only in
//! endpoint paths and minor field-name/format quirks. New banks are registry
//! entries, not new orchestrator branches.

use crate::error::GatewayError;
use crate::operation::Operation;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Bank code of the R4 platform itself, used for operations that carry no
/// issuing-bank field.
pub const PLATFORM_BANK: &str = "r4";

/// Reply parsed out of a bank response body.
#[derive(Debug, Clone)]
pub struct BankReply {
    /// Verbatim wire response code, interbank or operation-status namespace.
    pub code: String,
    pub message: String,
    pub reference: Option<String>,
    /// Bank-specific extras surfaced untouched to the caller.
    pub fields: Value,
}

/// Per-bank request/response shaping.
pub trait BankAdapter: Send + Sync {
    /// Issuing-bank code this adapter serves, e.g. "0134".
    fn bank_code(&self) -> &str;

    /// Human-facing short name, e.g. "banesco".
    fn alias(&self) -> &str;

    /// Endpoint path for the operation on this bank's side of the platform.
    fn resolve_endpoint(&self, operation: &Operation) -> String;

    /// Wire payload for the operation, with this bank's field quirks applied.
    fn shape_request(&self, operation: &Operation) -> Result<Value, GatewayError>;

    /// Parse a raw reply body into the uniform `BankReply`.
    fn parse_response(&self, raw: &Value) -> Result<BankReply, GatewayError>;
}

/// Registry mapping bank codes and aliases to adapters.
///
/// Populated once at process start from the static bank table; resolution is
/// read-only afterwards.
#[derive(Default, Clone)]
pub struct BankAdapterRegistry {
    by_code: HashMap<String, Arc<dyn BankAdapter>>,
    alias_index: HashMap<String, String>,
}

impl BankAdapterRegistry {
    pub fn new() -> Self {
        Self {
            by_code: HashMap::new(),
            alias_index: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn BankAdapter>) {
        self.alias_index
            .insert(adapter.alias().to_lowercase(), adapter.bank_code().to_string());
        self.by_code.insert(adapter.bank_code().to_string(), adapter);
    }

    /// Resolve an adapter by bank code or alias.
    ///
    /// Numeric codes shorter than four digits are zero-padded, matching how
    /// the platform writes them ("134" resolves as "0134"). Unregistered
    /// codes fail; there is no fallback adapter.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn BankAdapter>, GatewayError> {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return Err(GatewayError::UnknownBank(key));
        }

        if let Some(code) = self.alias_index.get(&key) {
            if let Some(adapter) = self.by_code.get(code) {
                return Ok(adapter.clone());
            }
        }

        if let Some(adapter) = self.by_code.get(&key) {
            return Ok(adapter.clone());
        }

        if key.chars().all(|c| c.is_ascii_digit()) && key.len() < 4 {
            let padded = format!("{key:0>4}");
            if let Some(adapter) = self.by_code.get(&padded) {
                return Ok(adapter.clone());
            }
        }

        Err(GatewayError::UnknownBank(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.resolve(key).is_ok()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
