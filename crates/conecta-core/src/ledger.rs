//! Idempotent notification ledger.
//!
//! Inbound payment notifications are persisted exactly once, keyed by their
//! globally unique Reference. A notification whose network code is not "00"
//! is never stored as a successful payment; it is classified and reported
//! back as a rejection with the original code.

use crate::error::GatewayError;
use crate::operation::PaymentNotice;
use crate::taxonomy::{self, OutcomeCategory, APPROVED_CODE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

/// Persisted inbound notification. Never mutated or deleted by the core;
/// retention is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub reference: String,
    pub commerce_id: String,
    pub commerce_phone: String,
    pub issuer_phone: String,
    pub concept: String,
    pub issuer_bank: String,
    /// Decimal string exactly as received; never parsed as float.
    pub amount: String,
    /// Bank-side timestamp, verbatim from the wire.
    pub occurred_at: String,
    pub response_code: String,
    pub received_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn from_notice(notice: &PaymentNotice, received_at: DateTime<Utc>) -> Self {
        Self {
            reference: notice.referencia.clone(),
            commerce_id: notice.id_comercio.clone(),
            commerce_phone: notice.telefono_comercio.clone(),
            issuer_phone: notice.telefono_emisor.clone(),
            concept: notice.concepto.clone(),
            issuer_bank: notice.banco_emisor.clone(),
            amount: notice.monto.clone(),
            occurred_at: notice.fecha_hora.clone(),
            response_code: notice.codigo_red.clone(),
            received_at,
        }
    }
}

/// Outcome of recording one notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RecordOutcome {
    /// First delivery of this Reference; the row was created.
    Stored,
    /// The Reference was stored before. Benign: the bank delivers
    /// at-least-once. A differing payload under a known Reference is ignored
    /// without reconciliation.
    AlreadyExists,
    /// The network code was not "00"; nothing was persisted and the verbatim
    /// code is surfaced with its classification.
    Rejected {
        code: String,
        category: OutcomeCategory,
    },
}

/// Screen a notice before any insert: required fields must be present and a
/// non-approved network code short-circuits into `Rejected`.
pub(crate) fn screen_notice(notice: &PaymentNotice) -> Result<Option<RecordOutcome>, GatewayError> {
    let required: [(&str, &str); 8] = [
        ("IdComercio", &notice.id_comercio),
        ("TelefonoComercio", &notice.telefono_comercio),
        ("TelefonoEmisor", &notice.telefono_emisor),
        ("BancoEmisor", &notice.banco_emisor),
        ("Monto", &notice.monto),
        ("FechaHora", &notice.fecha_hora),
        ("Referencia", &notice.referencia),
        ("CodigoRed", &notice.codigo_red),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(GatewayError::MalformedOperation {
                operation: "R4notifica",
                detail: format!("missing or empty field '{}'", field),
            });
        }
    }

    if notice.codigo_red != APPROVED_CODE {
        let (category, _) = taxonomy::classify(&notice.codigo_red);
        return Ok(Some(RecordOutcome::Rejected {
            code: notice.codigo_red.clone(),
            category,
        }));
    }

    Ok(None)
}

/// In-memory notification store with atomic insert-if-absent semantics.
///
/// The mutex is held only for the map operation itself, never across I/O.
#[derive(Debug, Default)]
pub struct NotificationLedger {
    records: Mutex<HashMap<String, NotificationRecord>>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Record a notification. Exactly one caller per Reference observes
    /// `Stored`; every other delivery of the same Reference observes
    /// `AlreadyExists`, concurrent or not.
    pub fn record(&self, notice: &PaymentNotice) -> Result<RecordOutcome, GatewayError> {
        if let Some(rejected) = screen_notice(notice)? {
            return Ok(rejected);
        }

        let record = NotificationRecord::from_notice(notice, Utc::now());
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Ledger("notification store poisoned".to_string()))?;
        match records.entry(record.reference.clone()) {
            Entry::Occupied(_) => Ok(RecordOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(RecordOutcome::Stored)
            }
        }
    }

    pub fn find_by_reference(&self, reference: &str) -> Option<NotificationRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(reference).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn notice(reference: &str, codigo_red: &str) -> PaymentNotice {
        PaymentNotice {
            id_comercio: "J123456789".to_string(),
            telefono_comercio: "04140000001".to_string(),
            telefono_emisor: "04240000002".to_string(),
            concepto: "pago".to_string(),
            banco_emisor: "0102".to_string(),
            monto: "250.50".to_string(),
            fecha_hora: "2024-01-15 10:22:33".to_string(),
            referencia: reference.to_string(),
            codigo_red: codigo_red.to_string(),
        }
    }

    #[test]
    fn first_delivery_stores_second_is_benign() {
        let ledger = NotificationLedger::new();
        assert_eq!(ledger.record(&notice("REF-1", "00")).unwrap(), RecordOutcome::Stored);
        assert_eq!(
            ledger.record(&notice("REF-1", "00")).unwrap(),
            RecordOutcome::AlreadyExists
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn duplicate_with_different_payload_is_not_reconciled() {
        let ledger = NotificationLedger::new();
        ledger.record(&notice("REF-1", "00")).unwrap();

        let mut altered = notice("REF-1", "00");
        altered.monto = "999.99".to_string();
        assert_eq!(ledger.record(&altered).unwrap(), RecordOutcome::AlreadyExists);

        // First stored payload wins.
        let stored = ledger.find_by_reference("REF-1").unwrap();
        assert_eq!(stored.amount, "250.50");
    }

    #[test]
    fn rejected_code_is_classified_and_never_stored() {
        let ledger = NotificationLedger::new();
        let outcome = ledger.record(&notice("REF-2", "13")).unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Rejected {
                code: "13".to_string(),
                category: OutcomeCategory::Rejected,
            }
        );
        assert!(ledger.find_by_reference("REF-2").is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn unknown_code_rejects_with_unknown_category() {
        let ledger = NotificationLedger::new();
        let outcome = ledger.record(&notice("REF-3", "77")).unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Rejected {
                code: "77".to_string(),
                category: OutcomeCategory::Unknown,
            }
        );
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let ledger = NotificationLedger::new();
        let mut bad = notice("REF-4", "00");
        bad.monto = "  ".to_string();
        let err = ledger.record(&bad).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedOperation { .. }));
    }

    #[tokio::test]
    async fn concurrent_same_reference_yields_one_stored_one_already_exists() {
        let ledger = Arc::new(NotificationLedger::new());

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.record(&notice("REF-RACE", "00")).unwrap() })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.record(&notice("REF-RACE", "00")).unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        let stored = [&a, &b]
            .iter()
            .filter(|outcome| ***outcome == RecordOutcome::Stored)
            .count();
        let duplicate = [&a, &b]
            .iter()
            .filter(|outcome| ***outcome == RecordOutcome::AlreadyExists)
            .count();
        assert_eq!((stored, duplicate), (1, 1));
        assert_eq!(ledger.len(), 1);
    }
}
