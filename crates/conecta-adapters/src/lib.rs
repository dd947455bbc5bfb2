//! Bank adapters and outbound dispatch for the Conecta gateway.
//!
//! The issuing banks of the network share one capability surface; what varies
//! between them is data, not code. `BANK_TABLE` is that data: one row per
//! bank, naming its code, alias, and reply dialect. `build_registry` turns
//! the table into a populated `BankAdapterRegistry` at process start.

#![deny(unsafe_code)]

use async_trait::async_trait;
use conecta_core::orchestrator::{BankDispatcher, DispatchHeaders, DispatchResponse};
use conecta_core::{BankAdapter, BankAdapterRegistry, BankReply, GatewayError, Operation};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Reply dialect spoken by a bank.
///
/// Most banks answer with the documented `code`/`message`/`reference` keys; a
/// few older integrations still answer with the Spanish legacy keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStyle {
    Standard,
    LegacyCodigo,
}

/// One row of the issuing-bank table.
#[derive(Debug, Clone, Copy)]
pub struct BankEntry {
    pub code: &'static str,
    pub alias: &'static str,
    pub reply_style: ReplyStyle,
}

/// Issuing banks of the network, plus the platform itself ("r4").
/// Adding a bank is a new row here, nothing else.
pub const BANK_TABLE: &[BankEntry] = &[
    BankEntry { code: "r4", alias: "r4", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0102", alias: "bdv", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0104", alias: "bvc", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0105", alias: "mercantil", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0108", alias: "provincial", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0114", alias: "bancaribe", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0115", alias: "bancoexterior", reply_style: ReplyStyle::LegacyCodigo },
    BankEntry { code: "0128", alias: "caroni", reply_style: ReplyStyle::LegacyCodigo },
    BankEntry { code: "0134", alias: "banesco", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0137", alias: "sofitasa", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0138", alias: "plaza", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0146", alias: "bangente", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0151", alias: "bfc", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0156", alias: "100banco", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0157", alias: "delsur", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0163", alias: "tesoro", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0166", alias: "agricola", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0168", alias: "bancrecer", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0169", alias: "mibanco", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0171", alias: "activo", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0172", alias: "bancamiga", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0174", alias: "banplus", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0175", alias: "bicentenario", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0177", alias: "banfanb", reply_style: ReplyStyle::Standard },
    BankEntry { code: "0191", alias: "bnc", reply_style: ReplyStyle::Standard },
];

/// Build the process-wide registry from the static table.
pub fn build_registry() -> BankAdapterRegistry {
    let mut registry = BankAdapterRegistry::new();
    for entry in BANK_TABLE {
        registry.register(Arc::new(TableBankAdapter { entry: *entry }));
    }
    registry
}

/// Adapter driven entirely by its table row.
#[derive(Debug, Clone)]
pub struct TableBankAdapter {
    entry: BankEntry,
}

impl TableBankAdapter {
    pub fn new(entry: BankEntry) -> Self {
        Self { entry }
    }
}

impl BankAdapter for TableBankAdapter {
    fn bank_code(&self) -> &str {
        self.entry.code
    }

    fn alias(&self) -> &str {
        self.entry.alias
    }

    fn resolve_endpoint(&self, operation: &Operation) -> String {
        operation.endpoint().to_string()
    }

    fn shape_request(&self, operation: &Operation) -> Result<Value, GatewayError> {
        let payload = operation_payload(operation)?;
        // The platform's OTP endpoint takes its body keys in lowercase,
        // unlike the canonical-message field names.
        if matches!(operation, Operation::OtpGenerate(_)) {
            return Ok(lowercase_keys(payload));
        }
        Ok(payload)
    }

    fn parse_response(&self, raw: &Value) -> Result<BankReply, GatewayError> {
        let (code_key, message_key, reference_key) = match self.entry.reply_style {
            ReplyStyle::Standard => ("code", "message", "reference"),
            ReplyStyle::LegacyCodigo => ("codigo", "mensaje", "referencia"),
        };

        let code = raw
            .get(code_key)
            .and_then(value_as_code)
            .ok_or_else(|| {
                GatewayError::Serialization(format!(
                    "bank {} reply carries no '{}' field",
                    self.entry.code, code_key
                ))
            })?;

        Ok(BankReply {
            code,
            message: raw
                .get(message_key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reference: raw
                .get(reference_key)
                .and_then(Value::as_str)
                .map(str::to_string),
            fields: raw.clone(),
        })
    }
}

/// Wire payload for an operation: the inner body without the enum tag.
fn operation_payload(operation: &Operation) -> Result<Value, GatewayError> {
    let value = match operation {
        Operation::RateQuery(op) => serde_json::to_value(op),
        Operation::ClientQuery(op) => serde_json::to_value(op),
        Operation::PaymentNotify(op) => serde_json::to_value(op),
        Operation::PaymentDispersion(op) => serde_json::to_value(op),
        Operation::ChangeReturn(op) => serde_json::to_value(op),
        Operation::OtpGenerate(op) => serde_json::to_value(op),
        Operation::ImmediateDebit(op) => serde_json::to_value(op),
        Operation::ImmediateCredit(op) => serde_json::to_value(op),
        Operation::AccountCredit(op) => serde_json::to_value(op),
        Operation::DomiciliationByAccount(op) => serde_json::to_value(op),
        Operation::DomiciliationByPhone(op) => serde_json::to_value(op),
        Operation::C2PCharge(op) => serde_json::to_value(op),
        Operation::C2PVoid(op) => serde_json::to_value(op),
        Operation::StatusQuery(op) => serde_json::to_value(op),
        Operation::PaymentVerify(op) => serde_json::to_value(op),
    };
    value.map_err(|e| GatewayError::Serialization(e.to_string()))
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Some platforms answer the OTP endpoint with a numeric 202.
fn value_as_code(value: &Value) -> Option<String> {
    match value {
        Value::String(code) => Some(code.clone()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

/// HTTP dispatcher posting JSON to the platform base URL.
pub struct HttpBankDispatcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBankDispatcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Serialization(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl BankDispatcher for HttpBankDispatcher {
    async fn dispatch(
        &self,
        endpoint: &str,
        payload: &Value,
        headers: &DispatchHeaders,
    ) -> Result<DispatchResponse, GatewayError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", &headers.authorization)
            .header("Commerce", &headers.commerce)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("{endpoint}: request timed out")
                } else {
                    format!("{endpoint}: connection failed")
                };
                GatewayError::BankUnavailable {
                    operation: "dispatch",
                    reason,
                }
            })?;

        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(DispatchResponse { status, body })
    }
}

/// Scripted dispatcher for deterministic tests. Records every call.
pub struct MockBankDispatcher {
    response: DispatchResponse,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockBankDispatcher {
    pub fn replying(status: u16, body: Value) -> Self {
        Self {
            response: DispatchResponse { status, body },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BankDispatcher for MockBankDispatcher {
    async fn dispatch(
        &self,
        endpoint: &str,
        payload: &Value,
        _headers: &DispatchHeaders,
    ) -> Result<DispatchResponse, GatewayError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((endpoint.to_string(), payload.clone()));
        }
        Ok(self.response.clone())
    }
}

/// Dispatcher that always fails, for unavailability paths.
pub struct UnreachableBankDispatcher {
    reason: String,
}

impl UnreachableBankDispatcher {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl BankDispatcher for UnreachableBankDispatcher {
    async fn dispatch(
        &self,
        _endpoint: &str,
        _payload: &Value,
        _headers: &DispatchHeaders,
    ) -> Result<DispatchResponse, GatewayError> {
        Err(GatewayError::BankUnavailable {
            operation: "dispatch",
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conecta_core::{OtpGenerate, RateQuery, StatusQuery};
    use serde_json::json;

    #[test]
    fn registry_covers_the_whole_bank_table() {
        let registry = build_registry();
        assert_eq!(registry.len(), BANK_TABLE.len());
        assert!(BANK_TABLE.len() > 20);
        for entry in BANK_TABLE {
            assert!(registry.has(entry.code), "code {}", entry.code);
            assert!(registry.has(entry.alias), "alias {}", entry.alias);
        }
    }

    #[test]
    fn alias_and_code_resolve_to_the_same_adapter() {
        let registry = build_registry();
        let by_code = registry.resolve("0134").unwrap();
        let by_alias = registry.resolve("banesco").unwrap();
        assert_eq!(by_code.bank_code(), by_alias.bank_code());
    }

    #[test]
    fn otp_request_body_uses_lowercase_keys() {
        let adapter = TableBankAdapter::new(BANK_TABLE[0]);
        let operation = Operation::OtpGenerate(OtpGenerate {
            banco: "0134".to_string(),
            monto: "1000.00".to_string(),
            telefono: "04141234567".to_string(),
            cedula: "V12345678".to_string(),
        });
        let payload = adapter.shape_request(&operation).unwrap();
        assert_eq!(payload["banco"], "0134");
        assert_eq!(payload["monto"], "1000.00");
        assert!(payload.get("Banco").is_none());
    }

    #[test]
    fn standard_request_body_keeps_wire_casing() {
        let adapter = TableBankAdapter::new(BANK_TABLE[0]);
        let operation = Operation::RateQuery(RateQuery {
            moneda: "USD".to_string(),
            fecha_valor: "2024-01-15".to_string(),
        });
        let payload = adapter.shape_request(&operation).unwrap();
        assert_eq!(payload["Moneda"], "USD");
        assert_eq!(payload["Fechavalor"], "2024-01-15");
    }

    #[test]
    fn standard_reply_parses_code_message_reference() {
        let adapter = TableBankAdapter::new(BankEntry {
            code: "0134",
            alias: "banesco",
            reply_style: ReplyStyle::Standard,
        });
        let reply = adapter
            .parse_response(&json!({
                "code": "00",
                "message": "TRANSACCION EXITOSA",
                "reference": "000123"
            }))
            .unwrap();
        assert_eq!(reply.code, "00");
        assert_eq!(reply.reference.as_deref(), Some("000123"));
    }

    #[test]
    fn legacy_reply_dialect_is_translated() {
        let adapter = TableBankAdapter::new(BankEntry {
            code: "0115",
            alias: "bancoexterior",
            reply_style: ReplyStyle::LegacyCodigo,
        });
        let reply = adapter
            .parse_response(&json!({
                "codigo": "00",
                "mensaje": "TRANSACCION EXITOSA",
                "referencia": "000456"
            }))
            .unwrap();
        assert_eq!(reply.code, "00");
        assert_eq!(reply.message, "TRANSACCION EXITOSA");
        assert_eq!(reply.reference.as_deref(), Some("000456"));
    }

    #[test]
    fn numeric_status_code_is_accepted() {
        let adapter = TableBankAdapter::new(BANK_TABLE[0]);
        let reply = adapter
            .parse_response(&json!({"code": 202, "message": "OTP ENVIADO"}))
            .unwrap();
        assert_eq!(reply.code, "202");
    }

    #[test]
    fn reply_without_code_is_a_serialization_error() {
        let adapter = TableBankAdapter::new(BANK_TABLE[0]);
        let err = adapter
            .parse_response(&json!({"message": "sin codigo"}))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }

    #[tokio::test]
    async fn mock_dispatcher_records_endpoint_and_payload() {
        let dispatcher = MockBankDispatcher::replying(200, json!({"code": "00"}));
        let operation = Operation::StatusQuery(StatusQuery {
            id: "op-1".to_string(),
        });
        let headers = DispatchHeaders {
            authorization: "sig".to_string(),
            commerce: "J123456789".to_string(),
        };
        dispatcher
            .dispatch(operation.endpoint(), &json!({"Id": "op-1"}), &headers)
            .await
            .unwrap();

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/ConsultarOperaciones");
    }

    #[tokio::test]
    async fn unreachable_dispatcher_surfaces_bank_unavailable() {
        let dispatcher = UnreachableBankDispatcher::new("forced outage");
        let err = dispatcher
            .dispatch(
                "/MBbcv",
                &json!({}),
                &DispatchHeaders {
                    authorization: "sig".to_string(),
                    commerce: "J123456789".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BankUnavailable { .. }));
    }
}
