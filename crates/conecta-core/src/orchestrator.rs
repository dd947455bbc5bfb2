//! Transaction orchestration.
//!
//! One operation travels: cross-field validation → canonical build and
//! signature → adapter resolution → dispatch to the bank with a bounded
//! timeout → reply parsing → response-code classification. Validation and
//! authentication failures are resolved locally and never produce an
//! outbound call; the orchestrator performs no retries of its own.

use crate::amount;
use crate::auth::AuthSigner;
use crate::canonical;
use crate::error::GatewayError;
use crate::flow::{OtpFlow, OtpStage};
use crate::operation::{AuthScheme, Operation};
use crate::registry::{BankAdapterRegistry, BankReply, PLATFORM_BANK};
use crate::taxonomy::{self, OperationStatus, OutcomeCategory};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Headers attached to every outbound bank call.
#[derive(Debug, Clone)]
pub struct DispatchHeaders {
    pub authorization: String,
    pub commerce: String,
}

/// Raw response from a bank endpoint.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub status: u16,
    pub body: Value,
}

/// Outbound transport collaborator.
///
/// Implementations own the platform base URL and the bounded timeout.
/// Transport failures surface as `BankUnavailable`; an abandoned in-flight
/// call is "outcome unknown" and must never be reported as success.
#[async_trait]
pub trait BankDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        endpoint: &str,
        payload: &Value,
        headers: &DispatchHeaders,
    ) -> Result<DispatchResponse, GatewayError>;
}

/// Classified result of one operation, reported upward.
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub operation: &'static str,
    /// Verbatim wire code, interbank or operation-status namespace.
    pub code: String,
    pub category: OutcomeCategory,
    /// Present when the code belongs to the operation-status namespace.
    pub status: Option<OperationStatus>,
    pub message: String,
    pub reference: Option<String>,
}

/// Coordinates a single operation end-to-end.
pub struct TransactionOrchestrator {
    signer: AuthSigner,
    registry: BankAdapterRegistry,
    dispatcher: Arc<dyn BankDispatcher>,
    otp_max_delay: Duration,
    otp_flows: Mutex<HashMap<String, OtpFlow>>,
}

impl TransactionOrchestrator {
    pub fn new(
        signer: AuthSigner,
        registry: BankAdapterRegistry,
        dispatcher: Arc<dyn BankDispatcher>,
    ) -> Self {
        Self {
            signer,
            registry,
            dispatcher,
            // Defensive bound only; the authoritative OTP TTL lives at the bank.
            otp_max_delay: Duration::minutes(5),
            otp_flows: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_otp_max_delay(mut self, max_delay: Duration) -> Self {
        self.otp_max_delay = max_delay;
        self
    }

    pub fn signer(&self) -> &AuthSigner {
        &self.signer
    }

    /// Authenticate an inbound request before anything else runs.
    ///
    /// HMAC operations verify the presented signature against the canonical
    /// message; token operations compare the commerce's static token. A
    /// missing header fails the same way as a wrong one.
    pub fn authenticate(
        &self,
        commerce_id: &str,
        authorization: Option<&str>,
        operation: &Operation,
    ) -> Result<(), GatewayError> {
        let presented = authorization.ok_or(GatewayError::Authentication)?;
        match operation.auth_scheme() {
            AuthScheme::CanonicalHmac => {
                let message = canonical::build(operation)?;
                self.signer.verify(commerce_id, &message, presented)
            }
            AuthScheme::CommerceToken => self.signer.verify_token(commerce_id, presented),
        }
    }

    /// Execute one outbound operation for a commerce.
    pub async fn execute(
        &self,
        commerce_id: &str,
        operation: Operation,
    ) -> Result<OperationOutcome, GatewayError> {
        self.validate(&operation)?;
        self.consume_otp_if_required(&operation).await?;

        let message = canonical::build(&operation)?;
        let signature = self.signer.sign(commerce_id, &message)?;

        let bank_key = operation.bank_code().unwrap_or(PLATFORM_BANK);
        let adapter = self.registry.resolve(bank_key)?;

        let endpoint = adapter.resolve_endpoint(&operation);
        let payload = adapter.shape_request(&operation)?;
        let headers = DispatchHeaders {
            authorization: signature.to_string(),
            commerce: commerce_id.to_string(),
        };

        let response = match self.dispatcher.dispatch(&endpoint, &payload, &headers).await {
            Ok(response) => response,
            Err(err) => {
                self.abandon_otp_flow(&operation).await;
                return Err(err);
            }
        };

        if response.status >= 500 {
            self.abandon_otp_flow(&operation).await;
            return Err(GatewayError::bank_unavailable(
                operation.name(),
                format!("bank answered HTTP {}", response.status),
            ));
        }

        let reply = if response.status == 200 {
            adapter.parse_response(&response.body)?
        } else {
            // The platform answers client errors in-band as a rejection.
            BankReply {
                code: "01".to_string(),
                message: format!("HTTP {}", response.status),
                reference: None,
                fields: response.body,
            }
        };

        let outcome = classify_reply(&operation, reply);
        self.settle_otp_flow(&operation, &outcome).await;
        Ok(outcome)
    }

    fn validate(&self, operation: &Operation) -> Result<(), GatewayError> {
        match operation {
            Operation::PaymentDispersion(op) => {
                if op.personas.is_empty() {
                    return Err(GatewayError::MalformedOperation {
                        operation: operation.name(),
                        detail: "dispersion carries no beneficiaries".to_string(),
                    });
                }
                amount::check_dispersion_total(
                    operation.name(),
                    &op.monto,
                    op.personas.iter().map(|p| p.monto_part.as_str()),
                )
            }
            Operation::ImmediateDebit(op) => {
                amount::parse_amount(operation.name(), "Monto", &op.monto).map(|_| ())
            }
            Operation::ImmediateCredit(op) => {
                amount::parse_amount(operation.name(), "Monto", &op.monto).map(|_| ())
            }
            Operation::AccountCredit(op) => {
                amount::parse_amount(operation.name(), "Monto", &op.monto).map(|_| ())
            }
            Operation::ChangeReturn(op) => {
                amount::parse_amount(operation.name(), "Monto", &op.monto).map(|_| ())
            }
            Operation::C2PCharge(op) => {
                amount::parse_amount(operation.name(), "Monto", &op.monto).map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Sequence the OTP for operations that consume one.
    ///
    /// An empty or stale OTP is rejected here, before any signature work.
    /// A flow unknown to this process (OTP issued before a restart) proceeds;
    /// the bank holds the authoritative TTL and will reject a bad value.
    async fn consume_otp_if_required(&self, operation: &Operation) -> Result<(), GatewayError> {
        let (otp, key) = match operation {
            Operation::ImmediateDebit(op) => {
                (op.otp.as_str(), otp_flow_key(&op.banco, &op.telefono, &op.cedula))
            }
            Operation::C2PCharge(op) => (
                op.otp.as_str(),
                otp_flow_key(&op.banco, &op.telefono_destino, &op.cedula),
            ),
            _ => return Ok(()),
        };

        if otp.trim().is_empty() {
            return Err(GatewayError::missing_field(operation.name(), "OTP"));
        }

        let mut flows = self.otp_flows.lock().await;
        if let Some(mut flow) = flows.remove(&key) {
            let result = flow.present(otp, Utc::now());
            if !flow.stage().is_terminal() {
                flows.insert(key, flow);
            }
            result?;
        }
        Ok(())
    }

    /// Register an issued OTP after the bank acknowledged `GenerarOtp`.
    async fn settle_otp_flow(&self, operation: &Operation, outcome: &OperationOutcome) {
        match operation {
            Operation::OtpGenerate(op) => {
                if outcome.status == Some(OperationStatus::Received)
                    || outcome.category == OutcomeCategory::Approved
                {
                    let mut flow = OtpFlow::new("DebitoInmediato", self.otp_max_delay);
                    if flow.mark_issued(Utc::now()).is_ok() {
                        let key = otp_flow_key(&op.banco, &op.telefono, &op.cedula);
                        self.otp_flows.lock().await.insert(key, flow);
                    }
                }
            }
            Operation::ImmediateDebit(op) => {
                let key = otp_flow_key(&op.banco, &op.telefono, &op.cedula);
                self.finish_flow(&key, outcome).await;
            }
            Operation::C2PCharge(op) => {
                let key = otp_flow_key(&op.banco, &op.telefono_destino, &op.cedula);
                self.finish_flow(&key, outcome).await;
            }
            _ => {}
        }
    }

    async fn finish_flow(&self, key: &str, outcome: &OperationOutcome) {
        let mut flows = self.otp_flows.lock().await;
        if let Some(mut flow) = flows.remove(key) {
            match outcome.category {
                OutcomeCategory::Approved => {
                    let _ = flow.complete();
                }
                // "55" is the issuer's invalid-authorization-value answer.
                _ if outcome.code == "55" => flow.mark_mismatch(),
                _ => flow.fail(),
            }
        }
    }

    async fn abandon_otp_flow(&self, operation: &Operation) {
        let key = match operation {
            Operation::ImmediateDebit(op) => otp_flow_key(&op.banco, &op.telefono, &op.cedula),
            Operation::C2PCharge(op) => {
                otp_flow_key(&op.banco, &op.telefono_destino, &op.cedula)
            }
            _ => return,
        };
        // Outcome unknown: drop the consumed flow rather than guessing.
        let mut flows = self.otp_flows.lock().await;
        if let Some(mut flow) = flows.remove(&key) {
            flow.fail();
        }
    }

    /// Stage of the in-flight OTP flow for a (bank, phone, document) triple.
    pub async fn otp_flow_stage(&self, banco: &str, telefono: &str, cedula: &str) -> Option<OtpStage> {
        let key = otp_flow_key(banco, telefono, cedula);
        self.otp_flows.lock().await.get(&key).map(|flow| flow.stage())
    }
}

fn otp_flow_key(banco: &str, telefono: &str, cedula: &str) -> String {
    format!("{banco}:{telefono}:{cedula}")
}

fn classify_reply(operation: &Operation, reply: BankReply) -> OperationOutcome {
    if let Some(status) = OperationStatus::from_wire(&reply.code) {
        // Status namespace: the platform took the message; nothing was
        // rejected. Final state may still require a status query.
        return OperationOutcome {
            operation: operation.name(),
            code: reply.code,
            category: OutcomeCategory::Approved,
            status: Some(status),
            message: reply.message,
            reference: reply.reference,
        };
    }

    let (category, default_message) = taxonomy::classify(&reply.code);
    let message = if reply.message.is_empty() {
        default_message.to_string()
    } else {
        reply.message
    };
    OperationOutcome {
        operation: operation.name(),
        code: reply.code,
        category,
        status: None,
        message,
        reference: reply.reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Commerce;
    use crate::operation::{
        DispersionBeneficiary, ImmediateDebit, OtpGenerate, PaymentDispersion, RateQuery,
    };
    use crate::registry::BankAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COMMERCE: &str = "J123456789";

    struct PassthroughAdapter {
        code: &'static str,
        alias: &'static str,
    }

    impl BankAdapter for PassthroughAdapter {
        fn bank_code(&self) -> &str {
            self.code
        }

        fn alias(&self) -> &str {
            self.alias
        }

        fn resolve_endpoint(&self, operation: &Operation) -> String {
            operation.endpoint().to_string()
        }

        fn shape_request(&self, operation: &Operation) -> Result<Value, GatewayError> {
            serde_json::to_value(operation).map_err(|e| GatewayError::Serialization(e.to_string()))
        }

        fn parse_response(&self, raw: &Value) -> Result<BankReply, GatewayError> {
            Ok(BankReply {
                code: raw
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                message: raw
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                reference: raw
                    .get("reference")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                fields: raw.clone(),
            })
        }
    }

    /// Scripted dispatcher that counts outbound calls.
    struct ScriptedDispatcher {
        response: DispatchResponse,
        calls: AtomicUsize,
    }

    impl ScriptedDispatcher {
        fn replying(status: u16, body: Value) -> Arc<Self> {
            Arc::new(Self {
                response: DispatchResponse { status, body },
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BankDispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            _endpoint: &str,
            _payload: &Value,
            _headers: &DispatchHeaders,
        ) -> Result<DispatchResponse, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct UnreachableDispatcher;

    #[async_trait]
    impl BankDispatcher for UnreachableDispatcher {
        async fn dispatch(
            &self,
            _endpoint: &str,
            _payload: &Value,
            _headers: &DispatchHeaders,
        ) -> Result<DispatchResponse, GatewayError> {
            Err(GatewayError::bank_unavailable("test", "connection timed out"))
        }
    }

    fn orchestrator(dispatcher: Arc<dyn BankDispatcher>) -> TransactionOrchestrator {
        let mut signer = AuthSigner::new();
        signer.register_commerce(Commerce::new(
            COMMERCE,
            "super-secreto",
            "0b7a1f8e-3d9c-4a52-9e20-0f4c6d1b2a33",
        ));

        let mut registry = BankAdapterRegistry::new();
        registry.register(Arc::new(PassthroughAdapter {
            code: PLATFORM_BANK,
            alias: PLATFORM_BANK,
        }));
        registry.register(Arc::new(PassthroughAdapter {
            code: "0134",
            alias: "banesco",
        }));

        TransactionOrchestrator::new(signer, registry, dispatcher)
    }

    fn rate_query() -> Operation {
        Operation::RateQuery(RateQuery {
            moneda: "USD".to_string(),
            fecha_valor: "2024-01-15".to_string(),
        })
    }

    fn debit(otp: &str) -> Operation {
        Operation::ImmediateDebit(ImmediateDebit {
            banco: "0134".to_string(),
            monto: "1000.00".to_string(),
            telefono: "04141234567".to_string(),
            cedula: "V12345678".to_string(),
            nombre: "Juan Perez".to_string(),
            otp: otp.to_string(),
            concepto: "cobro".to_string(),
        })
    }

    fn otp_generate() -> Operation {
        Operation::OtpGenerate(OtpGenerate {
            banco: "0134".to_string(),
            monto: "1000.00".to_string(),
            telefono: "04141234567".to_string(),
            cedula: "V12345678".to_string(),
        })
    }

    #[tokio::test]
    async fn approved_reply_classifies_and_keeps_reference() {
        let dispatcher = ScriptedDispatcher::replying(
            200,
            serde_json::json!({"code": "00", "message": "TRANSACCION EXITOSA", "reference": "000123"}),
        );
        let orchestrator = orchestrator(dispatcher.clone());

        let outcome = orchestrator.execute(COMMERCE, rate_query()).await.unwrap();
        assert_eq!(outcome.category, OutcomeCategory::Approved);
        assert_eq!(outcome.code, "00");
        assert_eq!(outcome.reference.as_deref(), Some("000123"));
        assert_eq!(dispatcher.calls(), 1);
    }

    #[tokio::test]
    async fn dispersion_mismatch_never_reaches_the_bank() {
        let dispatcher = ScriptedDispatcher::replying(200, serde_json::json!({"code": "00"}));
        let orchestrator = orchestrator(dispatcher.clone());

        let operation = Operation::PaymentDispersion(PaymentDispersion {
            monto: "1000.00".to_string(),
            fecha: "01/15/2024".to_string(),
            referencia: "DISP-1".to_string(),
            personas: vec![
                DispersionBeneficiary {
                    nombres: "Juan Perez".to_string(),
                    documento: "V12345678".to_string(),
                    destino: "01020000000000000001".to_string(),
                    monto_part: "600.00".to_string(),
                },
                DispersionBeneficiary {
                    nombres: "Maria Garcia".to_string(),
                    documento: "V87654321".to_string(),
                    destino: "01340000000000000002".to_string(),
                    monto_part: "399.99".to_string(),
                },
            ],
        });

        let err = orchestrator.execute(COMMERCE, operation).await.unwrap_err();
        assert!(matches!(err, GatewayError::AmountMismatch { .. }));
        assert_eq!(dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_bank_never_reaches_the_bank() {
        let dispatcher = ScriptedDispatcher::replying(200, serde_json::json!({"code": "00"}));
        let orchestrator = orchestrator(dispatcher.clone());

        let mut operation = debit("789123");
        if let Operation::ImmediateDebit(op) = &mut operation {
            op.banco = "0199".to_string();
        }

        let err = orchestrator.execute(COMMERCE, operation).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownBank(_)));
        assert_eq!(dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn empty_otp_is_rejected_before_any_bank_contact() {
        let dispatcher = ScriptedDispatcher::replying(200, serde_json::json!({"code": "00"}));
        let orchestrator = orchestrator(dispatcher.clone());

        let err = orchestrator.execute(COMMERCE, debit("")).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedOperation { .. }));
        assert_eq!(dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn otp_flow_completes_only_after_code_00() {
        let dispatcher = ScriptedDispatcher::replying(
            200,
            serde_json::json!({"code": "202", "message": "OTP ENVIADO", "success": true}),
        );
        let orchestrator = orchestrator(dispatcher);

        let outcome = orchestrator.execute(COMMERCE, otp_generate()).await.unwrap();
        assert_eq!(outcome.status, Some(OperationStatus::Received));
        assert_eq!(
            orchestrator
                .otp_flow_stage("0134", "04141234567", "V12345678")
                .await,
            Some(OtpStage::OtpIssued)
        );

        // Swap in an approving dispatcher for the debit leg.
        let approving = ScriptedDispatcher::replying(
            200,
            serde_json::json!({"code": "00", "message": "TRANSACCION EXITOSA", "reference": "R-1"}),
        );
        let orchestrator = TransactionOrchestrator {
            dispatcher: approving.clone(),
            ..orchestrator
        };

        let outcome = orchestrator.execute(COMMERCE, debit("789123")).await.unwrap();
        assert_eq!(outcome.category, OutcomeCategory::Approved);
        // Terminal: the flow is retired once completed.
        assert_eq!(
            orchestrator
                .otp_flow_stage("0134", "04141234567", "V12345678")
                .await,
            None
        );
    }

    #[tokio::test]
    async fn stale_otp_is_rejected_without_bank_contact() {
        let issue = ScriptedDispatcher::replying(200, serde_json::json!({"code": "202"}));
        let orchestrator =
            orchestrator(issue).with_otp_max_delay(Duration::milliseconds(0));
        orchestrator.execute(COMMERCE, otp_generate()).await.unwrap();

        let debit_dispatcher = ScriptedDispatcher::replying(200, serde_json::json!({"code": "00"}));
        let orchestrator = TransactionOrchestrator {
            dispatcher: debit_dispatcher.clone(),
            ..orchestrator
        };

        let err = orchestrator.execute(COMMERCE, debit("789123")).await.unwrap_err();
        assert!(err.to_string().contains("acceptable delay"));
        assert_eq!(debit_dispatcher.calls(), 0);
    }

    #[tokio::test]
    async fn bank_5xx_maps_to_retryable_unavailability() {
        let dispatcher = ScriptedDispatcher::replying(503, Value::Null);
        let orchestrator = orchestrator(dispatcher);

        let err = orchestrator.execute(COMMERCE, rate_query()).await.unwrap_err();
        assert!(matches!(err, GatewayError::BankUnavailable { .. }));
    }

    #[tokio::test]
    async fn transport_failure_maps_to_bank_unavailable() {
        let orchestrator = orchestrator(Arc::new(UnreachableDispatcher));
        let err = orchestrator.execute(COMMERCE, rate_query()).await.unwrap_err();
        assert!(matches!(err, GatewayError::BankUnavailable { .. }));
    }

    #[tokio::test]
    async fn client_error_status_is_an_in_band_rejection() {
        let dispatcher = ScriptedDispatcher::replying(404, Value::Null);
        let orchestrator = orchestrator(dispatcher);

        let outcome = orchestrator.execute(COMMERCE, rate_query()).await.unwrap();
        assert_eq!(outcome.code, "01");
        assert_eq!(outcome.category, OutcomeCategory::Rejected);
    }

    #[tokio::test]
    async fn inbound_signature_over_transposed_fields_is_rejected() {
        let dispatcher = ScriptedDispatcher::replying(200, serde_json::json!({"code": "00"}));
        let orchestrator = orchestrator(dispatcher);

        let operation = rate_query();
        let message = canonical::build(&operation).unwrap();
        assert_eq!(message.as_str(), "2024-01-15USD");
        let good = orchestrator.signer.sign(COMMERCE, &message).unwrap();
        assert!(orchestrator
            .authenticate(COMMERCE, Some(good.as_str()), &operation)
            .is_ok());

        // Signature computed over the transposed concatenation.
        let transposed = canonical::build(&Operation::RateQuery(RateQuery {
            moneda: "2024-01-15".to_string(),
            fecha_valor: "USD".to_string(),
        }))
        .unwrap();
        assert_eq!(transposed.as_str(), "USD2024-01-15");
        let bad = orchestrator.signer.sign(COMMERCE, &transposed).unwrap();
        let err = orchestrator
            .authenticate(COMMERCE, Some(bad.as_str()), &operation)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authentication));
    }

    #[tokio::test]
    async fn missing_authorization_header_is_an_authentication_failure() {
        let dispatcher = ScriptedDispatcher::replying(200, serde_json::json!({"code": "00"}));
        let orchestrator = orchestrator(dispatcher);
        let err = orchestrator
            .authenticate(COMMERCE, None, &rate_query())
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authentication));
    }
}
