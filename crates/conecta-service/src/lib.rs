//! REST surface for the Conecta gateway.
//!
//! This layer is deliberately thin: it extracts the `Authorization` and
//! `Commerce` headers, parses the request body into the operation's schema,
//! and hands everything to the core. HTTP status codes reflect the core error
//! taxonomy one-to-one.

#![deny(unsafe_code)]

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use conecta_adapters::{build_registry, HttpBankDispatcher};
use conecta_core::orchestrator::BankDispatcher;
use conecta_core::{
    AccountCredit, AuthSigner, C2PCharge, C2PVoid, ChangeReturn, ClientQuery, Commerce,
    DomiciliationByAccount, DomiciliationByPhone, GatewayError, ImmediateCredit, ImmediateDebit,
    NotificationStorageConfig, Operation, OperationOutcome, OtpGenerate, PaymentDispersion,
    PaymentNotice, PaymentVerify, PersistentNotificationLedger, RateQuery, RecordOutcome,
    StatusQuery, TransactionOrchestrator,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the R4 platform, e.g. "https://bancaenlinea.example/api".
    pub bank_base_url: String,
    pub request_timeout: Duration,
    pub storage: NotificationStorageConfig,
    pub commerces: Vec<Commerce>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bank_base_url: "http://127.0.0.1:9090".to_string(),
            request_timeout: Duration::from_secs(30),
            storage: NotificationStorageConfig::Memory,
            commerces: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ServiceState {
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub ledger: Arc<PersistentNotificationLedger>,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self, ServiceError> {
        let dispatcher =
            HttpBankDispatcher::new(config.bank_base_url.clone(), config.request_timeout)?;
        Self::with_dispatcher(config, Arc::new(dispatcher)).await
    }

    /// Bootstrap with a caller-supplied dispatcher; tests script the bank side
    /// through this seam.
    pub async fn with_dispatcher(
        config: ServiceConfig,
        dispatcher: Arc<dyn BankDispatcher>,
    ) -> Result<Self, ServiceError> {
        let mut signer = AuthSigner::new();
        for commerce in config.commerces {
            signer.register_commerce(commerce);
        }

        let orchestrator = TransactionOrchestrator::new(signer, build_registry(), dispatcher);
        let ledger = PersistentNotificationLedger::bootstrap(config.storage).await?;

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            ledger: Arc::new(ledger),
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/MBbcv", post(rate_query))
        .route("/R4consulta", post(client_query))
        .route("/R4notifica", post(payment_notify))
        .route("/R4pagos", post(payment_dispersion))
        .route("/MBvuelto", post(change_return))
        .route("/GenerarOtp", post(otp_generate))
        .route("/DebitoInmediato", post(immediate_debit))
        .route("/CreditoInmediato", post(immediate_credit))
        .route("/CICuentas", post(account_credit))
        .route(
            "/TransferenciaOnline/DomiciliacionCNTA",
            post(domiciliation_by_account),
        )
        .route(
            "/TransferenciaOnline/DomiciliacionCELE",
            post(domiciliation_by_phone),
        )
        .route("/MBc2p", post(c2p_charge))
        .route("/MBanulacionC2P", post(c2p_void))
        .route("/ConsultarOperaciones", post(status_query))
        .route("/VerificoPago", post(payment_verify))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Gateway(err) = self;
        // One-to-one with the core taxonomy. The authentication message stays
        // opaque; everything else surfaces its own description.
        let status = match &err {
            GatewayError::Authentication => StatusCode::UNAUTHORIZED,
            GatewayError::MalformedOperation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::UnknownBank(_) => StatusCode::NOT_FOUND,
            GatewayError::BankUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Ledger(_) | GatewayError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        warn!(status = %status, "request failed: {err}");
        (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
    }
}

/// Pull the protocol headers off the request. Missing `Commerce` fails the
/// same opaque way as a missing or wrong `Authorization`.
fn extract_credentials(headers: &HeaderMap) -> Result<(String, Option<String>), ApiError> {
    let commerce = headers
        .get("Commerce")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or(GatewayError::Authentication)?;
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    Ok((commerce, authorization))
}

async fn execute_operation(
    state: &ServiceState,
    headers: &HeaderMap,
    operation: Operation,
) -> Result<Json<OperationOutcome>, ApiError> {
    let (commerce, authorization) = extract_credentials(headers)?;
    state
        .orchestrator
        .authenticate(&commerce, authorization.as_deref(), &operation)?;

    let outcome = state.orchestrator.execute(&commerce, operation).await?;
    info!(
        operation = outcome.operation,
        code = %outcome.code,
        category = ?outcome.category,
        "operation dispatched"
    );
    Ok(Json(outcome))
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    notification_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "conecta-service",
        notification_backend: state.ledger.backend_label(),
    })
}

async fn rate_query(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<RateQuery>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::RateQuery(request)).await
}

#[derive(Debug, Clone, Serialize)]
struct ClientQueryResponse {
    status: bool,
}

/// Payment-intent stage: once the caller is authentic, the intent is accepted
/// and the decision deferred to the notification that follows.
async fn client_query(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<ClientQuery>,
) -> Result<Json<ClientQueryResponse>, ApiError> {
    let operation = Operation::ClientQuery(request);
    let (commerce, authorization) = extract_credentials(&headers)?;
    state
        .orchestrator
        .authenticate(&commerce, authorization.as_deref(), &operation)?;
    Ok(Json(ClientQueryResponse { status: true }))
}

#[derive(Debug, Clone, Serialize)]
struct NotifyResponse {
    abono: bool,
    mensaje: String,
    codigo: i32,
}

async fn payment_notify(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(notice): Json<PaymentNotice>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let operation = Operation::PaymentNotify(notice.clone());
    let (commerce, authorization) = extract_credentials(&headers)?;
    state
        .orchestrator
        .authenticate(&commerce, authorization.as_deref(), &operation)?;

    let outcome = state.ledger.record(&notice).await?;
    let response = match outcome {
        RecordOutcome::Stored => {
            info!(reference = %notice.referencia, "notification stored");
            NotifyResponse {
                abono: true,
                mensaje: "Notificacion procesada".to_string(),
                codigo: 1,
            }
        }
        RecordOutcome::AlreadyExists => {
            info!(reference = %notice.referencia, "duplicate notification ignored");
            NotifyResponse {
                abono: true,
                mensaje: "Referencia ya registrada".to_string(),
                codigo: 0,
            }
        }
        RecordOutcome::Rejected { code, .. } => {
            warn!(reference = %notice.referencia, code = %code, "rejected notification");
            NotifyResponse {
                abono: false,
                mensaje: format!("Transaccion no aprobada - Codigo: {code}"),
                codigo: -1,
            }
        }
    };
    Ok(Json(response))
}

async fn payment_dispersion(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<PaymentDispersion>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::PaymentDispersion(request)).await
}

async fn change_return(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<ChangeReturn>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::ChangeReturn(request)).await
}

async fn otp_generate(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<OtpGenerate>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::OtpGenerate(request)).await
}

async fn immediate_debit(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<ImmediateDebit>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::ImmediateDebit(request)).await
}

async fn immediate_credit(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<ImmediateCredit>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::ImmediateCredit(request)).await
}

async fn account_credit(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<AccountCredit>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::AccountCredit(request)).await
}

async fn domiciliation_by_account(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<DomiciliationByAccount>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::DomiciliationByAccount(request)).await
}

async fn domiciliation_by_phone(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<DomiciliationByPhone>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::DomiciliationByPhone(request)).await
}

async fn c2p_charge(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<C2PCharge>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::C2PCharge(request)).await
}

async fn c2p_void(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<C2PVoid>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::C2PVoid(request)).await
}

async fn status_query(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<StatusQuery>,
) -> Result<Json<OperationOutcome>, ApiError> {
    execute_operation(&state, &headers, Operation::StatusQuery(request)).await
}

#[derive(Debug, Clone, Serialize, Default)]
struct PaymentVerifyResponse {
    #[serde(rename = "Telefono")]
    telefono: String,
    #[serde(rename = "Banco")]
    banco: String,
    #[serde(rename = "Monto")]
    monto: String,
    #[serde(rename = "FechaHora")]
    fecha_hora: String,
    #[serde(rename = "Referencia")]
    referencia: String,
    encontrado: bool,
}

/// Cross-check a payment against the notification ledger by Reference.
async fn payment_verify(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(request): Json<PaymentVerify>,
) -> Result<Json<PaymentVerifyResponse>, ApiError> {
    let operation = Operation::PaymentVerify(request.clone());
    let (commerce, authorization) = extract_credentials(&headers)?;
    state
        .orchestrator
        .authenticate(&commerce, authorization.as_deref(), &operation)?;

    let found = state.ledger.find_by_reference(&request.referencia).await?;
    let response = match found {
        Some(record) => PaymentVerifyResponse {
            telefono: record.issuer_phone,
            banco: record.issuer_bank,
            monto: record.amount,
            fecha_hora: record.occurred_at,
            referencia: record.reference,
            encontrado: true,
        },
        None => PaymentVerifyResponse::default(),
    };
    Ok(Json(response))
}
