//! Core R4 Conecta protocol gateway.
//!
//! This crate owns the security-sensitive protocol pieces: canonical message
//! construction with fixed per-operation field order, HMAC-SHA256 signing and
//! constant-time verification, the bank adapter registry, transaction
//! orchestration with cross-field invariants, and the idempotent inbound
//! notification ledger.

#![deny(unsafe_code)]

pub mod amount;
pub mod auth;
pub mod canonical;
pub mod error;
pub mod flow;
pub mod ledger;
pub mod operation;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod taxonomy;

pub use auth::{AuthSigner, Commerce, Signature};
pub use canonical::CanonicalMessage;
pub use error::GatewayError;
pub use flow::{OtpFlow, OtpStage};
pub use ledger::{NotificationLedger, NotificationRecord, RecordOutcome};
pub use operation::{
    AccountCredit, AuthScheme, C2PCharge, C2PVoid, ChangeReturn, ClientQuery,
    DispersionBeneficiary, DomiciliationByAccount, DomiciliationByPhone, ImmediateCredit,
    ImmediateDebit, Operation, OtpGenerate, PaymentDispersion, PaymentNotice, PaymentVerify,
    RateQuery, StatusQuery,
};
pub use orchestrator::{
    BankDispatcher, DispatchHeaders, DispatchResponse, OperationOutcome, TransactionOrchestrator,
};
pub use registry::{BankAdapter, BankAdapterRegistry, BankReply, PLATFORM_BANK};
pub use storage::{NotificationStorageConfig, PersistentNotificationLedger};
pub use taxonomy::{classify, OperationStatus, OutcomeCategory, APPROVED_CODE};
