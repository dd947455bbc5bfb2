//! Operation variants of the R4 Conecta protocol.
//!
//! Each variant carries exactly the fields relevant to its canonical message
//! and business validation. Field names are serialized verbatim as the wire
//! names the platform documents, including their casing. Monetary amounts are
//! decimal strings and are passed through byte-for-byte; they are never
//! reformatted between reception and signing.

use serde::{Deserialize, Serialize};

/// How a request for this operation authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// HMAC-SHA256 over the operation's canonical message.
    CanonicalHmac,
    /// Static commerce-scoped token presented by the platform on inbound
    /// lookups that carry no canonical message.
    CommerceToken,
}

/// Exchange-rate query against the central bank table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateQuery {
    #[serde(rename = "Moneda")]
    pub moneda: String,
    #[serde(rename = "Fechavalor")]
    pub fecha_valor: String,
}

/// Inbound payment-intent lookup: the platform asks whether a client may pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientQuery {
    #[serde(rename = "IdCliente")]
    pub id_cliente: String,
    #[serde(rename = "Monto", default)]
    pub monto: Option<String>,
    #[serde(rename = "TelefonoComercio", default)]
    pub telefono_comercio: Option<String>,
}

/// Inbound mobile-payment notification pushed by the issuing bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotice {
    #[serde(rename = "IdComercio")]
    pub id_comercio: String,
    #[serde(rename = "TelefonoComercio")]
    pub telefono_comercio: String,
    #[serde(rename = "TelefonoEmisor")]
    pub telefono_emisor: String,
    #[serde(rename = "Concepto", default)]
    pub concepto: String,
    #[serde(rename = "BancoEmisor")]
    pub banco_emisor: String,
    #[serde(rename = "Monto")]
    pub monto: String,
    #[serde(rename = "FechaHora")]
    pub fecha_hora: String,
    #[serde(rename = "Referencia")]
    pub referencia: String,
    #[serde(rename = "CodigoRed")]
    pub codigo_red: String,
}

/// One beneficiary inside a payment dispersion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispersionBeneficiary {
    pub nombres: String,
    pub documento: String,
    pub destino: String,
    #[serde(rename = "montoPart")]
    pub monto_part: String,
}

/// Split of one total amount across several beneficiaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDispersion {
    pub monto: String,
    /// MM/DD/YYYY per platform documentation.
    pub fecha: String,
    #[serde(rename = "Referencia")]
    pub referencia: String,
    pub personas: Vec<DispersionBeneficiary>,
}

/// Mobile-payment change return to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeReturn {
    #[serde(rename = "TelefonoDestino")]
    pub telefono_destino: String,
    #[serde(rename = "Cedula")]
    pub cedula: String,
    #[serde(rename = "Banco")]
    pub banco: String,
    #[serde(rename = "Monto")]
    pub monto: String,
    #[serde(rename = "Concepto", skip_serializing_if = "Option::is_none")]
    pub concepto: Option<String>,
    #[serde(rename = "Ip", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Request the bank to issue an OTP to the client's phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpGenerate {
    #[serde(rename = "Banco")]
    pub banco: String,
    #[serde(rename = "Monto")]
    pub monto: String,
    #[serde(rename = "Telefono")]
    pub telefono: String,
    #[serde(rename = "Cedula")]
    pub cedula: String,
}

/// OTP-authorized debit against the client's account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateDebit {
    #[serde(rename = "Banco")]
    pub banco: String,
    #[serde(rename = "Monto")]
    pub monto: String,
    #[serde(rename = "Telefono")]
    pub telefono: String,
    #[serde(rename = "Cedula")]
    pub cedula: String,
    #[serde(rename = "Nombre")]
    pub nombre: String,
    #[serde(rename = "OTP")]
    pub otp: String,
    #[serde(rename = "Concepto")]
    pub concepto: String,
}

/// Instant credit to the client's account via their mobile-payment phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateCredit {
    #[serde(rename = "Banco")]
    pub banco: String,
    #[serde(rename = "Cedula")]
    pub cedula: String,
    #[serde(rename = "Telefono")]
    pub telefono: String,
    #[serde(rename = "Monto")]
    pub monto: String,
    #[serde(rename = "Concepto")]
    pub concepto: String,
}

/// Instant credit addressed by full account number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCredit {
    #[serde(rename = "Cedula")]
    pub cedula: String,
    #[serde(rename = "Cuenta")]
    pub cuenta: String,
    #[serde(rename = "Monto")]
    pub monto: String,
    #[serde(rename = "Concepto")]
    pub concepto: String,
}

/// Recurring-debit affiliation keyed by account number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomiciliationByAccount {
    #[serde(rename = "docId")]
    pub doc_id: String,
    pub nombre: String,
    pub cuenta: String,
    pub monto: String,
    pub concepto: String,
}

/// Recurring-debit affiliation keyed by mobile-payment phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomiciliationByPhone {
    #[serde(rename = "docId")]
    pub doc_id: String,
    pub telefono: String,
    pub nombre: String,
    pub banco: String,
    pub monto: String,
    pub concepto: String,
}

/// Point-of-sale charge authorized by the client's OTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2PCharge {
    #[serde(rename = "TelefonoDestino")]
    pub telefono_destino: String,
    #[serde(rename = "Cedula")]
    pub cedula: String,
    #[serde(rename = "Concepto")]
    pub concepto: String,
    #[serde(rename = "Banco")]
    pub banco: String,
    #[serde(rename = "Ip")]
    pub ip: String,
    #[serde(rename = "Monto")]
    pub monto: String,
    #[serde(rename = "Otp")]
    pub otp: String,
}

/// Reversal of a recent point-of-sale charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2PVoid {
    #[serde(rename = "Cedula")]
    pub cedula: String,
    #[serde(rename = "Banco")]
    pub banco: String,
    #[serde(rename = "Referencia")]
    pub referencia: String,
}

/// Status lookup for an operation previously answered with "AC00".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "Id")]
    pub id: String,
}

/// Cross-check of a stored notification by its unique Reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentVerify {
    #[serde(rename = "Referencia")]
    pub referencia: String,
    #[serde(rename = "Telefono", default)]
    pub telefono: Option<String>,
    #[serde(rename = "Banco", default)]
    pub banco: Option<String>,
    #[serde(rename = "Monto", default)]
    pub monto: Option<String>,
    #[serde(rename = "FechaHora", default)]
    pub fecha_hora: Option<String>,
}

/// Tagged union over every protocol operation.
///
/// Created per request, never persisted, discarded once the call completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    RateQuery(RateQuery),
    ClientQuery(ClientQuery),
    PaymentNotify(PaymentNotice),
    PaymentDispersion(PaymentDispersion),
    ChangeReturn(ChangeReturn),
    OtpGenerate(OtpGenerate),
    ImmediateDebit(ImmediateDebit),
    ImmediateCredit(ImmediateCredit),
    AccountCredit(AccountCredit),
    DomiciliationByAccount(DomiciliationByAccount),
    DomiciliationByPhone(DomiciliationByPhone),
    C2PCharge(C2PCharge),
    C2PVoid(C2PVoid),
    StatusQuery(StatusQuery),
    PaymentVerify(PaymentVerify),
}

impl Operation {
    /// Protocol name of the operation, matching its endpoint segment.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RateQuery(_) => "MBbcv",
            Self::ClientQuery(_) => "R4consulta",
            Self::PaymentNotify(_) => "R4notifica",
            Self::PaymentDispersion(_) => "R4pagos",
            Self::ChangeReturn(_) => "MBvuelto",
            Self::OtpGenerate(_) => "GenerarOtp",
            Self::ImmediateDebit(_) => "DebitoInmediato",
            Self::ImmediateCredit(_) => "CreditoInmediato",
            Self::AccountCredit(_) => "CICuentas",
            Self::DomiciliationByAccount(_) => "DomiciliacionCNTA",
            Self::DomiciliationByPhone(_) => "DomiciliacionCELE",
            Self::C2PCharge(_) => "MBc2p",
            Self::C2PVoid(_) => "MBanulacionC2P",
            Self::StatusQuery(_) => "ConsultarOperaciones",
            Self::PaymentVerify(_) => "VerificoPago",
        }
    }

    /// Platform endpoint path for the operation.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::RateQuery(_) => "/MBbcv",
            Self::ClientQuery(_) => "/R4consulta",
            Self::PaymentNotify(_) => "/R4notifica",
            Self::PaymentDispersion(_) => "/R4pagos",
            Self::ChangeReturn(_) => "/MBvuelto",
            Self::OtpGenerate(_) => "/GenerarOtp",
            Self::ImmediateDebit(_) => "/DebitoInmediato",
            Self::ImmediateCredit(_) => "/CreditoInmediato",
            Self::AccountCredit(_) => "/CICuentas",
            Self::DomiciliationByAccount(_) => "/TransferenciaOnline/DomiciliacionCNTA",
            Self::DomiciliationByPhone(_) => "/TransferenciaOnline/DomiciliacionCELE",
            Self::C2PCharge(_) => "/MBc2p",
            Self::C2PVoid(_) => "/MBanulacionC2P",
            Self::StatusQuery(_) => "/ConsultarOperaciones",
            Self::PaymentVerify(_) => "/VerificoPago",
        }
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            Self::ClientQuery(_) => AuthScheme::CommerceToken,
            _ => AuthScheme::CanonicalHmac,
        }
    }

    /// Issuing-bank code the operation addresses, when it carries one.
    /// Operations without a bank field route to the platform itself.
    pub fn bank_code(&self) -> Option<&str> {
        match self {
            Self::ChangeReturn(op) => Some(&op.banco),
            Self::OtpGenerate(op) => Some(&op.banco),
            Self::ImmediateDebit(op) => Some(&op.banco),
            Self::ImmediateCredit(op) => Some(&op.banco),
            Self::DomiciliationByPhone(op) => Some(&op.banco),
            Self::C2PCharge(op) => Some(&op.banco),
            Self::C2PVoid(op) => Some(&op.banco),
            Self::PaymentNotify(op) => Some(&op.banco_emisor),
            _ => None,
        }
    }

    /// Ordered (name, value) pairs whose verbatim concatenation forms the
    /// canonical message. Order is fixed per variant by the protocol, never
    /// sorted and never derived from JSON key order. `None` for the
    /// token-authenticated client lookup.
    pub fn canonical_fields(&self) -> Option<Vec<(&'static str, &str)>> {
        let fields: Vec<(&'static str, &str)> = match self {
            Self::RateQuery(op) => vec![
                ("Fechavalor", op.fecha_valor.as_str()),
                ("Moneda", op.moneda.as_str()),
            ],
            Self::ClientQuery(_) => return None,
            Self::PaymentNotify(op) => vec![
                ("IdComercio", op.id_comercio.as_str()),
                ("TelefonoComercio", op.telefono_comercio.as_str()),
                ("TelefonoEmisor", op.telefono_emisor.as_str()),
                ("BancoEmisor", op.banco_emisor.as_str()),
                ("Monto", op.monto.as_str()),
                ("FechaHora", op.fecha_hora.as_str()),
                ("Referencia", op.referencia.as_str()),
                ("CodigoRed", op.codigo_red.as_str()),
            ],
            Self::PaymentDispersion(op) => vec![
                ("monto", op.monto.as_str()),
                ("fecha", op.fecha.as_str()),
            ],
            Self::ChangeReturn(op) => vec![
                ("TelefonoDestino", op.telefono_destino.as_str()),
                ("Monto", op.monto.as_str()),
                ("Banco", op.banco.as_str()),
                ("Cedula", op.cedula.as_str()),
            ],
            Self::OtpGenerate(op) => vec![
                ("Banco", op.banco.as_str()),
                ("Monto", op.monto.as_str()),
                ("Telefono", op.telefono.as_str()),
                ("Cedula", op.cedula.as_str()),
            ],
            Self::ImmediateDebit(op) => vec![
                ("Banco", op.banco.as_str()),
                ("Cedula", op.cedula.as_str()),
                ("Telefono", op.telefono.as_str()),
                ("Monto", op.monto.as_str()),
                ("OTP", op.otp.as_str()),
            ],
            Self::ImmediateCredit(op) => vec![
                ("Banco", op.banco.as_str()),
                ("Cedula", op.cedula.as_str()),
                ("Telefono", op.telefono.as_str()),
                ("Monto", op.monto.as_str()),
            ],
            Self::AccountCredit(op) => vec![
                ("Cedula", op.cedula.as_str()),
                ("Cuenta", op.cuenta.as_str()),
                ("Monto", op.monto.as_str()),
            ],
            Self::DomiciliationByAccount(op) => vec![("cuenta", op.cuenta.as_str())],
            Self::DomiciliationByPhone(op) => vec![("telefono", op.telefono.as_str())],
            Self::C2PCharge(op) => vec![
                ("TelefonoDestino", op.telefono_destino.as_str()),
                ("Monto", op.monto.as_str()),
                ("Banco", op.banco.as_str()),
                ("Cedula", op.cedula.as_str()),
            ],
            Self::C2PVoid(op) => vec![("Banco", op.banco.as_str())],
            Self::StatusQuery(op) => vec![("Id", op.id.as_str())],
            Self::PaymentVerify(op) => vec![("Referencia", op.referencia.as_str())],
        };
        Some(fields)
    }
}
