use serde::{Deserialize, Serialize};

/// Interbank response code meaning "approved".
pub const APPROVED_CODE: &str = "00";

/// Semantic outcome category derived from a wire response code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    Approved,
    Retryable,
    Rejected,
    Unauthorized,
    Unknown,
}

impl OutcomeCategory {
    /// Whether the caller may safely re-submit the same operation.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable)
    }
}

/// Operation-status codes returned by asynchronous bank flows.
///
/// This is a separate namespace from the two-digit interbank codes and must
/// never be classified through the interbank table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// "ACCP": operation accepted and settled.
    Accepted,
    /// "AC00": operation received, final state pending a status query.
    Pending,
    /// "202": message received by the platform.
    Received,
}

impl OperationStatus {
    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "ACCP" => Some(Self::Accepted),
            "AC00" => Some(Self::Pending),
            "202" => Some(Self::Received),
            _ => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Accepted => "ACCP",
            Self::Pending => "AC00",
            Self::Received => "202",
        }
    }
}

/// One row of the interbank classification table.
struct CodeClass {
    code: &'static str,
    category: OutcomeCategory,
    message: &'static str,
}

/// Interbank code table. Adding a code is a new row, not a new branch.
const INTERBANK_CODES: &[CodeClass] = &[
    CodeClass {
        code: "00",
        category: OutcomeCategory::Approved,
        message: "TRANSACCION EXITOSA",
    },
    CodeClass {
        code: "01",
        category: OutcomeCategory::Rejected,
        message: "TRANSACCION RECHAZADA POR EL BANCO",
    },
    CodeClass {
        code: "05",
        category: OutcomeCategory::Retryable,
        message: "TRANSACCION NO PROCESADA, REINTENTE",
    },
    CodeClass {
        code: "12",
        category: OutcomeCategory::Rejected,
        message: "TRANSACCION INVALIDA",
    },
    CodeClass {
        code: "13",
        category: OutcomeCategory::Rejected,
        message: "MONTO INVALIDO",
    },
    CodeClass {
        code: "14",
        category: OutcomeCategory::Rejected,
        message: "CUENTA O TELEFONO INVALIDO",
    },
    CodeClass {
        code: "30",
        category: OutcomeCategory::Rejected,
        message: "ERROR DE FORMATO",
    },
    CodeClass {
        code: "55",
        category: OutcomeCategory::Rejected,
        message: "CLAVE DE AUTORIZACION INVALIDA",
    },
    CodeClass {
        code: "56",
        category: OutcomeCategory::Rejected,
        message: "CLIENTE NO AFILIADO",
    },
    CodeClass {
        code: "80",
        category: OutcomeCategory::Rejected,
        message: "TRANSACCION DUPLICADA",
    },
    CodeClass {
        code: "87",
        category: OutcomeCategory::Retryable,
        message: "BANCO EMISOR FUERA DE LINEA",
    },
    CodeClass {
        code: "90",
        category: OutcomeCategory::Retryable,
        message: "SISTEMA EN PROCESO DE CIERRE",
    },
    CodeClass {
        code: "91",
        category: OutcomeCategory::Retryable,
        message: "BANCO NO DISPONIBLE",
    },
];

/// Classify a verbatim interbank response code.
///
/// Unrecognized codes are `Unknown` and must be treated as rejections,
/// never as approvals.
pub fn classify(code: &str) -> (OutcomeCategory, &'static str) {
    INTERBANK_CODES
        .iter()
        .find(|row| row.code == code)
        .map(|row| (row.category, row.message))
        .unwrap_or((OutcomeCategory::Unknown, "CODIGO DE RESPUESTA NO RECONOCIDO"))
}

/// Documented interbank codes, used to assert table completeness in tests.
pub fn documented_codes() -> impl Iterator<Item = &'static str> {
    INTERBANK_CODES.iter().map(|row| row.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_code_classifies_non_unknown() {
        for code in documented_codes() {
            let (category, _) = classify(code);
            assert_ne!(category, OutcomeCategory::Unknown, "code {code}");
        }
    }

    #[test]
    fn approved_code_is_exactly_00() {
        assert_eq!(classify("00").0, OutcomeCategory::Approved);
        for code in documented_codes().filter(|c| *c != "00") {
            assert_ne!(classify(code).0, OutcomeCategory::Approved, "code {code}");
        }
    }

    #[test]
    fn unrecognized_code_is_unknown_never_approved() {
        let (category, _) = classify("77");
        assert_eq!(category, OutcomeCategory::Unknown);
    }

    #[test]
    fn retryable_codes_match_bank_documentation() {
        for code in ["05", "87", "90", "91"] {
            assert!(classify(code).0.is_retryable(), "code {code}");
        }
        for code in ["01", "12", "13", "14", "30", "55", "56", "80"] {
            assert_eq!(classify(code).0, OutcomeCategory::Rejected, "code {code}");
        }
    }

    #[test]
    fn status_codes_are_a_separate_namespace() {
        assert_eq!(OperationStatus::from_wire("ACCP"), Some(OperationStatus::Accepted));
        assert_eq!(OperationStatus::from_wire("AC00"), Some(OperationStatus::Pending));
        assert_eq!(OperationStatus::from_wire("202"), Some(OperationStatus::Received));
        assert_eq!(OperationStatus::from_wire("00"), None);
        // "00" through the interbank table, "ACCP" through the status one.
        assert_eq!(classify("ACCP").0, OutcomeCategory::Unknown);
    }
}
