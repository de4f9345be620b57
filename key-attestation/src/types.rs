use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{ACCEPTED_MESSAGE, STATUS_ERROR, STATUS_OK},
    errors::VerificationError,
};

/// Hardware class a key attestation was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SecurityLevel {
    /// Dedicated secure processor, isolated from the main TEE
    StrongBox,
    /// Trusted execution environment of the application processor
    TrustedEnvironment,
    /// No hardware protection
    Software,
    /// The chain carries no recognisable signal
    Unknown,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StrongBox => "StrongBox",
            Self::TrustedEnvironment => "TrustedEnvironment",
            Self::Software => "Software",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Attestation request as sent by the device application.
///
/// Both fields are optional at the wire level so that a missing key is
/// reported as [`VerificationError::InputMissing`] rather than as a JSON
/// error.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AttestationRequest {
    /// Caller supplied nonce
    #[serde(default)]
    pub challenge: Option<String>,

    /// Leaf-first list of base64 encoded DER certificates
    #[serde(default, rename = "certChain")]
    pub cert_chain: Option<Vec<String>>,
}

/// Outcome of verifying one attestation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationVerdict {
    Accepted { security_level: SecurityLevel },
    Rejected { reason: VerificationError },
}

impl VerificationVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

impl From<crate::Result<SecurityLevel>> for VerificationVerdict {
    fn from(result: crate::Result<SecurityLevel>) -> Self {
        match result {
            Ok(security_level) => Self::Accepted { security_level },
            Err(reason) => Self::Rejected { reason },
        }
    }
}

/// JSON body returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VerificationResponse {
    /// Either `"ok"` or `"error"`
    pub status: String,

    /// Human readable outcome
    pub message: String,

    /// Present on accepted attestations only
    #[serde(
        default,
        rename = "securityLevel",
        skip_serializing_if = "Option::is_none"
    )]
    pub security_level: Option<SecurityLevel>,
}

impl VerificationResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
            security_level: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

impl From<&VerificationVerdict> for VerificationResponse {
    fn from(verdict: &VerificationVerdict) -> Self {
        match verdict {
            VerificationVerdict::Accepted { security_level } => Self {
                status: STATUS_OK.to_string(),
                message: ACCEPTED_MESSAGE.to_string(),
                security_level: Some(*security_level),
            },
            VerificationVerdict::Rejected { reason } => Self::error(reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_wire_names() {
        let request: AttestationRequest =
            serde_json::from_str(r#"{"challenge": "MARTA_TEST", "certChain": ["AAAA"]}"#)
                .unwrap();
        assert_eq!(request.challenge.as_deref(), Some("MARTA_TEST"));
        assert_eq!(request.cert_chain, Some(vec!["AAAA".to_string()]));
    }

    #[test]
    fn test_request_missing_fields_are_none() {
        let request: AttestationRequest = serde_json::from_str("{}").unwrap();
        assert!(request.challenge.is_none());
        assert!(request.cert_chain.is_none());
    }

    #[test]
    fn test_accepted_response_json() {
        let verdict = VerificationVerdict::Accepted {
            security_level: SecurityLevel::StrongBox,
        };
        let response = VerificationResponse::from(&verdict);
        assert!(response.is_ok());
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "ok",
                "message": "Attestation verified on server",
                "securityLevel": "StrongBox",
            })
        );
    }

    #[test]
    fn test_rejected_response_has_no_security_level() {
        let verdict = VerificationVerdict::Rejected {
            reason: VerificationError::InputMissing,
        };
        let response = VerificationResponse::from(&verdict);
        assert!(!response.is_ok());
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Missing 'challenge' or 'certChain'");
        assert!(json.get("securityLevel").is_none());
    }
}
