use std::fmt;

use thiserror::Error;

use crate::types::SecurityLevel;

pub type Result<T> = std::result::Result<T, VerificationError>;

/// Reasons an attestation request is rejected.
///
/// Every variant is terminal for the request and renders a distinct message,
/// so callers can tell malformed input apart from a chain that does not meet
/// the hardware policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Missing 'challenge' or 'certChain'")]
    InputMissing,
    #[error("Attestation chain too long: got {length} certificates, at most {max} are accepted")]
    ChainTooLong { length: usize, max: usize },
    #[error("Invalid certificate chain: cert {index} could not be decoded ({kind})")]
    DecodeError { index: usize, kind: DecodeErrorKind },
    #[error("Attestation chain too short: at least 2 certificates are required, got {length}")]
    ChainTooShort { length: usize },
    #[error("Attestation chain verification failed: signature verification failed for cert {index}")]
    ChainSignatureInvalid { index: usize },
    #[error("Attestation chain is not rooted in a trusted certificate")]
    UntrustedRoot,
    #[error("Attestation challenge does not match the challenge bound in the leaf certificate")]
    ChallengeMismatch,
    #[error("Attestation is not {required}-backed (classified as {found})")]
    NotRequiredHardwareClass {
        required: SecurityLevel,
        found: SecurityLevel,
    },
}

/// Coarse classification of a certificate decoding failure.
///
/// Carries no input bytes, only the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    InvalidBase64,
    InvalidDer,
    TrailingData,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBase64 => write!(f, "base64 decode failed"),
            Self::InvalidDer => write!(f, "DER decode failed"),
            Self::TrailingData => write!(f, "trailing data after certificate"),
        }
    }
}

/// Errors raised while building a trust anchor set from configuration.
#[derive(Debug, Error)]
pub enum TrustAnchorError {
    #[error("Invalid root fingerprint `{0}`: expected 64 hex characters")]
    InvalidFingerprint(String),
    #[error("Invalid root certificate: {0}")]
    InvalidCertificate(DecodeErrorKind),
}

/// Errors raised while parsing a key attestation extension.
#[derive(Debug, Error)]
pub enum KeyDescriptionError {
    #[error("Failed to parse key description: {0}")]
    Asn1(String),
    #[error("Key description is missing field `{0}`")]
    MissingField(&'static str),
    #[error("Unknown security level value {0}")]
    UnknownSecurityLevel(u32),
}
