//! Key attestation chain verification
//!
//! This crate verifies the certificate chain a mobile device's secure key
//! store produces for a freshly generated key. It checks that every
//! certificate is signed by the next one up to the root, and that the key was
//! generated inside a dedicated secure processor (StrongBox) rather than the
//! general trusted execution environment.
//!
//! # Example
//!
//! ```rust,ignore
//! use key_attestation::{AttestationVerifier, VerificationResponse};
//!
//! let verifier = AttestationVerifier::default();
//! let verdict = verifier.verify("MARTA_TEST", &cert_chain_b64);
//! let response = VerificationResponse::from(&verdict);
//! ```

pub mod chain;
pub mod classifier;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod key_description;
pub mod trust_anchors;
pub mod types;
pub mod verifier;

pub use chain::{verify_chain_signatures, CertificateChain};
pub use classifier::{AttestationExtensionClassifier, HardwareClassifier, SubjectMarkerClassifier};
pub use decoder::{decode_certificate, decode_chain, Certificate, DistinguishedName, SignatureAlgorithm};
pub use errors::{DecodeErrorKind, Result, TrustAnchorError, VerificationError};
pub use key_description::KeyDescription;
pub use trust_anchors::{AnyRoot, PinnedRoots, TrustAnchorStore};
pub use types::{AttestationRequest, SecurityLevel, VerificationResponse, VerificationVerdict};
pub use verifier::{AttestationVerifier, AttestationVerifierBuilder, ChallengeBinding, VerifierPolicy};
