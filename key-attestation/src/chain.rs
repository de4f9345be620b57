use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::{
    constants::MIN_CHAIN_LENGTH,
    decoder::{Certificate, SignatureAlgorithm},
    errors::{Result, VerificationError},
};

/// Leaf-first sequence of decoded certificates.
///
/// Index 0 is the device generated attestation key, every following element
/// is the issuer of the one before it and the last element is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
}

impl CertificateChain {
    pub fn new(certificates: Vec<Certificate>) -> Self {
        Self { certificates }
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    pub fn root(&self) -> Option<&Certificate> {
        self.certificates.last()
    }

    pub fn get(&self, index: usize) -> Option<&Certificate> {
        self.certificates.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.certificates.iter()
    }
}

impl From<Vec<Certificate>> for CertificateChain {
    fn from(certificates: Vec<Certificate>) -> Self {
        Self::new(certificates)
    }
}

impl<'a> IntoIterator for &'a CertificateChain {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Why a single parent-signs-child link was refused. Only used for logging,
/// callers see [`VerificationError::ChainSignatureInvalid`].
#[derive(Debug, Error)]
enum LinkError {
    #[error("unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(SignatureAlgorithm),
    #[error("signature algorithm {outer} does not match the signed algorithm {inner}")]
    AlgorithmMismatch { outer: String, inner: String },
    #[error("failed to re-read certificate: {0}")]
    Reparse(String),
    #[error("{0}")]
    Signature(x509_parser::error::X509Error),
}

/// Verifies every parent-signs-child link of an attestation chain.
///
/// For each adjacent pair `(i, i + 1)`, certificate `i`'s signature over its
/// signed payload must verify with certificate `i + 1`'s public key, under
/// the signature algorithm certificate `i` declares for itself. Links are
/// checked leaf first and the first failure ends the verification.
///
/// The root is not checked against any trust anchor here.
///
/// # Arguments
///
/// * `chain` - The decoded, leaf-first certificate chain
///
/// # Errors
///
/// * `VerificationError::ChainTooShort` if the chain has fewer than two
///   certificates, in which case no cryptographic work is attempted
/// * `VerificationError::ChainSignatureInvalid` with the index of the first
///   certificate whose signature could not be verified by its issuer,
///   including when the issuer's key material is unusable
#[instrument(level = "debug", skip_all, fields(length = chain.len()))]
pub fn verify_chain_signatures(chain: &CertificateChain) -> Result<()> {
    if chain.len() < MIN_CHAIN_LENGTH {
        error!(
            level = "verify_chain",
            "Chain of length {} cannot be verified",
            chain.len()
        );
        return Err(VerificationError::ChainTooShort {
            length: chain.len(),
        });
    }
    for (index, pair) in chain.certificates.windows(2).enumerate() {
        let (child, issuer) = (&pair[0], &pair[1]);
        if let Err(e) = verify_link(child, issuer) {
            error!(
                level = "verify_chain",
                index,
                subject = %child.subject_name(),
                "Signature verification failed for cert {index}: {e}"
            );
            return Err(VerificationError::ChainSignatureInvalid { index });
        }
        debug!(
            level = "verify_chain",
            "Signature of cert {index} verified with issuer cert {}",
            index + 1
        );
    }
    Ok(())
}

fn verify_link(child: &Certificate, issuer: &Certificate) -> std::result::Result<(), LinkError> {
    if !child.signature_algorithm().is_known() {
        return Err(LinkError::UnsupportedAlgorithm(
            child.signature_algorithm().clone(),
        ));
    }
    let child_x509 = child.x509().map_err(LinkError::Reparse)?;
    let issuer_x509 = issuer.x509().map_err(LinkError::Reparse)?;

    let outer = &child_x509.signature_algorithm.algorithm;
    let inner = &child_x509.tbs_certificate.signature.algorithm;
    if outer != inner {
        return Err(LinkError::AlgorithmMismatch {
            outer: outer.to_id_string(),
            inner: inner.to_id_string(),
        });
    }

    child_x509
        .verify_signature(Some(issuer_x509.public_key()))
        .map_err(LinkError::Signature)
}
