use tracing::{debug, warn};

use crate::{
    chain::CertificateChain, constants::STRONGBOX_SUBJECT_MARKER,
    key_description::KeyDescription, types::SecurityLevel,
};

/// Determines which class of hardware produced an attestation chain.
///
/// Implementations only inspect chain content, signature links are verified
/// before a classifier is consulted.
pub trait HardwareClassifier: Send + Sync {
    fn classify(&self, chain: &CertificateChain) -> SecurityLevel;
}

/// Looks for a marker substring in the subject of every certificate.
///
/// Any subject containing the marker classifies the chain as
/// [`SecurityLevel::StrongBox`]; otherwise the level is
/// [`SecurityLevel::Unknown`]. Subject names are free text, so this only
/// carries weight together with a pinned root.
#[derive(Debug, Clone)]
pub struct SubjectMarkerClassifier {
    marker: String,
}

impl SubjectMarkerClassifier {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Default for SubjectMarkerClassifier {
    fn default() -> Self {
        Self::new(STRONGBOX_SUBJECT_MARKER)
    }
}

impl HardwareClassifier for SubjectMarkerClassifier {
    fn classify(&self, chain: &CertificateChain) -> SecurityLevel {
        for (index, certificate) in chain.iter().enumerate() {
            let subject = certificate.subject_name().to_string();
            debug!(level = "classifier", "Subject[{index}]: {subject}");
            if subject.contains(&self.marker) {
                debug!(level = "classifier", "{} marker found in subject[{index}]", self.marker);
                return SecurityLevel::StrongBox;
            }
        }
        SecurityLevel::Unknown
    }
}

/// Reads the attestation security level recorded in the leaf certificate's
/// key attestation extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttestationExtensionClassifier;

impl HardwareClassifier for AttestationExtensionClassifier {
    fn classify(&self, chain: &CertificateChain) -> SecurityLevel {
        let Some(extension) = chain.leaf().and_then(|leaf| leaf.attestation_extension()) else {
            debug!(level = "classifier", "Leaf certificate has no key attestation extension");
            return SecurityLevel::Unknown;
        };
        match KeyDescription::parse(extension) {
            Ok(description) => {
                debug!(
                    level = "classifier",
                    attestation_version = description.attestation_version,
                    "Attestation security level: {}", description.attestation_security_level
                );
                description.attestation_security_level
            }
            Err(e) => {
                warn!(level = "classifier", "Malformed key attestation extension: {e}");
                SecurityLevel::Unknown
            }
        }
    }
}
