use std::{fmt, sync::Arc};

use tracing::{debug, error, info, instrument, warn};

use crate::{
    chain::{verify_chain_signatures, CertificateChain},
    classifier::{HardwareClassifier, SubjectMarkerClassifier},
    constants::DEFAULT_MAX_CHAIN_LENGTH,
    decoder::decode_chain,
    errors::{Result, VerificationError},
    key_description::KeyDescription,
    trust_anchors::{AnyRoot, TrustAnchorStore},
    types::{AttestationRequest, SecurityLevel, VerificationVerdict},
};

/// How the caller supplied challenge relates to the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChallengeBinding {
    /// The challenge must be present and non-empty, nothing more.
    #[default]
    PresenceOnly,
    /// The challenge must equal the `attestationChallenge` recorded in the
    /// leaf certificate's key attestation extension.
    AttestationExtension,
}

/// Immutable acceptance policy of an [`AttestationVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierPolicy {
    /// The only hardware class that is accepted
    pub required_level: SecurityLevel,
    /// Whether the challenge has to be bound to the chain
    pub challenge_binding: ChallengeBinding,
    /// Longest chain accepted before any decoding happens
    pub max_chain_length: usize,
}

impl Default for VerifierPolicy {
    fn default() -> Self {
        Self {
            required_level: SecurityLevel::StrongBox,
            challenge_binding: ChallengeBinding::PresenceOnly,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
        }
    }
}

/// Verifies key attestation chains against a fixed policy.
///
/// The verifier holds no per-request state and can be shared between threads
/// behind an `Arc`.
#[derive(Clone)]
pub struct AttestationVerifier {
    policy: VerifierPolicy,
    trust_anchors: Arc<dyn TrustAnchorStore>,
    classifier: Arc<dyn HardwareClassifier>,
}

impl fmt::Debug for AttestationVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationVerifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for AttestationVerifier {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AttestationVerifier {
    pub fn builder() -> AttestationVerifierBuilder {
        AttestationVerifierBuilder::default()
    }

    pub fn policy(&self) -> &VerifierPolicy {
        &self.policy
    }

    /// Verifies an attestation request received from a device.
    ///
    /// Absent fields are treated as empty ones.
    pub fn verify_request(&self, request: &AttestationRequest) -> VerificationVerdict {
        let challenge = request.challenge.as_deref().unwrap_or_default();
        let chain = request.cert_chain.as_deref().unwrap_or_default();
        self.verify(challenge, chain)
    }

    /// Verifies a challenge and a leaf-first list of base64 encoded DER
    /// certificates, returning the verdict.
    ///
    /// See [`Self::try_verify`] for the stages that are run.
    pub fn verify<S: AsRef<str>>(&self, challenge: &str, encoded_chain: &[S]) -> VerificationVerdict {
        let verdict = VerificationVerdict::from(self.try_verify(challenge, encoded_chain));
        match &verdict {
            VerificationVerdict::Accepted { security_level } => {
                info!(level = "verify_attestation", "{security_level} attestation confirmed")
            }
            VerificationVerdict::Rejected { reason } => {
                warn!(
                    level = "verify_attestation",
                    "Attestation rejected: {reason}"
                )
            }
        }
        verdict
    }

    /// Runs every verification stage, stopping at the first failure.
    ///
    /// The stages are:
    /// 1. the challenge and the chain must both be non-empty, and the chain
    ///    no longer than the policy allows
    /// 2. every certificate is decoded
    /// 3. every parent-signs-child link is verified
    /// 4. the root must be accepted by the trust anchor store
    /// 5. the challenge is matched against the leaf, when the policy binds it
    /// 6. the chain is classified and must reach the required hardware class
    ///
    /// # Arguments
    ///
    /// * `challenge` - Caller supplied nonce
    /// * `encoded_chain` - Base64 encoded DER certificates, leaf first
    ///
    /// # Returns
    ///
    /// The security level of the accepted chain.
    ///
    /// # Errors
    ///
    /// Returns the `VerificationError` of the first stage that failed.
    #[instrument(
        level = "info",
        name = "verify_attestation",
        skip_all,
        fields(chain_length = encoded_chain.len())
    )]
    pub fn try_verify<S: AsRef<str>>(
        &self,
        challenge: &str,
        encoded_chain: &[S],
    ) -> Result<SecurityLevel> {
        if challenge.is_empty() || encoded_chain.is_empty() {
            error!(level = "verify_attestation", "Missing challenge or certificate chain");
            return Err(VerificationError::InputMissing);
        }
        if encoded_chain.len() > self.policy.max_chain_length {
            error!(
                level = "verify_attestation",
                "Certificate chain of length {} exceeds the limit of {}",
                encoded_chain.len(),
                self.policy.max_chain_length
            );
            return Err(VerificationError::ChainTooLong {
                length: encoded_chain.len(),
                max: self.policy.max_chain_length,
            });
        }

        let chain = decode_chain(encoded_chain)?;
        self.verify_chain(challenge, &chain)
    }

    /// Runs the stages that follow decoding on an already decoded chain.
    pub fn verify_chain(&self, challenge: &str, chain: &CertificateChain) -> Result<SecurityLevel> {
        verify_chain_signatures(chain)?;
        info!(level = "verify_attestation", "Attestation chain signatures verified");

        let root = chain.root().ok_or(VerificationError::ChainTooShort {
            length: chain.len(),
        })?;
        if !self.trust_anchors.is_trusted(root) {
            error!(
                level = "verify_attestation",
                root = %root.subject_name(),
                "Attestation chain root is not trusted"
            );
            return Err(VerificationError::UntrustedRoot);
        }

        self.check_challenge(challenge, chain)?;

        let found = self.classifier.classify(chain);
        if found != self.policy.required_level {
            error!(
                level = "verify_attestation",
                "Attestation is not {}-backed, classified as {found}",
                self.policy.required_level
            );
            return Err(VerificationError::NotRequiredHardwareClass {
                required: self.policy.required_level,
                found,
            });
        }
        Ok(found)
    }

    fn check_challenge(&self, challenge: &str, chain: &CertificateChain) -> Result<()> {
        match self.policy.challenge_binding {
            ChallengeBinding::PresenceOnly => {
                debug!(
                    level = "verify_attestation",
                    "Challenge is not bound to the attestation chain"
                );
                Ok(())
            }
            ChallengeBinding::AttestationExtension => {
                let description = chain
                    .leaf()
                    .and_then(|leaf| leaf.attestation_extension())
                    .map(KeyDescription::parse);
                match description {
                    Some(Ok(description))
                        if description.attestation_challenge == challenge.as_bytes() =>
                    {
                        debug!(
                            level = "verify_attestation",
                            "Challenge matches the leaf attestation extension"
                        );
                        Ok(())
                    }
                    Some(Ok(_)) => {
                        error!(
                            level = "verify_attestation",
                            "Challenge does not match the leaf attestation extension"
                        );
                        Err(VerificationError::ChallengeMismatch)
                    }
                    Some(Err(e)) => {
                        error!(
                            level = "verify_attestation",
                            "Cannot read the challenge from the leaf certificate: {e}"
                        );
                        Err(VerificationError::ChallengeMismatch)
                    }
                    None => {
                        error!(
                            level = "verify_attestation",
                            "Leaf certificate has no key attestation extension"
                        );
                        Err(VerificationError::ChallengeMismatch)
                    }
                }
            }
        }
    }
}

/// Builder for [`AttestationVerifier`]. Unset parts keep their defaults:
/// any root is trusted, subjects are searched for the StrongBox marker and
/// the challenge is only required to be present.
#[derive(Default)]
pub struct AttestationVerifierBuilder {
    policy: VerifierPolicy,
    trust_anchors: Option<Arc<dyn TrustAnchorStore>>,
    classifier: Option<Arc<dyn HardwareClassifier>>,
}

impl AttestationVerifierBuilder {
    pub fn policy(mut self, policy: VerifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn required_level(mut self, level: SecurityLevel) -> Self {
        self.policy.required_level = level;
        self
    }

    pub fn challenge_binding(mut self, binding: ChallengeBinding) -> Self {
        self.policy.challenge_binding = binding;
        self
    }

    pub fn max_chain_length(mut self, max: usize) -> Self {
        self.policy.max_chain_length = max;
        self
    }

    pub fn trust_anchors(mut self, store: impl TrustAnchorStore + 'static) -> Self {
        self.trust_anchors = Some(Arc::new(store));
        self
    }

    pub fn classifier(mut self, classifier: impl HardwareClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn build(self) -> AttestationVerifier {
        AttestationVerifier {
            policy: self.policy,
            trust_anchors: self.trust_anchors.unwrap_or_else(|| Arc::new(AnyRoot)),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(SubjectMarkerClassifier::default())),
        }
    }
}
