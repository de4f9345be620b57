use std::{net::SocketAddr, time::Duration};

use clap::{Parser, ValueEnum};
use key_attestation::{
    constants::{DEFAULT_MAX_CHAIN_LENGTH, STRONGBOX_SUBJECT_MARKER},
    AttestationExtensionClassifier, AttestationVerifier, ChallengeBinding, PinnedRoots,
    SecurityLevel, SubjectMarkerClassifier,
};
use tracing::info;

use crate::{
    constants::{DEFAULT_HOST, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS},
    errors::Result,
};

/// Strategy used to decide which hardware produced a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassifierKind {
    /// Search every certificate subject for a marker substring
    SubjectMarker,
    /// Read the security level from the leaf key attestation extension
    AttestationExtension,
}

/// Hardware class a chain must be classified as to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RequiredLevel {
    StrongBox,
    TrustedEnvironment,
    Software,
}

impl From<RequiredLevel> for SecurityLevel {
    fn from(level: RequiredLevel) -> Self {
        match level {
            RequiredLevel::StrongBox => SecurityLevel::StrongBox,
            RequiredLevel::TrustedEnvironment => SecurityLevel::TrustedEnvironment,
            RequiredLevel::Software => SecurityLevel::Software,
        }
    }
}

/// Command line and environment configuration of the attestation server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "key-attestation-server",
    version,
    about = "Verifies key attestation certificate chains over HTTP"
)]
pub struct ServerConfig {
    /// Address to bind to
    #[arg(long, env = "KEY_ATTESTATION_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "KEY_ATTESTATION_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// SHA-256 fingerprint (hex) of an accepted root certificate. Any root is
    /// accepted when none is given.
    #[arg(
        long = "trusted-root",
        env = "KEY_ATTESTATION_TRUSTED_ROOTS",
        value_delimiter = ','
    )]
    pub trusted_roots: Vec<String>,

    /// How chains are classified
    #[arg(long, value_enum, default_value_t = ClassifierKind::SubjectMarker)]
    pub classifier: ClassifierKind,

    /// Marker searched for by the subject-marker classifier
    #[arg(long, default_value = STRONGBOX_SUBJECT_MARKER)]
    pub marker: String,

    /// Hardware class required for acceptance
    #[arg(long, value_enum, default_value_t = RequiredLevel::StrongBox)]
    pub required_level: RequiredLevel,

    /// Require the challenge to match the one recorded in the leaf certificate
    #[arg(long)]
    pub bind_challenge: bool,

    /// Longest accepted certificate chain
    #[arg(long, default_value_t = DEFAULT_MAX_CHAIN_LENGTH)]
    pub max_chain_length: usize,

    /// Seconds a single verification may take
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Address string handed to the listener, `host:port`.
    pub fn bind_address(&self) -> String {
        match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }

    /// Builds the verifier described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if a trusted root fingerprint is not a
    /// 32 byte hex string.
    pub fn build_verifier(&self) -> Result<AttestationVerifier> {
        let mut builder = AttestationVerifier::builder()
            .required_level(self.required_level.into())
            .max_chain_length(self.max_chain_length);

        if self.bind_challenge {
            builder = builder.challenge_binding(ChallengeBinding::AttestationExtension);
        }

        if !self.trusted_roots.is_empty() {
            let roots = PinnedRoots::from_hex(&self.trusted_roots)?;
            info!(level = "config", "Pinned {} trusted root(s)", roots.len());
            builder = builder.trust_anchors(roots);
        }

        builder = match self.classifier {
            ClassifierKind::SubjectMarker => {
                builder.classifier(SubjectMarkerClassifier::new(&self.marker))
            }
            ClassifierKind::AttestationExtension => {
                builder.classifier(AttestationExtensionClassifier)
            }
        };

        Ok(builder.build())
    }
}
