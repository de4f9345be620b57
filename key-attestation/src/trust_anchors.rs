use std::collections::HashSet;

use tracing::debug;

use crate::{
    constants::FINGERPRINT_LENGTH,
    decoder::Certificate,
    errors::TrustAnchorError,
};

/// Decides whether the final certificate of a chain is an acceptable root.
pub trait TrustAnchorStore: Send + Sync {
    /// Returns `true` when `root` is trusted to anchor attestation chains.
    fn is_trusted(&self, root: &Certificate) -> bool;
}

/// Accepts every root.
///
/// Chains are then only checked for internal consistency, which is the
/// behaviour of deployments that have not configured any root.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyRoot;

impl TrustAnchorStore for AnyRoot {
    fn is_trusted(&self, _root: &Certificate) -> bool {
        true
    }
}

/// Root certificates pinned by the SHA-256 fingerprint of their DER encoding.
#[derive(Debug, Clone, Default)]
pub struct PinnedRoots {
    fingerprints: HashSet<[u8; FINGERPRINT_LENGTH]>,
}

impl PinnedRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the given raw fingerprints.
    pub fn from_fingerprints<I>(fingerprints: I) -> Self
    where
        I: IntoIterator<Item = [u8; FINGERPRINT_LENGTH]>,
    {
        Self {
            fingerprints: fingerprints.into_iter().collect(),
        }
    }

    /// Pins fingerprints given as hex strings, e.g. as printed by
    /// `openssl x509 -fingerprint -sha256`.
    ///
    /// Case is ignored and `:` separators are allowed.
    ///
    /// # Errors
    ///
    /// Returns `TrustAnchorError::InvalidFingerprint` for the first string
    /// that is not 32 bytes of hex.
    pub fn from_hex<I, S>(fingerprints: I) -> Result<Self, TrustAnchorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roots = Self::new();
        for fingerprint in fingerprints {
            roots.add_hex(fingerprint.as_ref())?;
        }
        Ok(roots)
    }

    /// Pins a single fingerprint given as a hex string.
    pub fn add_hex(&mut self, fingerprint: &str) -> Result<(), TrustAnchorError> {
        let cleaned: String = fingerprint
            .trim()
            .chars()
            .filter(|c| *c != ':')
            .collect();
        let bytes = hex::decode(&cleaned)
            .map_err(|_| TrustAnchorError::InvalidFingerprint(fingerprint.to_string()))?;
        let fingerprint: [u8; FINGERPRINT_LENGTH] = bytes
            .try_into()
            .map_err(|_| TrustAnchorError::InvalidFingerprint(fingerprint.to_string()))?;
        self.fingerprints.insert(fingerprint);
        Ok(())
    }

    /// Pins a root certificate.
    pub fn add_certificate(&mut self, root: &Certificate) {
        self.fingerprints.insert(root.fingerprint());
    }

    /// Pins a DER encoded root certificate.
    pub fn add_der(&mut self, der: &[u8]) -> Result<(), TrustAnchorError> {
        let root = Certificate::from_der(der).map_err(TrustAnchorError::InvalidCertificate)?;
        self.add_certificate(&root);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

impl TrustAnchorStore for PinnedRoots {
    fn is_trusted(&self, root: &Certificate) -> bool {
        let fingerprint = root.fingerprint();
        let trusted = self.fingerprints.contains(&fingerprint);
        debug!(
            level = "trust_anchors",
            fingerprint = %hex::encode(fingerprint),
            trusted,
            "Looked up root fingerprint"
        );
        trusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINGERPRINT_HEX: &str =
        "931d8dd0add203ac3d8b4fbde75e115278eefcdceac5b87671a748f32364dfcb";

    #[test]
    fn test_from_hex_accepts_colons_and_case() {
        let colon_separated = FINGERPRINT_HEX
            .to_uppercase()
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap())
            .collect::<Vec<_>>()
            .join(":");
        let roots = PinnedRoots::from_hex([FINGERPRINT_HEX, colon_separated.as_str()]).unwrap();
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn test_from_fingerprints_matches_from_hex() {
        let mut raw = [0u8; FINGERPRINT_LENGTH];
        raw.copy_from_slice(&hex::decode(FINGERPRINT_HEX).unwrap());
        let roots = PinnedRoots::from_fingerprints([raw, raw]);
        assert_eq!(roots.len(), 1);
        assert_eq!(
            roots.fingerprints,
            PinnedRoots::from_hex([FINGERPRINT_HEX]).unwrap().fingerprints
        );
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        let err = PinnedRoots::from_hex(["abcd"]).unwrap_err();
        assert!(matches!(err, TrustAnchorError::InvalidFingerprint(s) if s == "abcd"));
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        let bad = FINGERPRINT_HEX.replace('a', "z");
        assert!(PinnedRoots::from_hex([bad]).is_err());
    }

    #[test]
    fn test_add_der_rejects_garbage() {
        let mut roots = PinnedRoots::new();
        assert!(matches!(
            roots.add_der(&[0x30, 0x03, 0x02, 0x01]),
            Err(TrustAnchorError::InvalidCertificate(_))
        ));
        assert!(roots.is_empty());
    }
}
