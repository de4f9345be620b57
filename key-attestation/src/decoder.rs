use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::digest;
use tracing::{debug, instrument};
use x509_parser::{
    objects::{oid2abbrev, oid_registry},
    prelude::{FromDer, X509Certificate},
    x509::X509Name,
};

use crate::{
    chain::CertificateChain,
    constants::{FINGERPRINT_LENGTH, KEY_ATTESTATION_EXTENSION_OID},
    errors::{DecodeErrorKind, Result, VerificationError},
};

/// A single attribute of a distinguished name, such as `CN=Android Keystore Key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAttribute {
    /// Dotted attribute type OID
    pub oid: String,
    /// Conventional short name (`CN`, `O`, `title`, ...) when the OID is known
    pub short_name: Option<String>,
    /// Attribute value. Values that are not strings are kept as `#` followed
    /// by the hex encoding of their content bytes.
    pub value: String,
}

/// Ordered sequence of relative distinguished names, as encoded in the
/// certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    rdns: Vec<Vec<NameAttribute>>,
}

impl DistinguishedName {
    fn from_x509(name: &X509Name<'_>) -> Self {
        let registry = oid_registry();
        let rdns = name
            .iter()
            .map(|rdn| {
                rdn.iter()
                    .map(|attr| {
                        let oid = attr.attr_type();
                        let value = match attr.as_str() {
                            Ok(s) => s.to_string(),
                            Err(_) => format!("#{}", hex::encode(attr.attr_value().as_bytes())),
                        };
                        NameAttribute {
                            oid: oid.to_id_string(),
                            short_name: oid2abbrev(oid, registry).ok().map(str::to_string),
                            value,
                        }
                    })
                    .collect()
            })
            .collect();
        Self { rdns }
    }

    /// Attributes in encoding order.
    pub fn attributes(&self) -> impl Iterator<Item = &NameAttribute> {
        self.rdns.iter().flatten()
    }

    /// Value of the first attribute whose type matches `oid`.
    pub fn find(&self, oid: &str) -> Option<&str> {
        self.attributes()
            .find(|attr| attr.oid == oid)
            .map(|attr| attr.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }
}

/// Renders the name as an RFC 4514 string: last RDN first, RDNs separated by
/// `,` and multi-valued RDNs joined with `+`.
impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            for (j, attr) in rdn.iter().enumerate() {
                if j > 0 {
                    f.write_str("+")?;
                }
                let key = attr.short_name.as_deref().unwrap_or(&attr.oid);
                write!(f, "{key}={}", escape_rfc4514(&attr.value))?;
            }
        }
        Ok(())
    }
}

fn escape_rfc4514(value: &str) -> String {
    if value.starts_with('#') && value.len() > 1 && value[1..].bytes().all(|b| b.is_ascii_hexdigit())
    {
        return value.to_string();
    }
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Signature scheme declared by a certificate for its own signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    RsaPkcs1Sha1,
    RsaPkcs1Sha256,
    RsaPkcs1Sha384,
    RsaPkcs1Sha512,
    RsaPss,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    Ed25519,
    Unknown(String),
}

impl SignatureAlgorithm {
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            "1.2.840.113549.1.1.5" => Self::RsaPkcs1Sha1,
            "1.2.840.113549.1.1.11" => Self::RsaPkcs1Sha256,
            "1.2.840.113549.1.1.12" => Self::RsaPkcs1Sha384,
            "1.2.840.113549.1.1.13" => Self::RsaPkcs1Sha512,
            "1.2.840.113549.1.1.10" => Self::RsaPss,
            "1.2.840.10045.4.3.2" => Self::EcdsaSha256,
            "1.2.840.10045.4.3.3" => Self::EcdsaSha384,
            "1.2.840.10045.4.3.4" => Self::EcdsaSha512,
            "1.3.101.112" => Self::Ed25519,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaPkcs1Sha1 => f.write_str("sha1WithRSAEncryption"),
            Self::RsaPkcs1Sha256 => f.write_str("sha256WithRSAEncryption"),
            Self::RsaPkcs1Sha384 => f.write_str("sha384WithRSAEncryption"),
            Self::RsaPkcs1Sha512 => f.write_str("sha512WithRSAEncryption"),
            Self::RsaPss => f.write_str("rsassaPss"),
            Self::EcdsaSha256 => f.write_str("ecdsa-with-SHA256"),
            Self::EcdsaSha384 => f.write_str("ecdsa-with-SHA384"),
            Self::EcdsaSha512 => f.write_str("ecdsa-with-SHA512"),
            Self::Ed25519 => f.write_str("Ed25519"),
            Self::Unknown(oid) => write!(f, "unknown ({oid})"),
        }
    }
}

/// A decoded X.509 certificate.
///
/// All fields are owned copies taken at decoding time; the value is never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject_name: DistinguishedName,
    issuer_name: DistinguishedName,
    signed_payload: Vec<u8>,
    signature: Vec<u8>,
    signature_algorithm: SignatureAlgorithm,
    public_key: Vec<u8>,
    attestation_extension: Option<Vec<u8>>,
}

impl Certificate {
    /// Decodes a single DER encoded certificate.
    ///
    /// Only the structure is checked: validity dates, key usage and
    /// signatures are left to the chain verifier.
    ///
    /// # Errors
    ///
    /// * `DecodeErrorKind::InvalidDer` if the bytes are not a certificate
    /// * `DecodeErrorKind::TrailingData` if bytes remain after the certificate
    pub fn from_der(der: &[u8]) -> std::result::Result<Self, DecodeErrorKind> {
        let (rem, x509) = X509Certificate::from_der(der).map_err(|e| {
            debug!(level = "decoder", "Failed to parse certificate DER: {e}");
            DecodeErrorKind::InvalidDer
        })?;
        if !rem.is_empty() {
            debug!(
                level = "decoder",
                "{} trailing bytes after certificate",
                rem.len()
            );
            return Err(DecodeErrorKind::TrailingData);
        }
        let attestation_extension = x509
            .extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == KEY_ATTESTATION_EXTENSION_OID)
            .map(|ext| ext.value.to_vec());

        Ok(Self {
            der: der.to_vec(),
            subject_name: DistinguishedName::from_x509(x509.subject()),
            issuer_name: DistinguishedName::from_x509(x509.issuer()),
            signed_payload: AsRef::<[u8]>::as_ref(&x509.tbs_certificate).to_vec(),
            signature: x509.signature_value.data.to_vec(),
            signature_algorithm: SignatureAlgorithm::from_oid(
                &x509.signature_algorithm.algorithm.to_id_string(),
            ),
            public_key: x509.public_key().raw.to_vec(),
            attestation_extension,
        })
    }

    pub fn subject_name(&self) -> &DistinguishedName {
        &self.subject_name
    }

    pub fn issuer_name(&self) -> &DistinguishedName {
        &self.issuer_name
    }

    /// The exact "to-be-signed" bytes covered by [`Self::signature`].
    pub fn signed_payload(&self) -> &[u8] {
        &self.signed_payload
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn signature_algorithm(&self) -> &SignatureAlgorithm {
        &self.signature_algorithm
    }

    /// DER encoded SubjectPublicKeyInfo of the certified key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Raw value of the key attestation extension, if the certificate has one.
    pub fn attestation_extension(&self) -> Option<&[u8]> {
        self.attestation_extension.as_deref()
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 digest of the DER encoding.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LENGTH] {
        let hash = digest::digest(&digest::SHA256, &self.der);
        let mut fingerprint = [0u8; FINGERPRINT_LENGTH];
        fingerprint.copy_from_slice(hash.as_ref());
        fingerprint
    }

    /// Borrowing x509-parser view of this certificate.
    ///
    /// The DER was accepted once already, so this only fails if the
    /// certificate was built from bytes that x509-parser later rejects.
    pub(crate) fn x509(&self) -> std::result::Result<X509Certificate<'_>, String> {
        X509Certificate::from_der(&self.der)
            .map(|(_, x509)| x509)
            .map_err(|e| e.to_string())
    }
}

/// Decodes one base64 encoded DER certificate.
///
/// ASCII whitespace in `encoded` is ignored so that line-wrapped encoders are
/// accepted; any other character outside the standard alphabet is an error.
pub fn decode_certificate(encoded: &str) -> std::result::Result<Certificate, DecodeErrorKind> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let der = STANDARD.decode(compact).map_err(|e| {
        debug!(level = "decoder", "Failed to decode base64 certificate: {e}");
        DecodeErrorKind::InvalidBase64
    })?;
    Certificate::from_der(&der)
}

/// Decodes a leaf-first list of base64 encoded DER certificates.
///
/// Elements are decoded in order and the first failure aborts the whole
/// chain, no partial chain is ever returned.
///
/// # Arguments
///
/// * `encoded_chain` - Base64 encoded DER certificates, index 0 being the leaf
///
/// # Returns
///
/// The decoded [`CertificateChain`], in the same order as the input.
///
/// # Errors
///
/// Returns `VerificationError::DecodeError` carrying the position of the
/// first element that failed to decode and the kind of failure.
#[instrument(level = "debug", skip_all, fields(length = encoded_chain.len()))]
pub fn decode_chain<S: AsRef<str>>(encoded_chain: &[S]) -> Result<CertificateChain> {
    let mut certificates = Vec::with_capacity(encoded_chain.len());
    for (index, encoded) in encoded_chain.iter().enumerate() {
        let certificate = decode_certificate(encoded.as_ref()).map_err(|kind| {
            tracing::error!(
                level = "decoder",
                index,
                "Failed to decode certificate {index}: {kind}"
            );
            VerificationError::DecodeError { index, kind }
        })?;
        debug!(
            level = "decoder",
            "Cert {index} subject: {}, issuer: {}",
            certificate.subject_name(),
            certificate.issuer_name()
        );
        certificates.push(certificate);
    }
    Ok(CertificateChain::new(certificates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_algorithm_from_oid() {
        assert_eq!(
            SignatureAlgorithm::from_oid("1.2.840.113549.1.1.11"),
            SignatureAlgorithm::RsaPkcs1Sha256
        );
        assert_eq!(
            SignatureAlgorithm::from_oid("1.2.840.10045.4.3.2"),
            SignatureAlgorithm::EcdsaSha256
        );
        assert!(!SignatureAlgorithm::from_oid("1.2.3.4").is_known());
    }

    #[test]
    fn test_rfc4514_escaping() {
        assert_eq!(escape_rfc4514("Acme, Inc."), "Acme\\, Inc.");
        assert_eq!(escape_rfc4514(" padded "), "\\ padded\\ ");
        assert_eq!(escape_rfc4514("#0c03616263"), "#0c03616263");
        assert_eq!(escape_rfc4514("StrongBox"), "StrongBox");
    }

    #[test]
    fn test_invalid_base64_is_reported() {
        assert_eq!(
            decode_certificate("not base64!").unwrap_err(),
            DecodeErrorKind::InvalidBase64
        );
    }

    #[test]
    fn test_garbage_der_is_reported() {
        assert_eq!(
            decode_certificate("AAECAwQF").unwrap_err(),
            DecodeErrorKind::InvalidDer
        );
    }
}
