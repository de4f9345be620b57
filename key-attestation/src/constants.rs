/// Marker searched for in subject names by the default hardware classifier.
///
/// StrongBox attestation certificates carry it in their subject (for example
/// as a `title` attribute), while TEE-backed chains do not.
pub const STRONGBOX_SUBJECT_MARKER: &str = "StrongBox";

/// OID of the key attestation extension carried by the leaf certificate.
///
/// Its value is a DER encoded `KeyDescription` sequence holding the security
/// level of the key and the challenge supplied at key generation time.
pub const KEY_ATTESTATION_EXTENSION_OID: &str = "1.3.6.1.4.1.11129.2.1.17";

/// Maximum number of certificates accepted in a single chain by default.
///
/// Real attestation chains have three or four elements; anything much longer
/// is treated as an attempt to exhaust the verifier.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 10;

/// Smallest chain on which a signature link can be checked.
pub const MIN_CHAIN_LENGTH: usize = 2;

/// Length in bytes of a SHA-256 certificate fingerprint.
pub const FINGERPRINT_LENGTH: usize = 32;

/// Message returned alongside an accepted attestation.
pub const ACCEPTED_MESSAGE: &str = "Attestation verified on server";

/// Status value of an accepted response.
pub const STATUS_OK: &str = "ok";

/// Status value of a rejected response.
pub const STATUS_ERROR: &str = "error";
