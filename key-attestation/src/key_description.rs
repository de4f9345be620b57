use x509_parser::der_parser::{ber::BerObject, der::parse_der_sequence};

use crate::{errors::KeyDescriptionError, types::SecurityLevel};

/// Leading fields of the `KeyDescription` sequence carried by the key
/// attestation extension:
///
/// ```text
/// KeyDescription ::= SEQUENCE {
///     attestationVersion         INTEGER,
///     attestationSecurityLevel   SecurityLevel,
///     keyMintVersion             INTEGER,
///     keyMintSecurityLevel       SecurityLevel,
///     attestationChallenge       OCTET_STRING,
///     uniqueId                   OCTET_STRING,
///     softwareEnforced           AuthorizationList,
///     hardwareEnforced           AuthorizationList,
/// }
/// ```
///
/// The authorization lists are not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    pub attestation_version: u32,
    pub attestation_security_level: SecurityLevel,
    pub key_mint_version: u32,
    pub key_mint_security_level: SecurityLevel,
    pub attestation_challenge: Vec<u8>,
    pub unique_id: Vec<u8>,
}

impl KeyDescription {
    /// Parses the raw value of the key attestation extension.
    ///
    /// # Errors
    ///
    /// * `KeyDescriptionError::Asn1` if the value is not a DER sequence or a
    ///   field has the wrong type
    /// * `KeyDescriptionError::MissingField` if the sequence is too short
    /// * `KeyDescriptionError::UnknownSecurityLevel` for a level outside
    ///   Software, TrustedEnvironment and StrongBox
    pub fn parse(value: &[u8]) -> Result<Self, KeyDescriptionError> {
        let (_, object) = parse_der_sequence(value).map_err(asn1_error)?;
        let fields = object.as_sequence().map_err(asn1_error)?;
        let field = |index: usize, name: &'static str| {
            fields
                .get(index)
                .ok_or(KeyDescriptionError::MissingField(name))
        };

        Ok(Self {
            attestation_version: field(0, "attestationVersion")?
                .as_u32()
                .map_err(asn1_error)?,
            attestation_security_level: security_level(field(1, "attestationSecurityLevel")?)?,
            key_mint_version: field(2, "keyMintVersion")?
                .as_u32()
                .map_err(asn1_error)?,
            key_mint_security_level: security_level(field(3, "keyMintSecurityLevel")?)?,
            attestation_challenge: field(4, "attestationChallenge")?
                .as_slice()
                .map_err(asn1_error)?
                .to_vec(),
            unique_id: field(5, "uniqueId")?
                .as_slice()
                .map_err(asn1_error)?
                .to_vec(),
        })
    }
}

fn security_level(object: &BerObject<'_>) -> Result<SecurityLevel, KeyDescriptionError> {
    match object.as_u32().map_err(asn1_error)? {
        0 => Ok(SecurityLevel::Software),
        1 => Ok(SecurityLevel::TrustedEnvironment),
        2 => Ok(SecurityLevel::StrongBox),
        other => Err(KeyDescriptionError::UnknownSecurityLevel(other)),
    }
}

fn asn1_error(e: impl std::fmt::Display) -> KeyDescriptionError {
    KeyDescriptionError::Asn1(e.to_string())
}

/// DER encoding of a minimal `KeyDescription`, shared by the test modules.
#[cfg(test)]
pub(crate) fn encode_key_description(security_level: u8, challenge: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    // attestationVersion 300
    body.extend_from_slice(&[0x02, 0x02, 0x01, 0x2c]);
    body.extend_from_slice(&[0x0a, 0x01, security_level]);
    body.extend_from_slice(&[0x02, 0x02, 0x01, 0x2c]);
    body.extend_from_slice(&[0x0a, 0x01, security_level]);
    body.push(0x04);
    body.push(challenge.len() as u8);
    body.extend_from_slice(challenge);
    body.extend_from_slice(&[0x04, 0x00]);
    // empty softwareEnforced and hardwareEnforced lists
    body.extend_from_slice(&[0x30, 0x00, 0x30, 0x00]);

    let mut encoded = vec![0x30, body.len() as u8];
    encoded.extend_from_slice(&body);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strongbox_description() {
        let encoded = encode_key_description(2, b"MARTA_TEST");
        let description = KeyDescription::parse(&encoded).unwrap();
        assert_eq!(description.attestation_version, 300);
        assert_eq!(
            description.attestation_security_level,
            SecurityLevel::StrongBox
        );
        assert_eq!(description.key_mint_security_level, SecurityLevel::StrongBox);
        assert_eq!(description.attestation_challenge, b"MARTA_TEST");
        assert!(description.unique_id.is_empty());
    }

    #[test]
    fn test_parse_tee_description() {
        let encoded = encode_key_description(1, b"nonce");
        let description = KeyDescription::parse(&encoded).unwrap();
        assert_eq!(
            description.attestation_security_level,
            SecurityLevel::TrustedEnvironment
        );
    }

    #[test]
    fn test_unknown_security_level() {
        let encoded = encode_key_description(7, b"nonce");
        assert!(matches!(
            KeyDescription::parse(&encoded),
            Err(KeyDescriptionError::UnknownSecurityLevel(7))
        ));
    }

    #[test]
    fn test_truncated_sequence() {
        // SEQUENCE { INTEGER 3 }
        let encoded = [0x30, 0x03, 0x02, 0x01, 0x03];
        assert!(matches!(
            KeyDescription::parse(&encoded),
            Err(KeyDescriptionError::MissingField("attestationSecurityLevel"))
        ));
    }

    #[test]
    fn test_not_a_sequence() {
        assert!(matches!(
            KeyDescription::parse(&[0x04, 0x01, 0x00]),
            Err(KeyDescriptionError::Asn1(_))
        ));
    }
}
