//! Cheap structural validation, the first of the two parsing stages.
//!
//! Validation never looks at the registry and never fails partway through
//! a payload it considers well-formed; it only answers "is this worth
//! handing to the parser at all".

use crate::error::ValidationError;
use crate::types::{Opcode, ProtocolVersion};

/// Validate a raw inbound payload and return its opcode if it passes.
///
/// Checks, in order: length ≥ 2, `byte[0]` is the supported protocol
/// version, `byte[1]` is a known opcode.
pub fn validate(payload: &[u8]) -> Result<Opcode, ValidationError> {
    if payload.len() < 2 {
        return Err(ValidationError::TooShort { len: payload.len() });
    }

    let version = payload[0];
    if ProtocolVersion::try_from(version).is_err() {
        return Err(ValidationError::UnsupportedVersion(version));
    }

    let opcode_byte = payload[1];
    Opcode::try_from(opcode_byte).map_err(ValidationError::UnknownOpcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_payload_shorter_than_two_bytes() {
        assert_eq!(validate(&[0x01]), Err(ValidationError::TooShort { len: 1 }));
    }

    #[test]
    fn rejects_unsupported_version() {
        assert_eq!(validate(&[0x02, 0x01]), Err(ValidationError::UnsupportedVersion(0x02)));
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert_eq!(validate(&[0x01, 0x99]), Err(ValidationError::UnknownOpcode(0x99)));
    }

    #[test]
    fn accepts_a_known_frame() {
        assert_eq!(validate(&[0x01, 0x01]), Ok(Opcode::Ping));
    }
}
