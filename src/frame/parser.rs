//! Decode a validated payload into a typed [`Message`].
//!
//! Parsing multi-register replies needs to know each target register's
//! declared data type to know how wide its slot is, so callers pass a
//! `lookup` closure backed by the registry rather than the parser holding
//! a registry reference itself.

use crate::error::ParseError;
use crate::types::{DataType, Opcode, RegisterKind};
use crate::value::{self, Value, TEXT_SPACE_TERMINATOR};

use super::{minimum_payload_length, AttributeStructure, DiscoveryReply, Message, ParsedFrame};

/// Looks up the declared data type of a register by `(kind, address)`.
/// Returns `None` when the register is not known to the registry.
pub type RegisterTypeLookup<'a> = &'a dyn Fn(RegisterKind, u16) -> Option<DataType>;

/// Parse a validated payload, already known to have `opcode` at `byte[1]`.
pub fn parse(
    opcode: Opcode,
    payload: &[u8],
    source_address: u8,
    lookup: RegisterTypeLookup,
) -> Result<ParsedFrame, ParseError> {
    let message = match opcode {
        Opcode::Pong => parse_pong(opcode, payload)?,
        Opcode::ReadSingleRegisterValue
        | Opcode::WriteSingleRegisterValue
        | Opcode::ReportSingleRegisterValue => parse_single_register_value(opcode, payload, lookup)?,
        Opcode::ReadMultipleRegistersValues => parse_multiple_register_values(opcode, payload, lookup)?,
        Opcode::ReadSingleRegisterStructure => parse_register_structure(opcode, payload)?,
        Opcode::Discover => Message::Discovery(parse_discovery(opcode, payload)?),
        Opcode::Ping | Opcode::Exception | Opcode::WriteMultipleRegistersValues => {
            return Err(ParseError::InvalidLength {
                opcode,
                expected: 0,
                actual: payload.len(),
            });
        }
    };

    Ok(ParsedFrame { source_address, message })
}

fn require_exact_length(opcode: Opcode, payload: &[u8], expected: usize) -> Result<(), ParseError> {
    if payload.len() != expected {
        return Err(ParseError::InvalidLength {
            opcode,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn require_minimum_length(opcode: Opcode, payload: &[u8]) -> Result<(), ParseError> {
    let minimum = minimum_payload_length(opcode);
    if payload.len() < minimum {
        return Err(ParseError::TooShort {
            opcode,
            minimum,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn parse_pong(opcode: Opcode, payload: &[u8]) -> Result<Message, ParseError> {
    require_exact_length(opcode, payload, 2)?;
    Ok(Message::Pong)
}

fn read_kind(_opcode: Opcode, payload: &[u8]) -> Result<RegisterKind, ParseError> {
    RegisterKind::try_from(payload[2]).map_err(ParseError::UnknownRegisterKind)
}

fn read_address(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

fn parse_single_register_value(
    opcode: Opcode,
    payload: &[u8],
    lookup: RegisterTypeLookup,
) -> Result<Message, ParseError> {
    require_exact_length(opcode, payload, 9)?;

    let kind = read_kind(opcode, payload)?;
    let address = read_address(payload, 3);

    let data_type = lookup(kind, address).ok_or(ParseError::UnknownRegister { kind, address })?;
    let value = value::decode(data_type, &payload[5..9])
        .ok_or(ParseError::UnsupportedDataType { kind, address, data_type })?;

    Ok(Message::SingleRegisterValue { kind, address, value })
}

fn parse_multiple_register_values(
    opcode: Opcode,
    payload: &[u8],
    lookup: RegisterTypeLookup,
) -> Result<Message, ParseError> {
    require_minimum_length(opcode, payload)?;

    let kind = read_kind(opcode, payload)?;
    let start_address = read_address(payload, 3);
    let count = payload[5] as u16;

    let mut values = Vec::with_capacity(count as usize);
    let mut cursor = 6usize;

    for i in 0..count {
        let address = start_address + i;
        let data_type = lookup(kind, address).ok_or(ParseError::UnknownRegister { kind, address })?;

        if data_type.is_text() {
            let end = payload[cursor..]
                .iter()
                .position(|&b| b == TEXT_SPACE_TERMINATOR)
                .map(|rel| cursor + rel)
                .unwrap_or(payload.len());
            let slice = &payload[cursor..end];
            let value = value::decode(data_type, slice)
                .ok_or(ParseError::UnsupportedDataType { kind, address, data_type })?;
            values.push(value);
            cursor = end + 1;
        } else {
            let slice = payload
                .get(cursor..cursor + 4)
                .ok_or(ParseError::TruncatedText { offset: cursor })?;
            let value = value::decode(data_type, slice)
                .ok_or(ParseError::UnsupportedDataType { kind, address, data_type })?;
            values.push(value);
            cursor += 4;
        }
    }

    Ok(Message::MultipleRegisterValues { kind, start_address, values })
}

fn parse_register_structure(opcode: Opcode, payload: &[u8]) -> Result<Message, ParseError> {
    require_minimum_length(opcode, payload)?;

    let kind = read_kind(opcode, payload)?;
    let address = read_address(payload, 3);
    let data_type = DataType::try_from(payload[5]).unwrap_or(DataType::Unknown);

    let attribute = if kind == RegisterKind::Attribute {
        if payload.len() < 11 {
            return Err(ParseError::TooShort { opcode, minimum: 11, actual: payload.len() });
        }
        let settable = read_address(payload, 6) != 0;
        let queryable = read_address(payload, 8) != 0;
        let name_len = payload[10] as usize;
        let name_start = 11;
        let name_end = name_start + name_len;
        let name_bytes = payload
            .get(name_start..name_end)
            .ok_or(ParseError::TruncatedText { offset: name_start })?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| ParseError::TruncatedText { offset: name_start })?
            .to_owned();
        Some(AttributeStructure { settable, queryable, name })
    } else {
        None
    };

    Ok(Message::RegisterStructure { kind, address, data_type, attribute })
}

/// Cursor-based reader for the discovery reply's sequential fixed and
/// length-prefixed fields.
struct DiscoveryCursor<'a> {
    payload: &'a [u8],
    position: usize,
}

impl<'a> DiscoveryCursor<'a> {
    fn new(payload: &'a [u8], start: usize) -> Self {
        Self { payload, position: start }
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        let byte = *self
            .payload
            .get(self.position)
            .ok_or(ParseError::TruncatedText { offset: self.position })?;
        self.position += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_text(&mut self) -> Result<String, ParseError> {
        let len = self.read_u8()? as usize;
        let start = self.position;
        let end = start + len;
        let bytes = self
            .payload
            .get(start..end)
            .ok_or(ParseError::TruncatedText { offset: start })?;
        self.position = end;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ParseError::TruncatedText { offset: start })
    }
}

fn parse_discovery(opcode: Opcode, payload: &[u8]) -> Result<DiscoveryReply, ParseError> {
    require_minimum_length(opcode, payload)?;

    let mut cursor = DiscoveryCursor::new(payload, 2);

    let current_address = cursor.read_u8()?;
    let max_packet_length = cursor.read_u16()?;
    let serial_number = cursor.read_text()?;
    let hardware_version = cursor.read_text()?;
    let hardware_model = cursor.read_text()?;
    let hardware_manufacturer = cursor.read_text()?;
    let firmware_version = cursor.read_text()?;
    let firmware_manufacturer = cursor.read_text()?;
    let input_register_count = cursor.read_u16()?;
    let output_register_count = cursor.read_u16()?;
    let attribute_register_count = cursor.read_u16()?;

    Ok(DiscoveryReply {
        current_address,
        max_packet_length,
        serial_number,
        hardware_version,
        hardware_model,
        hardware_manufacturer,
        firmware_version,
        firmware_manufacturer,
        input_register_count,
        output_register_count,
        attribute_register_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_registers(_: RegisterKind, _: u16) -> Option<DataType> {
        None
    }

    #[test]
    fn pong_parses_with_no_fields() {
        let frame = parse(Opcode::Pong, &[0x01, 0x02], 5, &no_registers).unwrap();
        assert_eq!(frame.source_address, 5);
        assert_eq!(frame.message, Message::Pong);
    }

    #[test]
    fn single_register_value_reply_decodes_into_typed_value() {
        let lookup = |kind: RegisterKind, address: u16| -> Option<DataType> {
            (kind == RegisterKind::Input && address == 3).then_some(DataType::Uint)
        };
        let payload = [0x01, 0x21, 0x01, 0x00, 0x03, 0x2A, 0x00, 0x00, 0x00];
        let frame = parse(Opcode::ReadSingleRegisterValue, &payload, 1, &lookup).unwrap();
        assert_eq!(
            frame.message,
            Message::SingleRegisterValue {
                kind: RegisterKind::Input,
                address: 3,
                value: Value::Uint(42),
            }
        );
    }

    #[test]
    fn multi_register_values_reply_decodes_each_slot_in_address_order() {
        let lookup = |_: RegisterKind, address: u16| -> Option<DataType> {
            match address {
                0 => Some(DataType::Uchar),
                1 => Some(DataType::Ushort),
                2 => Some(DataType::Float),
                _ => None,
            }
        };
        let mut payload = vec![0x01, 0x22, 0x01, 0x00, 0x00, 0x03];
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&300u32.to_le_bytes());
        payload.extend_from_slice(&1.5f32.to_le_bytes());

        let frame = parse(Opcode::ReadMultipleRegistersValues, &payload, 1, &lookup).unwrap();
        assert_eq!(
            frame.message,
            Message::MultipleRegisterValues {
                kind: RegisterKind::Input,
                start_address: 0,
                values: vec![Value::Uchar(1), Value::Ushort(300), Value::Float(1.5)],
            }
        );
    }

    #[test]
    fn unknown_register_in_multi_reply_aborts_whole_reply() {
        let lookup = |_: RegisterKind, address: u16| -> Option<DataType> {
            (address == 0).then_some(DataType::Uchar)
        };
        let mut payload = vec![0x01, 0x22, 0x01, 0x00, 0x00, 0x02];
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&2u32.to_le_bytes());

        let err = parse(Opcode::ReadMultipleRegistersValues, &payload, 1, &lookup).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownRegister { kind: RegisterKind::Input, address: 1 }
        );
    }

    #[test]
    fn register_structure_reply_with_attribute_fields() {
        let mut payload = vec![0x01, 0x26, 0x03, 0x00, 0x02, 0x01];
        payload.extend_from_slice(&0xFF00u16.to_be_bytes());
        payload.extend_from_slice(&0x0000u16.to_be_bytes());
        payload.push(5);
        payload.extend_from_slice(b"state");

        let frame = parse(Opcode::ReadSingleRegisterStructure, &payload, 9, &no_registers).unwrap();
        assert_eq!(
            frame.message,
            Message::RegisterStructure {
                kind: RegisterKind::Attribute,
                address: 2,
                data_type: DataType::Uchar,
                attribute: Some(AttributeStructure {
                    settable: true,
                    queryable: false,
                    name: "state".to_owned(),
                }),
            }
        );
    }

    #[test]
    fn discovery_reply_round_trip() {
        let mut payload = vec![0x01, 0x04];
        payload.push(255);
        payload.extend_from_slice(&80u16.to_be_bytes());
        for text in ["SN-ABC", "hw1", "model", "acme", "fw1", "acme"] {
            payload.push(text.len() as u8);
            payload.extend_from_slice(text.as_bytes());
        }
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload.extend_from_slice(&0u16.to_be_bytes());
        payload.extend_from_slice(&2u16.to_be_bytes());

        let frame = parse(Opcode::Discover, &payload, 0, &no_registers).unwrap();
        match frame.message {
            Message::Discovery(reply) => {
                assert_eq!(reply.current_address, 255);
                assert_eq!(reply.serial_number, "SN-ABC");
                assert_eq!(reply.input_register_count, 1);
                assert_eq!(reply.output_register_count, 0);
                assert_eq!(reply.attribute_register_count, 2);
            }
            other => panic!("expected discovery reply, got {other:?}"),
        }
    }
}
