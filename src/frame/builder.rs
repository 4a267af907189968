//! Outbound payload construction.
//!
//! Every builder function returns the full payload including the
//! `[version, opcode]` header. Writes are the only fallible path: the
//! caller's `data_type` must admit the supplied value, or `BuildError` is
//! returned instead of silently truncating or coercing it.

use crate::error::BuildError;
use crate::types::{device_attribute, ConnectionState, DataType, Opcode, ProtocolVersion, RegisterKind};
use crate::value::{self, Value};

const VERSION: u8 = ProtocolVersion::V1 as u8;

fn header(opcode: Opcode) -> Vec<u8> {
    vec![VERSION, opcode.into()]
}

fn push_address(buf: &mut Vec<u8>, address: u16) {
    let [hi, lo] = address.to_be_bytes();
    buf.push(hi);
    buf.push(lo);
}

fn push_serial_number(buf: &mut Vec<u8>, serial_number: &str) -> Result<(), BuildError> {
    if serial_number.len() > u8::MAX as usize {
        return Err(BuildError::SerialNumberTooLong);
    }
    buf.push(serial_number.len() as u8);
    buf.extend_from_slice(serial_number.as_bytes());
    Ok(())
}

/// `PING` — no trailing bytes.
pub fn build_ping() -> Vec<u8> {
    header(Opcode::Ping)
}

/// `DISCOVER` — no trailing bytes.
pub fn build_discover() -> Vec<u8> {
    header(Opcode::Discover)
}

/// `READ_SINGLE_REGISTER_VALUE`.
pub fn build_read_single_register_value(kind: RegisterKind, address: u16) -> Vec<u8> {
    let mut buf = header(Opcode::ReadSingleRegisterValue);
    buf.push(kind.into());
    push_address(&mut buf, address);
    buf
}

/// `READ_MULTIPLE_REGISTERS_VALUES`.
pub fn build_read_multiple_registers_values(
    kind: RegisterKind,
    start_address: u16,
    count: u16,
) -> Vec<u8> {
    let mut buf = header(Opcode::ReadMultipleRegistersValues);
    buf.push(kind.into());
    push_address(&mut buf, start_address);
    push_address(&mut buf, count);
    buf
}

/// `READ_SINGLE_REGISTER_STRUCTURE`. `serial_number` is the gateway's own,
/// included so the device can confirm it is talking to the right bus
/// controller (mirrors the unicast write envelope).
pub fn build_read_single_register_structure(
    kind: RegisterKind,
    address: u16,
    serial_number: &str,
) -> Result<Vec<u8>, BuildError> {
    let mut buf = header(Opcode::ReadSingleRegisterStructure);
    buf.push(kind.into());
    push_address(&mut buf, address);
    push_serial_number(&mut buf, serial_number)?;
    Ok(buf)
}

/// `WRITE_SINGLE_REGISTER_VALUE`.
///
/// Fails with [`BuildError::UnsupportedValueForType`] when `value` does not
/// match `data_type`, or [`BuildError::EncodeFailed`] when the codec
/// otherwise can't produce bytes for it.
pub fn build_write_single_register_value(
    kind: RegisterKind,
    address: u16,
    data_type: DataType,
    value: &Value,
    register_name: Option<&str>,
    serial_number: &str,
) -> Result<Vec<u8>, BuildError> {
    let value_bytes = encode_for_write(kind, data_type, value, register_name)?;

    let mut buf = header(Opcode::WriteSingleRegisterValue);
    buf.push(kind.into());
    push_address(&mut buf, address);
    buf.extend_from_slice(&value_bytes);
    push_serial_number(&mut buf, serial_number)?;
    Ok(buf)
}

/// Special-cases the well-known "state" ATTRIBUTE: a connection-state
/// symbol is mapped to its numeric code and sent as
/// UCHAR rather than whatever `data_type` the register otherwise declares.
fn encode_for_write(
    kind: RegisterKind,
    data_type: DataType,
    value: &Value,
    register_name: Option<&str>,
) -> Result<Vec<u8>, BuildError> {
    if kind == RegisterKind::Attribute && register_name == Some(device_attribute::STATE) {
        if let Value::Uchar(code) = value {
            if ConnectionState::try_from(*code).is_ok() {
                return value::encode(DataType::Uchar, value)
                    .ok_or(BuildError::EncodeFailed { data_type: DataType::Uchar });
            }
        }
    }

    match value::encode(data_type, value) {
        Some(bytes) => Ok(bytes),
        None => Err(BuildError::UnsupportedValueForType { data_type }),
    }
}
