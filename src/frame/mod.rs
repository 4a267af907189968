//! Binary frame codec: outbound builder and inbound validator + parser.
//!
//! Every payload on the wire begins with `[version, opcode]`. This module
//! owns that envelope and the per-opcode field layouts; [`crate::value`]
//! owns what happens inside a value slot.

pub mod builder;
pub mod parser;
pub mod validator;

use crate::types::{DataType, Opcode, RegisterKind};
use crate::value::Value;

/// A frame that passed validation and was decoded into a typed message.
///
/// `source_address` comes from the transport layer (the framing library's
/// sender field), never from the payload itself — register-message
/// payloads carry no sender field of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub source_address: u8,
    pub message: Message,
}

/// Decoded inbound message, one variant per opcode the parser recognizes.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Pong,

    /// Reply to READ_SINGLE_REGISTER_VALUE, or a WRITE_SINGLE_REGISTER_VALUE
    /// echo, or a spontaneous REPORT_SINGLE_REGISTER_VALUE — all three share
    /// the same 9-byte wire layout and are disambiguated by the opcode byte
    /// the caller already knows it asked for (or, for REPORT, by it being
    /// unsolicited).
    SingleRegisterValue {
        kind: RegisterKind,
        address: u16,
        value: Value,
    },

    /// Reply to READ_MULTIPLE_REGISTERS_VALUES. Values are in address order,
    /// `addresses = start..start+values.len()`.
    MultipleRegisterValues {
        kind: RegisterKind,
        start_address: u16,
        values: Vec<Value>,
    },

    /// Reply to READ_SINGLE_REGISTER_STRUCTURE.
    RegisterStructure {
        kind: RegisterKind,
        address: u16,
        data_type: DataType,
        /// Present only for ATTRIBUTE registers.
        attribute: Option<AttributeStructure>,
    },

    /// Reply to a DISCOVER broadcast.
    Discovery(DiscoveryReply),
}

/// ATTRIBUTE-only fields of a register structure reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeStructure {
    pub settable: bool,
    pub queryable: bool,
    pub name: String,
}

/// Decoded DISCOVER reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryReply {
    pub current_address: u8,
    pub max_packet_length: u16,
    pub serial_number: String,
    pub hardware_version: String,
    pub hardware_model: String,
    pub hardware_manufacturer: String,
    pub firmware_version: String,
    pub firmware_manufacturer: String,
    pub input_register_count: u16,
    pub output_register_count: u16,
    pub attribute_register_count: u16,
}

/// Minimum payload length, in bytes, for a given reply opcode.
pub(crate) fn minimum_payload_length(opcode: Opcode) -> usize {
    match opcode {
        Opcode::Pong => 2,
        Opcode::ReadSingleRegisterValue
        | Opcode::WriteSingleRegisterValue
        | Opcode::ReportSingleRegisterValue => 9,
        Opcode::ReadMultipleRegistersValues => 10,
        Opcode::ReadSingleRegisterStructure => 6,
        Opcode::Discover => 22,
        Opcode::Ping | Opcode::Exception => 2,
        Opcode::WriteMultipleRegistersValues => 10,
    }
}
