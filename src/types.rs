//! Wire-level enums shared across the codec, builder and parser.
//!
//! Every enum here is a closed, `#[repr(u8)]` tagged set with an explicit
//! `TryFrom<u8>` for decoding bytes off the wire and an `Into<u8>`/`as u8`
//! for encoding. An unrecognized numeric value decodes to `Unknown` where
//! the protocol allows it (data types) and to an error where it doesn't
//! (opcodes, register kinds — the parser has nothing sensible to do with
//! those).

use std::fmt;

/// Protocol version carried in byte 0 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    #[default]
    V1 = 0x01,
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ProtocolVersion::V1),
            other => Err(other),
        }
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(value: ProtocolVersion) -> u8 {
        value as u8
    }
}

/// Packet opcode carried in byte 1 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Ping = 0x01,
    Pong = 0x02,
    Exception = 0x03,
    Discover = 0x04,

    ReadSingleRegisterValue = 0x21,
    ReadMultipleRegistersValues = 0x22,
    WriteSingleRegisterValue = 0x23,
    WriteMultipleRegistersValues = 0x24,
    ReportSingleRegisterValue = 0x25,
    ReadSingleRegisterStructure = 0x26,
}

impl Opcode {
    /// All opcodes the validator accepts on the wire.
    pub const ALL: &'static [Opcode] = &[
        Opcode::Ping,
        Opcode::Pong,
        Opcode::Exception,
        Opcode::Discover,
        Opcode::ReadSingleRegisterValue,
        Opcode::ReadMultipleRegistersValues,
        Opcode::WriteSingleRegisterValue,
        Opcode::WriteMultipleRegistersValues,
        Opcode::ReportSingleRegisterValue,
        Opcode::ReadSingleRegisterStructure,
    ];
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| *op as u8 == value)
            .ok_or(value)
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> u8 {
        value as u8
    }
}

/// Register kind. The older fork of this bus also has a `SETTING` kind;
/// not modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RegisterKind {
    /// Read-only.
    Input = 0x01,
    /// Read/write.
    Output = 0x02,
    /// Read/write, named, data-typed.
    Attribute = 0x03,
}

impl TryFrom<u8> for RegisterKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(RegisterKind::Input),
            0x02 => Ok(RegisterKind::Output),
            0x03 => Ok(RegisterKind::Attribute),
            other => Err(other),
        }
    }
}

impl From<RegisterKind> for u8 {
    fn from(value: RegisterKind) -> u8 {
        value as u8
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterKind::Input => "input",
            RegisterKind::Output => "output",
            RegisterKind::Attribute => "attribute",
        };
        f.write_str(name)
    }
}

/// Declared register data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Uchar = 0x01,
    Ushort = 0x02,
    Uint = 0x03,
    Char = 0x04,
    Short = 0x05,
    Int = 0x06,
    Float = 0x07,
    Boolean = 0x08,
    Time = 0x09,
    Date = 0x0A,
    DateTime = 0x0B,
    String = 0x0C,
    Button = 0x0D,
    Switch = 0x0E,
    Enum = 0x0F,
    Unknown = 0xFF,
}

impl DataType {
    /// Logical byte width used for property metadata and multi-read
    /// planning. This is *not* the on-wire slot width for scalar values
    /// in a multi-register reply, which is always 4 bytes (see
    /// [`crate::value`] module docs).
    pub fn byte_size(self) -> usize {
        match self {
            DataType::Uchar | DataType::Char => 1,
            DataType::Ushort | DataType::Short => 2,
            DataType::Uint | DataType::Int | DataType::Float => 4,
            DataType::Boolean => 2,
            _ => 0,
        }
    }

    /// Whether this data type is carried as length-prefixed text on the
    /// wire rather than a fixed 4-byte numeric slot.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            DataType::String | DataType::Date | DataType::Time | DataType::DateTime
        )
    }
}

impl TryFrom<u8> for DataType {
    type Error = std::convert::Infallible;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => DataType::Uchar,
            0x02 => DataType::Ushort,
            0x03 => DataType::Uint,
            0x04 => DataType::Char,
            0x05 => DataType::Short,
            0x06 => DataType::Int,
            0x07 => DataType::Float,
            0x08 => DataType::Boolean,
            0x09 => DataType::Time,
            0x0A => DataType::Date,
            0x0B => DataType::DateTime,
            0x0C => DataType::String,
            0x0D => DataType::Button,
            0x0E => DataType::Switch,
            0x0F => DataType::Enum,
            _ => DataType::Unknown,
        })
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> u8 {
        value as u8
    }
}

/// Device connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Unknown = 0xFF,
    Init = 0x03,
    Running = 0x01,
    Stopped = 0x02,
    Connected = 0x04,
    Disconnected = 0x05,
    Lost = 0x06,
    Alert = 0x0A,
}

impl TryFrom<u8> for ConnectionState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xFF => Ok(ConnectionState::Unknown),
            0x03 => Ok(ConnectionState::Init),
            0x01 => Ok(ConnectionState::Running),
            0x02 => Ok(ConnectionState::Stopped),
            0x04 => Ok(ConnectionState::Connected),
            0x05 => Ok(ConnectionState::Disconnected),
            0x06 => Ok(ConnectionState::Lost),
            0x0A => Ok(ConnectionState::Alert),
            other => Err(other),
        }
    }
}

impl From<ConnectionState> for u8 {
    fn from(value: ConnectionState) -> u8 {
        value as u8
    }
}

/// Well-known ATTRIBUTE register names the engine treats specially.
///
/// These are plain string constants rather than an enum: unlike opcodes
/// or data types they never appear as a raw byte on the wire, only as the
/// length-prefixed `name` field of an ATTRIBUTE register structure reply.
pub mod device_attribute {
    pub const STATE: &str = "state";
    pub const ADDRESS: &str = "address";
    pub const MAX_PACKET_LENGTH: &str = "max_packet_length";
}

/// Bus address reserved for the gateway itself.
pub const GATEWAY_ADDRESS: u8 = 254;
/// Bus address meaning "not yet assigned".
pub const UNASSIGNED_ADDRESS: u8 = 255;
/// Lowest usable unicast address.
pub const MIN_DEVICE_ADDRESS: u8 = 1;
/// Highest usable unicast address.
pub const MAX_DEVICE_ADDRESS: u8 = 253;
