//! Error taxonomy for the connector.
//!
//! Most engine operations never surface a `Result` at all — a failed parse
//! or a missed reply just means "try again next tick" and is logged and
//! dropped. These types exist for the handful of places that do need to
//! report a typed failure to a caller: building a frame, parsing one off
//! the wire, or initializing the transport.

use thiserror::Error;

use crate::types::{DataType, Opcode, RegisterKind};

/// Frame failed the cheap structural check before parsing was attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload too short: {len} bytes, need at least 2")]
    TooShort { len: usize },

    #[error("unsupported protocol version byte: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("unknown opcode byte: {0:#04x}")]
    UnknownOpcode(u8),
}

/// Frame passed validation but could not be decoded into a typed message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{opcode:?} payload length {actual} does not match expected {expected}")]
    InvalidLength {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("{opcode:?} payload length {actual} is below the minimum {minimum}")]
    TooShort {
        opcode: Opcode,
        minimum: usize,
        actual: usize,
    },

    #[error("unknown register kind byte: {0:#04x}")]
    UnknownRegisterKind(u8),

    #[error("register {kind:?}@{address} is not present in the registry")]
    UnknownRegister { kind: RegisterKind, address: u16 },

    #[error("register {kind:?}@{address} has data type {data_type:?} which cannot be decoded from the wire")]
    UnsupportedDataType {
        kind: RegisterKind,
        address: u16,
        data_type: DataType,
    },

    #[error("text field at offset {offset} runs past the end of the payload")]
    TruncatedText { offset: usize },
}

/// A value could not be encoded into an outbound frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("register data type {data_type:?} cannot hold the supplied value")]
    UnsupportedValueForType { data_type: DataType },

    #[error("value could not be encoded for data type {data_type:?}")]
    EncodeFailed { data_type: DataType },

    #[error("serial number is longer than 255 bytes")]
    SerialNumberTooLong,
}

/// Failures surfaced by the transport scheduler / delegated framing library.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial interface {interface:?}: {source}")]
    Open {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write to the bus failed: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },

    #[error("transport is not initialized")]
    NotInitialized,
}

/// Top-level error returned by whole-connector operations such as
/// [`crate::connector::Connector::initialize`].
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}
