//! Device, register and discovery records.
//!
//! Records are plain data; every mutation that matters to a subscriber
//! goes through [`crate::registry::Registry`] methods rather than through
//! `pub` field writes from outside this crate's registry module.

use uuid::Uuid;

use crate::types::{ConnectionState, DataType, Opcode, RegisterKind};
use crate::value::Value;

/// Wall-clock seconds. The engine never reads the clock itself — the host
/// drives the tick and callers pass `now` in.
pub type Timestamp = f64;

/// A device on the bus.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub serial_number: String,
    /// 1-253, or 255 for "unassigned".
    pub address: u8,
    pub hardware_manufacturer: Option<String>,
    pub hardware_model: Option<String>,
    pub hardware_version: Option<String>,
    pub firmware_manufacturer: Option<String>,
    pub firmware_version: Option<String>,
    pub enabled: bool,
    pub state: ConnectionState,
    pub last_packet_sent_timestamp: Timestamp,
    pub waiting_for_packet: Option<Opcode>,
    pub transmit_attempts: u32,
    pub lost_timestamp: Timestamp,
    pub sampling_time: Timestamp,
    pub reading_cursor: Option<ReadingCursor>,
    pub last_reading_timestamp: Timestamp,
}

/// Default sampling period, in seconds.
pub const DEFAULT_SAMPLING_TIME: Timestamp = 10.0;

impl DeviceRecord {
    pub fn new(id: Uuid, serial_number: String, address: u8) -> Self {
        Self {
            id,
            serial_number,
            address,
            hardware_manufacturer: None,
            hardware_model: None,
            hardware_version: None,
            firmware_manufacturer: None,
            firmware_version: None,
            enabled: false,
            state: ConnectionState::Unknown,
            last_packet_sent_timestamp: 0.0,
            waiting_for_packet: None,
            transmit_attempts: 0,
            lost_timestamp: 0.0,
            sampling_time: DEFAULT_SAMPLING_TIME,
            reading_cursor: None,
            last_reading_timestamp: 0.0,
        }
    }
}

/// Bulk-read cursor: next bank and address to resume reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingCursor {
    pub kind: RegisterKind,
    pub address: u16,
}

/// A register owned by a device.
#[derive(Debug, Clone)]
pub struct RegisterRecord {
    pub id: Uuid,
    pub device_id: Uuid,
    pub kind: RegisterKind,
    pub address: u16,
    pub data_type: DataType,
    pub actual_value: Option<Value>,
    pub expected_value: Option<Value>,
    pub expected_pending: Option<Timestamp>,
    /// Only `Some` for ATTRIBUTE registers.
    pub name: Option<String>,
    pub settable: bool,
    pub queryable: bool,
}

impl RegisterRecord {
    pub fn new(id: Uuid, device_id: Uuid, kind: RegisterKind, address: u16, data_type: DataType) -> Self {
        Self {
            id,
            device_id,
            kind,
            address,
            data_type,
            actual_value: None,
            expected_value: None,
            expected_pending: None,
            name: None,
            settable: kind != RegisterKind::Input,
            queryable: true,
        }
    }
}

/// Transient per-device state carried only during pairing. Discarded once
/// the device is finalized into the main registry.
#[derive(Debug, Clone)]
pub struct DiscoveryRecord {
    pub serial_number: String,
    pub address: u8,
    pub max_packet_length: u16,
    pub hardware_manufacturer: String,
    pub hardware_model: String,
    pub hardware_version: String,
    pub firmware_manufacturer: String,
    pub firmware_version: String,
    pub input_register_count: u16,
    pub output_register_count: u16,
    pub attribute_register_count: u16,
    pub registers: Vec<DiscoveredRegister>,
}

impl DiscoveryRecord {
    /// True while any accumulated register is still `DataType::Unknown`.
    pub fn has_unresolved_registers(&self) -> bool {
        self.registers.iter().any(|r| r.data_type == DataType::Unknown)
    }
}

/// One register slot accumulated during structure interrogation.
#[derive(Debug, Clone)]
pub struct DiscoveredRegister {
    pub kind: RegisterKind,
    pub address: u16,
    pub data_type: DataType,
    pub name: Option<String>,
    pub settable: bool,
    pub queryable: bool,
}

impl DiscoveredRegister {
    pub fn new_unknown(kind: RegisterKind, address: u16) -> Self {
        Self {
            kind,
            address,
            data_type: DataType::Unknown,
            name: None,
            settable: kind != RegisterKind::Input,
            queryable: true,
        }
    }
}
