//! In-memory device/register registry with secondary indices and a
//! change-event bus.
//!
//! Two flat tables keyed by UUID stand in for the source's device ↔
//! register back-pointers through a DI container: components hold a
//! `Registry` handle and look up by key instead of following a pointer.

pub mod events;
pub mod records;

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{ConnectionState, DataType, Opcode, RegisterKind};
use crate::value::Value;

use events::{EventBus, EventSubscriber, RegistryEvent};
use records::{DeviceRecord, ReadingCursor, RegisterRecord, Timestamp};

/// Owns every device and register the connector knows about.
#[derive(Debug, Default)]
pub struct Registry {
    devices: HashMap<Uuid, DeviceRecord>,
    registers: HashMap<Uuid, RegisterRecord>,

    device_by_address: HashMap<u8, Uuid>,
    device_by_serial: HashMap<String, Uuid>,
    register_by_location: HashMap<(Uuid, RegisterKind, u16), Uuid>,
    register_by_name: HashMap<(Uuid, String), Uuid>,

    events: EventBus,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.events.subscribe(subscriber);
    }

    // -- devices ----------------------------------------------------

    /// Insert a new device, or update an existing one found by serial
    /// number.
    pub fn create_or_update_device(&mut self, mut device: DeviceRecord) -> Uuid {
        if let Some(&existing_id) = self.device_by_serial.get(&device.serial_number) {
            device.id = existing_id;
            self.device_by_address.remove(&self.devices[&existing_id].address);
            self.device_by_address.insert(device.address, existing_id);
            self.devices.insert(existing_id, device.clone());
            self.events.emit(RegistryEvent::DeviceUpdated(device));
            existing_id
        } else {
            let id = device.id;
            self.device_by_serial.insert(device.serial_number.clone(), id);
            self.device_by_address.insert(device.address, id);
            self.devices.insert(id, device.clone());
            self.events.emit(RegistryEvent::DeviceCreated(device));
            id
        }
    }

    pub fn get_device(&self, id: Uuid) -> Option<&DeviceRecord> {
        self.devices.get(&id)
    }

    pub fn get_device_by_address(&self, address: u8) -> Option<&DeviceRecord> {
        self.device_by_address.get(&address).and_then(|id| self.devices.get(id))
    }

    pub fn get_device_by_serial(&self, serial_number: &str) -> Option<&DeviceRecord> {
        self.device_by_serial.get(serial_number).and_then(|id| self.devices.get(id))
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn device_ids(&self) -> Vec<Uuid> {
        self.devices.keys().copied().collect()
    }

    pub fn set_enabled(&mut self, device_id: Uuid, enabled: bool) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            device.enabled = enabled;
            let updated = device.clone();
            self.events.emit(RegistryEvent::DeviceUpdated(updated));
        }
    }

    /// Assigns state and emits exactly one event.
    pub fn set_state(&mut self, device_id: Uuid, state: ConnectionState) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            if device.state == state {
                return;
            }
            device.state = state;
            let updated = device.clone();
            debug!(device = %device_id, ?state, "device state changed");
            self.events.emit(RegistryEvent::DeviceUpdated(updated));
        }
    }

    pub fn set_address(&mut self, device_id: Uuid, address: u8) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            self.device_by_address.remove(&device.address);
            device.address = address;
            self.device_by_address.insert(address, device_id);
            let updated = device.clone();
            self.events.emit(RegistryEvent::DeviceUpdated(updated));
        }
    }

    /// Setting to a concrete opcode stamps the send timestamp and
    /// increments the attempt counter; setting to `None` leaves them
    /// untouched.
    pub fn set_waiting_for_packet(&mut self, device_id: Uuid, opcode: Option<Opcode>, now: Timestamp) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            device.waiting_for_packet = opcode;
            if opcode.is_some() {
                device.last_packet_sent_timestamp = now;
                device.transmit_attempts += 1;
            }
        }
    }

    /// `waiting_for_packet = None; transmit_attempts = 0`.
    pub fn reset_communication(&mut self, device_id: Uuid) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            device.waiting_for_packet = None;
            device.transmit_attempts = 0;
        }
    }

    pub fn set_lost_timestamp(&mut self, device_id: Uuid, now: Timestamp) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            device.lost_timestamp = now;
        }
    }

    pub fn set_reading_register(&mut self, device_id: Uuid, kind: RegisterKind, address: u16) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            device.reading_cursor = Some(ReadingCursor { kind, address });
        }
    }

    /// Clears the cursor; when `refresh_timestamp` is set, also stamps
    /// `last_reading_timestamp = now` (called once all banks for a device
    /// have been read through in a pass).
    pub fn reset_reading_register(&mut self, device_id: Uuid, refresh_timestamp: Option<Timestamp>) {
        if let Some(device) = self.devices.get_mut(&device_id) {
            device.reading_cursor = None;
            if let Some(now) = refresh_timestamp {
                device.last_reading_timestamp = now;
            }
        }
    }

    // -- registers ----------------------------------------------------

    pub fn create_or_update_register(&mut self, mut register: RegisterRecord) -> Uuid {
        let location = (register.device_id, register.kind, register.address);

        if let Some(&existing_id) = self.register_by_location.get(&location) {
            register.id = existing_id;
            if let Some(name) = &register.name {
                self.register_by_name.insert((register.device_id, name.clone()), existing_id);
            }
            self.registers.insert(existing_id, register.clone());
            self.events.emit(RegistryEvent::RegisterUpdated(register));
            existing_id
        } else {
            let id = register.id;
            self.register_by_location.insert(location, id);
            if let Some(name) = &register.name {
                self.register_by_name.insert((register.device_id, name.clone()), id);
            }
            self.registers.insert(id, register.clone());
            self.events.emit(RegistryEvent::RegisterCreated(register));
            id
        }
    }

    pub fn get_register(&self, id: Uuid) -> Option<&RegisterRecord> {
        self.registers.get(&id)
    }

    pub fn get_register_by_location(&self, device_id: Uuid, kind: RegisterKind, address: u16) -> Option<&RegisterRecord> {
        self.register_by_location
            .get(&(device_id, kind, address))
            .and_then(|id| self.registers.get(id))
    }

    pub fn get_register_by_name(&self, device_id: Uuid, name: &str) -> Option<&RegisterRecord> {
        self.register_by_name
            .get(&(device_id, name.to_owned()))
            .and_then(|id| self.registers.get(id))
    }

    pub fn registers_for_device(&self, device_id: Uuid, kind: RegisterKind) -> impl Iterator<Item = &RegisterRecord> {
        self.registers.values().filter(move |r| r.device_id == device_id && r.kind == kind)
    }

    pub fn data_type_of(&self, device_id: Uuid, kind: RegisterKind, address: u16) -> Option<DataType> {
        self.get_register_by_location(device_id, kind, address).map(|r| r.data_type)
    }

    /// Assigns `actual`; if it equals the currently pending `expected`,
    /// also clears `expected` and `expected_pending` atomically.
    pub fn set_actual_value(&mut self, register_id: Uuid, value: Value) {
        let Some(register) = self.registers.get_mut(&register_id) else {
            return;
        };

        register.actual_value = Some(value.clone());
        if register.expected_value.as_ref() == Some(&value) {
            register.expected_value = None;
            register.expected_pending = None;
        }

        let updated = register.clone();
        let event = if updated.kind == RegisterKind::Attribute {
            RegistryEvent::AttributeActualValueChanged(updated)
        } else {
            RegistryEvent::RegisterActualValueChanged(updated)
        };
        self.events.emit(event);
    }

    /// Assigns `expected`; clears `expected_pending` when the new value
    /// is non-null.
    pub fn set_expected_value(&mut self, register_id: Uuid, value: Option<Value>) {
        if let Some(register) = self.registers.get_mut(&register_id) {
            let is_some = value.is_some();
            register.expected_value = value;
            if is_some {
                register.expected_pending = None;
            }
        }
    }

    pub fn set_expected_pending(&mut self, register_id: Uuid, now: Timestamp) {
        if let Some(register) = self.registers.get_mut(&register_id) {
            register.expected_pending = Some(now);
        }
    }

    /// Cancels a write whose value could not be encoded: clears
    /// `expected_value` so a known-bad value does not loop forever.
    pub fn cancel_expected_value(&mut self, register_id: Uuid) {
        if let Some(register) = self.registers.get_mut(&register_id) {
            warn!(register = %register_id, "clearing unencodable expected value");
            register.expected_value = None;
            register.expected_pending = None;
        }
    }
}
