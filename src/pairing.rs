//! Discovery and pairing state machine.
//!
//! Three phases, resumed one step per tick: broadcast DISCOVER until
//! devices answer, interrogate one discovered candidate's register
//! structure until every register's data type is known, then finalize
//! (assign an address or flip the device to RUNNING) before moving to the
//! next candidate. Mutually exclusive with [`crate::publisher::Publisher`]
//! in the top-level tick; only one runs per call.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::builder;
use crate::frame::{AttributeStructure, DiscoveryReply};
use crate::registry::records::{DeviceRecord, DiscoveredRegister, DiscoveryRecord, RegisterRecord, Timestamp};
use crate::registry::Registry;
use crate::transport::TransportScheduler;
use crate::types::{
    device_attribute, ConnectionState, DataType, RegisterKind, MAX_DEVICE_ADDRESS, MIN_DEVICE_ADDRESS,
    UNASSIGNED_ADDRESS,
};
use crate::value::Value;

pub const MAX_DISCOVERY_ATTEMPTS: u32 = 5;
pub const MAX_DEVICE_ATTEMPTS: u32 = 5;
pub const MAX_TOTAL_TRANSMIT_ATTEMPTS: u32 = 100;
pub const DISCOVERY_BROADCAST_DELAY: Timestamp = 2.0;
pub const MAX_PAIRING_DELAY: Timestamp = 5.0;
pub const BROADCAST_WAITING_DELAY: Duration = Duration::from_secs(2);
const UNICAST_WAITING_DELAY: Duration = Duration::from_millis(500);

/// A candidate popped out of the discovered set and actively being
/// interrogated for its register structure.
struct Candidate {
    record: DiscoveryRecord,
    attempts: u32,
    started_at: Timestamp,
}

pub struct PairingEngine {
    gateway_serial_number: String,
    enabled: bool,
    discovered: HashMap<String, DiscoveryRecord>,
    discovery_attempts: u32,
    last_broadcast_timestamp: Timestamp,
    current: Option<Candidate>,
    total_transmit_attempts: u32,
}

impl PairingEngine {
    pub fn new(gateway_serial_number: String) -> Self {
        Self {
            gateway_serial_number,
            enabled: true,
            discovered: HashMap::new(),
            discovery_attempts: 0,
            last_broadcast_timestamp: 0.0,
            current: None,
            total_transmit_attempts: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Feed a DISCOVER reply into the accumulated set, deduplicated by
    /// serial number.
    pub fn append_device(&mut self, reply: DiscoveryReply) {
        if self.discovered.contains_key(&reply.serial_number) || self.is_current_serial(&reply.serial_number) {
            return;
        }
        self.discovered.insert(
            reply.serial_number.clone(),
            DiscoveryRecord {
                serial_number: reply.serial_number,
                address: reply.current_address,
                max_packet_length: reply.max_packet_length,
                hardware_manufacturer: reply.hardware_manufacturer,
                hardware_model: reply.hardware_model,
                hardware_version: reply.hardware_version,
                firmware_manufacturer: reply.firmware_manufacturer,
                firmware_version: reply.firmware_version,
                input_register_count: reply.input_register_count,
                output_register_count: reply.output_register_count,
                attribute_register_count: reply.attribute_register_count,
                registers: Vec::new(),
            },
        );
    }

    fn is_current_serial(&self, serial_number: &str) -> bool {
        self.current.as_ref().is_some_and(|c| c.record.serial_number == serial_number)
    }

    /// Feed a register structure reply into the current candidate, if
    /// any. Each reply updates that register's entry in the candidate's
    /// accumulated discovery set.
    pub fn append_register(
        &mut self,
        kind: RegisterKind,
        address: u16,
        data_type: DataType,
        attribute: Option<AttributeStructure>,
    ) {
        let Some(candidate) = &mut self.current else {
            return;
        };
        let Some(entry) = candidate
            .record
            .registers
            .iter_mut()
            .find(|r| r.kind == kind && r.address == address)
        else {
            return;
        };

        entry.data_type = data_type;
        if let Some(attribute) = attribute {
            entry.settable = attribute.settable;
            entry.queryable = attribute.queryable;
            entry.name = Some(attribute.name);
        }
    }

    /// Advance the pairing state machine by one step.
    pub fn handle(&mut self, registry: &mut Registry, transport: &mut TransportScheduler, now: Timestamp) {
        if self.total_transmit_attempts >= MAX_TOTAL_TRANSMIT_ATTEMPTS {
            warn!("pairing exceeded total transmit attempts, disabling");
            self.disable();
            return;
        }

        if self.current.is_none() {
            self.pop_next_candidate(registry, now);
        }

        let Some(candidate) = &self.current else {
            self.broadcast_discover(transport, now);
            return;
        };

        if candidate.record.has_unresolved_registers() {
            if now - candidate.started_at >= MAX_PAIRING_DELAY || candidate.attempts >= MAX_DEVICE_ATTEMPTS {
                warn!(serial = %candidate.record.serial_number, "abandoning pairing candidate");
                self.current = None;
                return;
            }
            self.interrogate_next_register(transport, now);
        } else {
            self.finalize_candidate(registry, transport, now);
        }
    }

    /// Pop one discovered device and validate it. Skips candidates whose
    /// advertised address conflicts with an already-known device.
    fn pop_next_candidate(&mut self, registry: &mut Registry, now: Timestamp) {
        while let Some(serial) = self.discovered.keys().next().cloned() {
            let record = self.discovered.remove(&serial).unwrap();

            if record.address != UNASSIGNED_ADDRESS {
                if let Some(existing) = registry.get_device_by_address(record.address) {
                    if existing.serial_number != record.serial_number {
                        warn!(
                            address = record.address,
                            serial = %record.serial_number,
                            "address conflict during pairing, skipping candidate"
                        );
                        continue;
                    }
                }
            }

            if let Some(existing) = registry.get_device_by_serial(&record.serial_number) {
                registry.set_state(existing.id, ConnectionState::Init);
            }

            let mut seeded = record;
            seeded.registers = seed_discovery_registers(&seeded);

            self.current = Some(Candidate { record: seeded, attempts: 0, started_at: now });
            return;
        }
    }

    fn broadcast_discover(&mut self, transport: &mut TransportScheduler, now: Timestamp) {
        if self.discovery_attempts >= MAX_DISCOVERY_ATTEMPTS {
            return;
        }
        if self.discovery_attempts > 0 && now - self.last_broadcast_timestamp < DISCOVERY_BROADCAST_DELAY {
            return;
        }

        let payload = builder::build_discover();
        if transport.broadcast(&payload, BROADCAST_WAITING_DELAY).is_ok() {
            self.discovery_attempts += 1;
            self.total_transmit_attempts += 1;
            self.last_broadcast_timestamp = now;
        }
    }

    fn interrogate_next_register(&mut self, transport: &mut TransportScheduler, _now: Timestamp) {
        let Some(candidate) = &mut self.current else { return };
        let Some(target) = candidate.record.registers.iter().find(|r| r.data_type == DataType::Unknown) else {
            return;
        };

        let result = match builder::build_read_single_register_structure(target.kind, target.address, &self.gateway_serial_number) {
            Ok(payload) => {
                if candidate.record.address == UNASSIGNED_ADDRESS {
                    transport.broadcast(&payload, BROADCAST_WAITING_DELAY)
                } else {
                    transport.send_unicast(candidate.record.address, &payload, UNICAST_WAITING_DELAY)
                }
            }
            Err(error) => {
                warn!(%error, "could not build register structure request");
                return;
            }
        };

        if result.is_ok() {
            candidate.attempts += 1;
            self.total_transmit_attempts += 1;
        }
    }

    fn finalize_candidate(&mut self, registry: &mut Registry, transport: &mut TransportScheduler, now: Timestamp) {
        let Some(Candidate { record, .. }) = self.current.take() else { return };

        if record.address == UNASSIGNED_ADDRESS {
            let Some(new_address) = free_address(registry) else {
                warn!("no free bus address available, abandoning pairing candidate");
                return;
            };

            let device_id = persist_discovered_device(registry, &record, UNASSIGNED_ADDRESS);
            info!(device = %device_id, address = new_address, "assigning address to newly paired device");

            if let Some(address_register) = registry.get_register_by_name(device_id, device_attribute::ADDRESS) {
                let payload = builder::build_write_single_register_value(
                    address_register.kind,
                    address_register.address,
                    address_register.data_type,
                    &Value::Uchar(new_address),
                    Some(device_attribute::ADDRESS),
                    &record.serial_number,
                );
                if let Ok(payload) = payload {
                    if transport.broadcast(&payload, BROADCAST_WAITING_DELAY).is_ok() {
                        registry.set_address(device_id, new_address);
                    }
                    self.total_transmit_attempts += 1;
                }
            }
        } else {
            let device_id = persist_discovered_device(registry, &record, record.address);
            info!(device = %device_id, "finalizing already-addressed paired device");

            if let Some(state_register) = registry.get_register_by_name(device_id, device_attribute::STATE) {
                let payload = builder::build_write_single_register_value(
                    state_register.kind,
                    state_register.address,
                    state_register.data_type,
                    &Value::Uchar(ConnectionState::Running as u8),
                    Some(device_attribute::STATE),
                    &record.serial_number,
                );
                if let Ok(payload) = payload {
                    let _ = transport.send_unicast(record.address, &payload, UNICAST_WAITING_DELAY);
                    self.total_transmit_attempts += 1;
                }
            }
        }

        let _ = now;
    }
}

fn seed_discovery_registers(record: &DiscoveryRecord) -> Vec<DiscoveredRegister> {
    let mut registers = Vec::new();
    for address in 0..record.input_register_count {
        registers.push(DiscoveredRegister::new_unknown(RegisterKind::Input, address));
    }
    for address in 0..record.output_register_count {
        registers.push(DiscoveredRegister::new_unknown(RegisterKind::Output, address));
    }
    for address in 0..record.attribute_register_count {
        registers.push(DiscoveredRegister::new_unknown(RegisterKind::Attribute, address));
    }
    registers
}

/// Persist a fully-interrogated candidate into the main registry:
/// `enable()` + `set_state(UNKNOWN)`.
fn persist_discovered_device(registry: &mut Registry, record: &DiscoveryRecord, address: u8) -> Uuid {
    let device = DeviceRecord {
        hardware_manufacturer: Some(record.hardware_manufacturer.clone()),
        hardware_model: Some(record.hardware_model.clone()),
        hardware_version: Some(record.hardware_version.clone()),
        firmware_manufacturer: Some(record.firmware_manufacturer.clone()),
        firmware_version: Some(record.firmware_version.clone()),
        ..DeviceRecord::new(Uuid::new_v4(), record.serial_number.clone(), address)
    };
    let device_id = registry.create_or_update_device(device);

    for discovered in &record.registers {
        let mut register = RegisterRecord::new(
            Uuid::new_v4(),
            device_id,
            discovered.kind,
            discovered.address,
            discovered.data_type,
        );
        register.name = discovered.name.clone();
        register.settable = discovered.settable;
        register.queryable = discovered.queryable;
        registry.create_or_update_register(register);
    }

    registry.set_enabled(device_id, true);
    registry.set_state(device_id, ConnectionState::Unknown);
    device_id
}

/// Scan `1..=253` for the lowest address not already held by a known
/// device.
fn free_address(registry: &Registry) -> Option<u8> {
    (MIN_DEVICE_ADDRESS..=MAX_DEVICE_ADDRESS).find(|addr| registry.get_device_by_address(*addr).is_none())
}
