//! Per-device poll/write state machine.
//!
//! `Publisher::handle` is called once per known device per tick. At most
//! one action fires per device, checked in a fixed order: address
//! resolution, lost escalation, lost probing, the response gate, the
//! state query, then — only once RUNNING — writes ahead of reads.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::frame::builder;
use crate::registry::records::{ReadingCursor, Timestamp};
use crate::registry::Registry;
use crate::transport::TransportScheduler;
use crate::types::{device_attribute, ConnectionState, Opcode, RegisterKind};

/// Consecutive unanswered sends before a device is declared LOST.
pub const MAX_TRANSMIT_ATTEMPTS: u32 = 5;
/// Seconds between PING probes once LOST.
pub const PING_DELAY: Timestamp = 15.0;
/// Minimum seconds between sends to the same device while one is outstanding.
pub const PACKET_RESPONSE_DELAY: Timestamp = 0.5;
/// How long the transport is given to collect a reply within one send call.
pub const PACKET_RESPONSE_WAITING_TIME: Duration = Duration::from_millis(500);
/// Fallback `max_packet_length` when the device has not reported one.
pub const DEFAULT_MAX_PACKET_LENGTH: u16 = 80;

pub struct Publisher;

impl Publisher {
    pub fn new() -> Self {
        Self
    }

    /// Run one device's share of a tick. Returns `true` if an action fired.
    pub fn handle(
        &mut self,
        registry: &mut Registry,
        transport: &mut TransportScheduler,
        device_id: Uuid,
        now: Timestamp,
    ) -> bool {
        let Some(device) = registry.get_device(device_id) else {
            return false;
        };

        // 1. Address resolution.
        if registry.get_register_by_name(device_id, device_attribute::ADDRESS).is_none() {
            warn!(device = %device_id, "device has no address attribute register, disabling");
            registry.set_enabled(device_id, false);
            return true;
        }

        let device = registry.get_device(device_id).unwrap();
        let address = device.address;
        let serial_number = device.serial_number.clone();
        let state = device.state;
        let transmit_attempts = device.transmit_attempts;
        let waiting_for_packet = device.waiting_for_packet;
        let last_packet_sent_timestamp = device.last_packet_sent_timestamp;

        // 2. Lost escalation.
        if transmit_attempts >= MAX_TRANSMIT_ATTEMPTS {
            if state != ConnectionState::Lost {
                info!(device = %device_id, "device exceeded transmit attempts, marking LOST");
                registry.set_state(device_id, ConnectionState::Lost);
            } else {
                registry.reset_communication(device_id);
            }
            return true;
        }

        // 3. Lost probing.
        if state == ConnectionState::Lost {
            if now - last_packet_sent_timestamp >= PING_DELAY {
                let payload = builder::build_ping();
                if send_unicast(registry, transport, device_id, address, &payload, now, Opcode::Pong) {
                    return true;
                }
            }
            return false;
        }

        // 4. Gating.
        if waiting_for_packet.is_some() && now - last_packet_sent_timestamp < PACKET_RESPONSE_DELAY {
            return false;
        }

        // 5. State query.
        if state == ConnectionState::Unknown {
            let Some(state_register) = registry.get_register_by_name(device_id, device_attribute::STATE) else {
                return false;
            };
            let payload = builder::build_read_single_register_value(RegisterKind::Attribute, state_register.address);
            return send_unicast(
                registry,
                transport,
                device_id,
                address,
                &payload,
                now,
                Opcode::ReadSingleRegisterValue,
            );
        }

        if state != ConnectionState::Running {
            return false;
        }

        // 6. Writes, then reads.
        if let Some(register_id) = find_pending_write(registry, device_id) {
            return self.send_write(registry, transport, device_id, address, &serial_number, register_id, now);
        }

        let device = registry.get_device(device_id).unwrap();
        if now - device.last_reading_timestamp >= device.sampling_time {
            return self.send_read(registry, transport, device_id, address, now);
        }

        false
    }

    fn send_write(
        &mut self,
        registry: &mut Registry,
        transport: &mut TransportScheduler,
        device_id: Uuid,
        address: u8,
        serial_number: &str,
        register_id: Uuid,
        now: Timestamp,
    ) -> bool {
        let register = registry.get_register(register_id).unwrap().clone();
        let Some(value) = register.expected_value.clone() else {
            return false;
        };

        match builder::build_write_single_register_value(
            register.kind,
            register.address,
            register.data_type,
            &value,
            register.name.as_deref(),
            serial_number,
        ) {
            Ok(payload) => {
                registry.set_expected_pending(register_id, now);
                send_unicast(
                    registry,
                    transport,
                    device_id,
                    address,
                    &payload,
                    now,
                    Opcode::WriteSingleRegisterValue,
                )
            }
            Err(error) => {
                warn!(register = %register_id, %error, "canceling write, value cannot be encoded");
                registry.cancel_expected_value(register_id);
                false
            }
        }
    }

    fn send_read(
        &mut self,
        registry: &mut Registry,
        transport: &mut TransportScheduler,
        device_id: Uuid,
        address: u8,
        now: Timestamp,
    ) -> bool {
        let max_packet_length = registry
            .get_register_by_name(device_id, device_attribute::MAX_PACKET_LENGTH)
            .and_then(|r| match r.actual_value {
                Some(crate::value::Value::Uchar(v)) => Some(v as u16),
                Some(crate::value::Value::Uint(v)) => Some(v as u16),
                _ => None,
            })
            .unwrap_or(DEFAULT_MAX_PACKET_LENGTH);
        let max_readable = max_readable_registers(max_packet_length);

        let mut cursor = registry
            .get_device(device_id)
            .and_then(|d| d.reading_cursor)
            .unwrap_or(ReadingCursor { kind: RegisterKind::Input, address: 0 });

        loop {
            let bank_size = registry.registers_for_device(device_id, cursor.kind).count() as u16;

            if cursor.address >= bank_size {
                match next_bank(cursor.kind) {
                    Some(next_kind) => {
                        cursor = ReadingCursor { kind: next_kind, address: 0 };
                        continue;
                    }
                    None => {
                        registry.reset_reading_register(device_id, Some(now));
                        return false;
                    }
                }
            }

            if bank_size == 0 {
                match next_bank(cursor.kind) {
                    Some(next_kind) => {
                        cursor = ReadingCursor { kind: next_kind, address: 0 };
                        continue;
                    }
                    None => {
                        registry.reset_reading_register(device_id, Some(now));
                        return false;
                    }
                }
            }

            let count = max_readable.min(bank_size - cursor.address);
            let payload = builder::build_read_multiple_registers_values(cursor.kind, cursor.address, count);

            let advanced = cursor.address + count;
            registry.set_reading_register(device_id, cursor.kind, advanced);

            return send_unicast(
                registry,
                transport,
                device_id,
                address,
                &payload,
                now,
                Opcode::ReadMultipleRegistersValues,
            );
        }
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

/// `(max_packet_length - 8) / 4`, floored at 1 register per packet.
fn max_readable_registers(max_packet_length: u16) -> u16 {
    max_packet_length.saturating_sub(8) / 4
}

fn next_bank(kind: RegisterKind) -> Option<RegisterKind> {
    match kind {
        RegisterKind::Input => Some(RegisterKind::Output),
        RegisterKind::Output => None,
        RegisterKind::Attribute => None,
    }
}

fn find_pending_write(registry: &Registry, device_id: Uuid) -> Option<Uuid> {
    [RegisterKind::Output, RegisterKind::Attribute].into_iter().find_map(|kind| {
        let mut candidates: Vec<_> = registry
            .registers_for_device(device_id, kind)
            .filter(|r| r.expected_value.is_some() && r.expected_pending.is_none())
            .collect();
        candidates.sort_by_key(|r| r.address);
        candidates.first().map(|r| r.id)
    })
}

/// Sends and applies the gate update: on success `waiting_for_packet` is
/// set to the expected reply opcode; on transport failure it is cleared
/// immediately and the attempt does not count.
fn send_unicast(
    registry: &mut Registry,
    transport: &mut TransportScheduler,
    device_id: Uuid,
    address: u8,
    payload: &[u8],
    now: Timestamp,
    expected_reply: Opcode,
) -> bool {
    match transport.send_unicast(address, payload, PACKET_RESPONSE_WAITING_TIME) {
        Ok(()) => {
            registry.set_waiting_for_packet(device_id, Some(expected_reply), now);
            true
        }
        Err(error) => {
            warn!(device = %device_id, %error, "transport submission failed");
            registry.set_waiting_for_packet(device_id, None, now);
            false
        }
    }
}
