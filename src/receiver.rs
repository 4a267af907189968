//! Wire bytes → parser → per-message handler → registry mutation.
//!
//! The receiver never talks to the link directly: it drains whatever
//! complete frames the transport scheduler already pumped off the wire,
//! validates and parses each one, and routes it to a registry mutation or
//! into the pairing engine.

use tracing::{debug, warn};

use crate::frame::parser::RegisterTypeLookup;
use crate::frame::{parser, validator, Message};
use crate::pairing::PairingEngine;
use crate::registry::records::Timestamp;
use crate::registry::Registry;
use crate::transport::TransportScheduler;
use crate::types::{ConnectionState, Opcode};

pub struct Receiver;

impl Receiver {
    pub fn new() -> Self {
        Self
    }

    /// Drain and dispatch every frame the transport has queued.
    pub fn handle(
        &mut self,
        registry: &mut Registry,
        transport: &mut TransportScheduler,
        pairing: &mut PairingEngine,
        now: Timestamp,
    ) {
        for frame in transport.drain_inbound() {
            let opcode = match validator::validate(&frame.payload) {
                Ok(opcode) => opcode,
                Err(error) => {
                    warn!(%error, sender = frame.sender_address, "dropping frame that failed validation");
                    continue;
                }
            };

            let device_id = registry.get_device_by_address(frame.sender_address).map(|d| d.id);
            let lookup = |kind: crate::types::RegisterKind, address: u16| {
                device_id.and_then(|id| registry.data_type_of(id, kind, address))
            };
            let lookup_ref: RegisterTypeLookup = &lookup;

            let parsed = match parser::parse(opcode, &frame.payload, frame.sender_address, lookup_ref) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!(%error, sender = frame.sender_address, "dropping frame that failed to parse");
                    continue;
                }
            };

            self.dispatch(registry, pairing, opcode, parsed.message, frame.sender_address, now);
        }
    }

    fn dispatch(
        &mut self,
        registry: &mut Registry,
        pairing: &mut PairingEngine,
        opcode: Opcode,
        message: Message,
        sender_address: u8,
        now: Timestamp,
    ) {
        match message {
            Message::Pong => {
                if let Some(device) = registry.get_device_by_address(sender_address) {
                    let device_id = device.id;
                    let was_lost = device.state == ConnectionState::Lost;
                    registry.reset_communication(device_id);
                    if was_lost {
                        registry.set_state(device_id, ConnectionState::Unknown);
                    }
                }
            }

            Message::SingleRegisterValue { kind, address, value } => {
                let Some(device) = registry.get_device_by_address(sender_address) else { return };
                let device_id = device.id;
                if let Some(register) = registry.get_register_by_location(device_id, kind, address) {
                    registry.set_actual_value(register.id, value);
                }
                registry.reset_communication(device_id);
                if opcode == Opcode::ReportSingleRegisterValue {
                    registry.reset_reading_register(device_id, None);
                }
                let _ = now;
            }

            Message::MultipleRegisterValues { kind, start_address, values } => {
                let Some(device) = registry.get_device_by_address(sender_address) else { return };
                let device_id = device.id;
                for (offset, value) in values.into_iter().enumerate() {
                    let address = start_address + offset as u16;
                    if let Some(register) = registry.get_register_by_location(device_id, kind, address) {
                        registry.set_actual_value(register.id, value);
                    }
                }
                registry.reset_communication(device_id);
            }

            Message::RegisterStructure { kind, address, data_type, attribute } => {
                debug!(?kind, address, ?data_type, "received register structure reply");
                pairing.append_register(kind, address, data_type, attribute);
            }

            Message::Discovery(reply) => {
                debug!(serial = %reply.serial_number, "received discovery reply");
                pairing.append_device(reply);
            }
        }
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}
