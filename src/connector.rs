//! Top-level engine wiring: owns the registry, transport, publisher,
//! pairing engine and receiver, and exposes the host-facing interface
//! (`initialize`, `start`, `stop`, `handle`, `has_unfinished_tasks`,
//! `write_property`).

use tracing::info;
use uuid::Uuid;

use crate::error::ConnectorError;
use crate::pairing::PairingEngine;
use crate::publisher::Publisher;
use crate::receiver::Receiver;
use crate::registry::records::{DeviceRecord, RegisterRecord, Timestamp};
use crate::registry::Registry;
use crate::settings::Settings;
use crate::transport::{FramingLink, SerialFramingLink, TransportScheduler};
use crate::types::{device_attribute, ConnectionState, DataType, RegisterKind};
use crate::value::Value;

/// A device as loaded from the host's persistent store on startup.
pub struct DeviceDescriptor {
    pub id: Uuid,
    pub serial_number: String,
    pub address: u8,
    pub hardware_manufacturer: Option<String>,
    pub hardware_model: Option<String>,
    pub hardware_version: Option<String>,
    pub firmware_manufacturer: Option<String>,
    pub firmware_version: Option<String>,
    pub enabled: bool,
    pub properties: Vec<PropertyDescriptor>,
}

/// One property row from the persistent store. `identifier` follows
/// `<prefix>_<NN>` for channel (INPUT/OUTPUT) registers, or a well-known
/// attribute name (`state`, `address`, `max_packet_length`, ...) for
/// device-level ATTRIBUTE registers.
pub struct PropertyDescriptor {
    pub identifier: String,
    pub data_type: DataType,
    pub settable: bool,
    pub queryable: bool,
    pub value: Option<Value>,
}

pub struct Connector {
    settings: Settings,
    registry: Registry,
    transport: Option<TransportScheduler>,
    publisher: Publisher,
    pairing: PairingEngine,
    receiver: Receiver,
    running: bool,
}

impl Connector {
    pub fn new(settings: Settings) -> Self {
        let pairing = PairingEngine::new(settings.gateway_serial_number.clone());
        Self {
            settings,
            registry: Registry::new(),
            transport: None,
            publisher: Publisher::new(),
            pairing,
            receiver: Receiver::new(),
            running: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Load one device plus its properties, bootstrapped from the host's
    /// persistent store, into the registry.
    pub fn load_device(&mut self, descriptor: DeviceDescriptor) -> Uuid {
        let device = DeviceRecord {
            hardware_manufacturer: descriptor.hardware_manufacturer,
            hardware_model: descriptor.hardware_model,
            hardware_version: descriptor.hardware_version,
            firmware_manufacturer: descriptor.firmware_manufacturer,
            firmware_version: descriptor.firmware_version,
            enabled: descriptor.enabled,
            ..DeviceRecord::new(descriptor.id, descriptor.serial_number, descriptor.address)
        };
        let device_id = self.registry.create_or_update_device(device);

        for property in descriptor.properties {
            let Some((kind, address, name)) = parse_property_identifier(&property.identifier) else {
                continue;
            };
            let mut register = RegisterRecord::new(Uuid::new_v4(), device_id, kind, address, property.data_type);
            register.settable = property.settable;
            register.queryable = property.queryable;
            register.name = name;
            register.actual_value = property.value;
            self.registry.create_or_update_register(register);
        }

        device_id
    }

    /// Acquire the serial link. Scoped to this call rather than to
    /// construction, so a host can build a `Connector` before it knows
    /// which interface to open.
    ///
    /// Uses the default raw-serial [`SerialFramingLink`] adapter; a caller
    /// that needs a different framing implementation uses
    /// [`Connector::initialize_with_link`] instead.
    pub fn initialize(&mut self) -> Result<(), ConnectorError> {
        let link = SerialFramingLink::open(&self.settings.interface, self.settings.baud_rate)?;
        self.initialize_with_link(Box::new(link));
        Ok(())
    }

    /// Acquire the link using a caller-supplied [`FramingLink`] instead of
    /// the default serial adapter. This is how a real PJON-equivalent
    /// framing library, or a test harness, plugs in.
    pub fn initialize_with_link(&mut self, link: Box<dyn FramingLink>) {
        self.transport = Some(TransportScheduler::new(link));
    }

    pub fn start(&mut self) {
        info!(address = self.settings.address, "connector starting");
        self.running = true;
    }

    /// Release the link and drop every device back to UNKNOWN.
    pub fn stop(&mut self) {
        info!("connector stopping");
        self.running = false;
        for device_id in self.registry.device_ids() {
            self.registry.set_state(device_id, ConnectionState::Unknown);
        }
        self.transport = None;
    }

    /// Enable or disable the pairing engine. Pairing and normal
    /// publishing are mutually exclusive; only one runs per tick.
    pub fn set_pairing_enabled(&mut self, enabled: bool) {
        if enabled {
            self.pairing = PairingEngine::new(self.settings.gateway_serial_number.clone());
        } else {
            self.pairing.disable();
        }
    }

    /// Run one tick: receive → parse → dispatch → pairing-or-publish →
    /// transport pump.
    pub fn handle(&mut self, now: Timestamp) {
        let Some(transport) = &mut self.transport else {
            return;
        };

        self.receiver.handle(&mut self.registry, transport, &mut self.pairing, now);

        if !self.running {
            return;
        }

        if self.pairing.enabled() {
            self.pairing.handle(&mut self.registry, transport, now);
        } else {
            for device_id in self.registry.device_ids() {
                self.publisher.handle(&mut self.registry, transport, device_id, now);
            }
        }

        transport.tick();
    }

    /// Whether the transport still has outstanding requests in flight.
    pub fn has_unfinished_tasks(&mut self) -> bool {
        match &mut self.transport {
            Some(transport) => transport.tick() > 0,
            None => false,
        }
    }

    /// Request a write: sets `expected_value` on the register, to be
    /// picked up by the publisher on a later tick.
    pub fn write_property(&mut self, register_id: Uuid, expected_value: Value) {
        self.registry.set_expected_value(register_id, Some(expected_value));
    }
}

/// Parse a persistent-store property identifier into a register location.
///
/// Channel properties follow `<prefix>_<NN>` with a 1-based bank address;
/// `input`/`output` map to their channel kind at `NN - 1`. Device-static
/// properties (`state`, `address`, `max_packet_length`) are matched by
/// their bare well-known name instead: they are singleton ATTRIBUTE
/// registers at address 0, not a banked series, and carry no numeric
/// suffix.
fn parse_property_identifier(identifier: &str) -> Option<(RegisterKind, u16, Option<String>)> {
    if matches!(
        identifier,
        device_attribute::STATE | device_attribute::ADDRESS | device_attribute::MAX_PACKET_LENGTH
    ) {
        return Some((RegisterKind::Attribute, 0, Some(identifier.to_owned())));
    }

    let (prefix, suffix) = identifier.rsplit_once('_')?;
    let one_based: u16 = suffix.parse().ok()?;
    let address = one_based.saturating_sub(1);

    Some(match prefix {
        "input" => (RegisterKind::Input, address, None),
        "output" => (RegisterKind::Output, address, None),
        other => (RegisterKind::Attribute, address, Some(other.to_owned())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_property_identifier_is_one_based() {
        assert_eq!(parse_property_identifier("input_01"), Some((RegisterKind::Input, 0, None)));
        assert_eq!(parse_property_identifier("output_03"), Some((RegisterKind::Output, 2, None)));
    }

    #[test]
    fn well_known_attribute_identifiers_match_by_bare_name() {
        assert_eq!(
            parse_property_identifier("state"),
            Some((RegisterKind::Attribute, 0, Some("state".to_owned())))
        );
        assert_eq!(
            parse_property_identifier("address"),
            Some((RegisterKind::Attribute, 0, Some("address".to_owned())))
        );
        assert_eq!(
            parse_property_identifier("max_packet_length"),
            Some((RegisterKind::Attribute, 0, Some("max_packet_length".to_owned())))
        );
    }

    #[test]
    fn identifier_without_bank_address_is_skipped() {
        assert_eq!(parse_property_identifier("whatever"), None);
    }
}
