//! End-to-end scenarios wiring the codec, registry, transport, publisher,
//! pairing engine and receiver together the way a host actually would,
//! driven by a fake link instead of a real port.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use fb_bus_connector::error::TransportError;
use fb_bus_connector::frame::{builder, DiscoveryReply};
use fb_bus_connector::pairing::PairingEngine;
use fb_bus_connector::publisher::Publisher;
use fb_bus_connector::receiver::Receiver;
use fb_bus_connector::registry::records::{DeviceRecord, RegisterRecord};
use fb_bus_connector::registry::Registry;
use fb_bus_connector::transport::{FramingLink, InboundFrame, TransportScheduler};
use fb_bus_connector::types::{device_attribute, ConnectionState, DataType, Opcode, RegisterKind};
use fb_bus_connector::value::Value;

/// A [`FramingLink`] double recording every send and replaying queued
/// inbound frames on the next `poll`. `Arc<Mutex<..>>` rather than
/// `Rc<RefCell<..>>` because `FramingLink` requires `Send`.
#[derive(Clone, Default)]
struct Shared {
    sent: Arc<Mutex<Vec<(Option<u8>, Vec<u8>)>>>,
    queued: Arc<Mutex<VecDeque<InboundFrame>>>,
}

impl Shared {
    fn push_reply(&self, payload: Vec<u8>, sender_address: u8) {
        self.queued.lock().unwrap().push_back(InboundFrame { payload, sender_address });
    }

    fn sent_frames(&self) -> Vec<(Option<u8>, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }
}

struct FakeLink(Shared);

impl FramingLink for FakeLink {
    fn send_unicast(&mut self, address: u8, payload: &[u8]) -> Result<(), TransportError> {
        self.0.sent.lock().unwrap().push((Some(address), payload.to_vec()));
        Ok(())
    }

    fn broadcast(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.0.sent.lock().unwrap().push((None, payload.to_vec()));
        Ok(())
    }

    fn poll(&mut self, _wait: Duration) -> Vec<InboundFrame> {
        self.0.queued.lock().unwrap().drain(..).collect()
    }
}

fn transport_with(shared: &Shared) -> TransportScheduler {
    TransportScheduler::new(Box::new(FakeLink(shared.clone())))
}

// S1: a device with one unanswered PING gets its communication counters
// cleared the moment a PONG arrives.
#[test]
fn ping_round_trip_resets_communication_counters() {
    let mut registry = Registry::new();
    let device_id = registry.create_or_update_device(DeviceRecord::new(Uuid::new_v4(), "SN-5".into(), 5));
    registry.set_waiting_for_packet(device_id, Some(Opcode::Ping), 10.0);

    let shared = Shared::default();
    shared.push_reply(vec![0x01, 0x02], 5);
    let mut transport = transport_with(&shared);
    transport.tick();

    let mut receiver = Receiver::new();
    let mut pairing = PairingEngine::new("GW".into());
    receiver.handle(&mut registry, &mut transport, &mut pairing, 11.0);

    let device = registry.get_device(device_id).unwrap();
    assert_eq!(device.waiting_for_packet, None);
    assert_eq!(device.transmit_attempts, 0);
}

// S2: a single-register reply updates the matching register's actual
// value and fires exactly one change event.
#[test]
fn single_register_read_reply_updates_actual_value() {
    let mut registry = Registry::new();
    let device_id = registry.create_or_update_device(DeviceRecord::new(Uuid::new_v4(), "SN-3".into(), 1));
    let register_id = registry.create_or_update_register(RegisterRecord::new(
        Uuid::new_v4(),
        device_id,
        RegisterKind::Input,
        3,
        DataType::Uint,
    ));

    let shared = Shared::default();
    shared.push_reply(vec![0x01, 0x21, 0x01, 0x00, 0x03, 0x2A, 0x00, 0x00, 0x00], 1);
    let mut transport = transport_with(&shared);
    transport.tick();

    let mut receiver = Receiver::new();
    let mut pairing = PairingEngine::new("GW".into());
    receiver.handle(&mut registry, &mut transport, &mut pairing, 0.0);

    let register = registry.get_register(register_id).unwrap();
    assert_eq!(register.actual_value, Some(Value::Uint(42)));
}

// S3: a multi-register reply decodes each slot with the target
// register's own data type, in address order.
#[test]
fn multiple_register_read_reply_updates_each_register_in_order() {
    let mut registry = Registry::new();
    let device_id = registry.create_or_update_device(DeviceRecord::new(Uuid::new_v4(), "SN-9".into(), 2));
    let uchar_id = registry.create_or_update_register(RegisterRecord::new(
        Uuid::new_v4(),
        device_id,
        RegisterKind::Input,
        0,
        DataType::Uchar,
    ));
    let ushort_id = registry.create_or_update_register(RegisterRecord::new(
        Uuid::new_v4(),
        device_id,
        RegisterKind::Input,
        1,
        DataType::Ushort,
    ));
    let float_id = registry.create_or_update_register(RegisterRecord::new(
        Uuid::new_v4(),
        device_id,
        RegisterKind::Input,
        2,
        DataType::Float,
    ));

    let mut payload = vec![0x01, 0x22, 0x01, 0x00, 0x00, 0x03];
    payload.extend_from_slice(&1u32.to_le_bytes());
    payload.extend_from_slice(&300u32.to_le_bytes());
    payload.extend_from_slice(&1.5f32.to_le_bytes());

    let shared = Shared::default();
    shared.push_reply(payload, 2);
    let mut transport = transport_with(&shared);
    transport.tick();

    let mut receiver = Receiver::new();
    let mut pairing = PairingEngine::new("GW".into());
    receiver.handle(&mut registry, &mut transport, &mut pairing, 0.0);

    assert_eq!(registry.get_register(uchar_id).unwrap().actual_value, Some(Value::Uchar(1)));
    assert_eq!(registry.get_register(ushort_id).unwrap().actual_value, Some(Value::Ushort(300)));
    assert_eq!(registry.get_register(float_id).unwrap().actual_value, Some(Value::Float(1.5)));
}

// S4: a write whose pending value doesn't match the register's declared
// type is never sent; the bad expected value is dropped instead.
#[test]
fn write_with_mismatched_type_is_canceled_without_sending() {
    let mut registry = Registry::new();
    let device_id = registry.create_or_update_device(DeviceRecord::new(Uuid::new_v4(), "SN-1".into(), 1));
    registry.set_state(device_id, ConnectionState::Running);

    let mut address_register = RegisterRecord::new(
        Uuid::new_v4(),
        device_id,
        RegisterKind::Attribute,
        0,
        DataType::Uchar,
    );
    address_register.name = Some(device_attribute::ADDRESS.to_owned());
    registry.create_or_update_register(address_register);

    let output_register =
        RegisterRecord::new(Uuid::new_v4(), device_id, RegisterKind::Output, 0, DataType::Boolean);
    let output_id = registry.create_or_update_register(output_register);
    registry.set_expected_value(output_id, Some(Value::String("hello".into())));

    let shared = Shared::default();
    let mut transport = transport_with(&shared);
    let mut publisher = Publisher::new();

    publisher.handle(&mut registry, &mut transport, device_id, 100.0);

    let register = registry.get_register(output_id).unwrap();
    assert_eq!(register.expected_value, None);
    assert_eq!(register.expected_pending, None);
    assert!(shared.sent_frames().is_empty());
}

// S5: five unanswered sends declare a device LOST; once probing resumes
// and a PONG arrives the device falls back to UNKNOWN and the next tick
// re-queries its state attribute.
#[test]
fn lost_device_recovers_through_ping_and_requeries_state() {
    let mut registry = Registry::new();
    let device_id = registry.create_or_update_device(DeviceRecord::new(Uuid::new_v4(), "SN-7".into(), 7));
    registry.set_state(device_id, ConnectionState::Running);

    let mut address_register = RegisterRecord::new(
        Uuid::new_v4(),
        device_id,
        RegisterKind::Attribute,
        0,
        DataType::Uchar,
    );
    address_register.name = Some(device_attribute::ADDRESS.to_owned());
    registry.create_or_update_register(address_register);

    let mut state_register =
        RegisterRecord::new(Uuid::new_v4(), device_id, RegisterKind::Attribute, 1, DataType::Uchar);
    state_register.name = Some(device_attribute::STATE.to_owned());
    registry.create_or_update_register(state_register);

    for t in [10.0, 11.0, 12.0, 13.0, 14.0] {
        registry.set_waiting_for_packet(device_id, Some(Opcode::ReadSingleRegisterValue), t);
    }
    assert_eq!(registry.get_device(device_id).unwrap().transmit_attempts, 5);

    let shared = Shared::default();
    let mut transport = transport_with(&shared);
    let mut publisher = Publisher::new();

    // Attempt count trips the LOST transition.
    publisher.handle(&mut registry, &mut transport, device_id, 20.0);
    assert_eq!(registry.get_device(device_id).unwrap().state, ConnectionState::Lost);

    // Still over the threshold: counters reset before a ping is allowed.
    publisher.handle(&mut registry, &mut transport, device_id, 21.0);
    assert_eq!(registry.get_device(device_id).unwrap().transmit_attempts, 0);

    // Enough time has passed since the last send: a PING goes out.
    publisher.handle(&mut registry, &mut transport, device_id, 14.0 + 15.0);
    let sent = shared.sent_frames();
    assert_eq!(sent.last(), Some(&(Some(7), builder::build_ping())));

    // The device answers.
    shared.push_reply(vec![0x01, 0x02], 7);
    transport.tick();
    let mut receiver = Receiver::new();
    let mut pairing = PairingEngine::new("GW".into());
    receiver.handle(&mut registry, &mut transport, &mut pairing, 30.0);

    let device = registry.get_device(device_id).unwrap();
    assert_eq!(device.state, ConnectionState::Unknown);
    assert_eq!(device.transmit_attempts, 0);
    assert_eq!(device.waiting_for_packet, None);

    // Next tick re-queries the state attribute rather than resuming reads.
    publisher.handle(&mut registry, &mut transport, device_id, 31.0);
    let sent = shared.sent_frames();
    assert_eq!(
        sent.last(),
        Some(&(Some(7), builder::build_read_single_register_value(RegisterKind::Attribute, 1)))
    );
}

// S6: a fresh, unaddressed device is interrogated register by register
// and finalized with a freshly assigned bus address.
#[test]
fn pairing_a_new_device_assigns_a_free_address() {
    let mut registry = Registry::new();
    let mut pairing = PairingEngine::new("GW-1".into());
    let shared = Shared::default();
    let mut transport = transport_with(&shared);

    pairing.append_device(DiscoveryReply {
        current_address: 255,
        max_packet_length: 80,
        serial_number: "SN-ABC".into(),
        hardware_version: "hw1".into(),
        hardware_model: "model".into(),
        hardware_manufacturer: "acme".into(),
        firmware_version: "fw1".into(),
        firmware_manufacturer: "acme".into(),
        input_register_count: 1,
        output_register_count: 0,
        attribute_register_count: 2,
    });

    // Round 1: interrogate the INPUT register.
    pairing.handle(&mut registry, &mut transport, 0.0);
    pairing.append_register(RegisterKind::Input, 0, DataType::Uint, None);

    // Round 2 and 3: interrogate the two ATTRIBUTE registers.
    pairing.handle(&mut registry, &mut transport, 0.5);
    pairing.append_register(
        RegisterKind::Attribute,
        0,
        DataType::Uchar,
        Some(fb_bus_connector::frame::AttributeStructure {
            settable: true,
            queryable: true,
            name: device_attribute::ADDRESS.to_owned(),
        }),
    );

    pairing.handle(&mut registry, &mut transport, 1.0);
    pairing.append_register(
        RegisterKind::Attribute,
        1,
        DataType::Uchar,
        Some(fb_bus_connector::frame::AttributeStructure {
            settable: true,
            queryable: true,
            name: device_attribute::STATE.to_owned(),
        }),
    );

    // Round 4: every register is resolved, finalize the candidate.
    pairing.handle(&mut registry, &mut transport, 1.5);

    let device = registry.get_device_by_serial("SN-ABC").expect("device persisted");
    assert!(device.enabled);
    assert_eq!(device.state, ConnectionState::Unknown);

    let sent = shared.sent_frames();
    assert_eq!(sent.len(), 4, "three structure probes plus the address assignment");
    assert!(sent.iter().all(|(address, _)| address.is_none()), "unaddressed device, every send is a broadcast");

    let (_, last_payload) = sent.last().unwrap();
    assert_eq!(last_payload[1], u8::from(Opcode::WriteSingleRegisterValue));
    // The assigned address is the lowest free one: the registry was empty.
    assert_eq!(&last_payload[5..9], &1u32.to_le_bytes()[..]);
}
