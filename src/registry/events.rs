//! Change-event bus.
//!
//! A simple synchronous fan-out: mutators call [`EventBus::emit`], every
//! subscriber registered at that point runs in registration order.
//! Subscribers must not block — there is no cross-thread delivery in the
//! cooperative tick model.

use uuid::Uuid;

use super::records::{DeviceRecord, RegisterRecord};

/// One registry change, carrying the full record so a subscriber never
/// needs to read back through the registry.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    DeviceCreated(DeviceRecord),
    DeviceUpdated(DeviceRecord),
    RegisterCreated(RegisterRecord),
    RegisterUpdated(RegisterRecord),
    AttributeActualValueChanged(RegisterRecord),
    RegisterActualValueChanged(RegisterRecord),
}

impl RegistryEvent {
    /// The device or register id this event concerns, for subscribers
    /// that only care about a subset of records.
    pub fn subject_id(&self) -> Uuid {
        match self {
            RegistryEvent::DeviceCreated(d) | RegistryEvent::DeviceUpdated(d) => d.id,
            RegistryEvent::RegisterCreated(r)
            | RegistryEvent::RegisterUpdated(r)
            | RegistryEvent::AttributeActualValueChanged(r)
            | RegistryEvent::RegisterActualValueChanged(r) => r.id,
        }
    }
}

/// Receives registry events. Implemented by whatever syncs to the
/// persistent store; the registry itself has no opinion on that.
pub trait EventSubscriber {
    fn handle(&mut self, event: &RegistryEvent);
}

/// Fan-out dispatcher. Holds boxed subscribers and calls each in turn.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Box<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Deliver `event` to every subscriber, in subscription order.
    pub fn emit(&mut self, event: RegistryEvent) {
        for subscriber in &mut self.subscribers {
            subscriber.handle(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscribers.len())
            .finish()
    }
}
