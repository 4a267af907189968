//! Connector configuration.
//!
//! The host assembles a `Settings` value however it likes — file, env,
//! hardcoded — and passes it to [`crate::connector::Connector::initialize`].
//! This crate has no opinion on where the values come from.

use serde::{Deserialize, Serialize};

use crate::types::ProtocolVersion;

/// Bus address the gateway itself answers to.
pub const DEFAULT_GATEWAY_ADDRESS: u8 = 254;
pub const DEFAULT_BAUD_RATE: u32 = 38_400;
pub const DEFAULT_INTERFACE: &str = "/dev/ttyAMA0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub address: u8,
    pub baud_rate: u32,
    pub interface: String,
    pub protocol_version: ProtocolVersion,
    /// Gateway's own serial number, sent in discovery/interrogation
    /// payloads so an unaddressed device can tell which controller is
    /// asking.
    pub gateway_serial_number: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: DEFAULT_GATEWAY_ADDRESS,
            baud_rate: DEFAULT_BAUD_RATE,
            interface: DEFAULT_INTERFACE.to_owned(),
            protocol_version: ProtocolVersion::V1,
            gateway_serial_number: String::new(),
        }
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        ProtocolVersion::try_from(raw)
            .map_err(|value| serde::de::Error::custom(format!("unsupported protocol version: {value:#04x}")))
    }
}
