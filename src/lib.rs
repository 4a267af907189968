//! Protocol engine for a multi-drop serial bus connector: packet codec,
//! per-device polling/write state machine, discovery/pairing, the
//! in-memory device/register registry and its change-event bus, and the
//! transport scheduler that multiplexes the shared link.
//!
//! The engine is driven, not threaded: a host calls [`connector::Connector::handle`]
//! once per tick and nothing here spawns a thread or blocks indefinitely.
//! The actual byte-level framing, CRC, ACK and retry on the wire are
//! delegated to whatever [`transport::FramingLink`] the host plugs in.

pub mod connector;
pub mod error;
pub mod frame;
pub mod pairing;
pub mod publisher;
pub mod receiver;
pub mod registry;
pub mod settings;
pub mod transport;
pub mod types;
pub mod value;

pub use connector::Connector;
pub use settings::Settings;
