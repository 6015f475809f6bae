//! tally-device
//!
//! Everything that speaks the biometric device's language: the vendor JSON
//! shapes, the normalizer that turns them into [`tally_schemas::DevicePunch`],
//! the transport trait, and the ISAPI HTTP client implementing it.
//!
//! Nothing here touches storage or sessions.

pub mod isapi;
pub mod normalizer;
pub mod payload;
pub mod transport;

pub use isapi::{IsapiClient, IsapiOptions};
pub use normalizer::{
    normalize_acs_record, normalize_webhook, parse_device_time, parse_webhook_json, NormalizeError,
};
pub use payload::{AccessControllerEvent, AcsEventRecord, WebhookEvent};
pub use transport::{DeviceTransport, EventClass, TransportError};
