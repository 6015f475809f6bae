//! Device transport boundary.
//!
//! Only the trait and its vocabulary live here. The ISAPI implementation is
//! in `isapi.rs`; tests substitute in-process fakes.

use chrono::{DateTime, Utc};

use crate::payload::AcsEventRecord;

/// Event classes pulled from the device, identified by ISAPI major/minor codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// Face authentication passed.
    Face,
    /// Fingerprint authentication passed.
    Fingerprint,
}

impl EventClass {
    pub const ALL: [EventClass; 2] = [EventClass::Face, EventClass::Fingerprint];

    pub fn major(&self) -> u32 {
        5
    }

    pub fn minor(&self) -> u32 {
        match self {
            EventClass::Face => 75,
            EventClass::Fingerprint => 38,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::Face => "face",
            EventClass::Fingerprint => "fingerprint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("device unreachable: {0}")]
    Unreachable(String),
    #[error("device returned http {status}")]
    Status { status: u16 },
    #[error("device response could not be decoded: {0}")]
    Decode(String),
    #[error("device client misconfigured: {0}")]
    Config(String),
}

/// Calls one device. Built per operation; holds no cross-operation state.
#[async_trait::async_trait]
pub trait DeviceTransport: Send + Sync {
    /// `true` if the device answered its info endpoint.
    async fn connect(&self) -> bool;

    /// All events of `class` in `[from, to]`, paging internally.
    async fn fetch_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        class: EventClass,
    ) -> Result<Vec<AcsEventRecord>, TransportError>;
}
