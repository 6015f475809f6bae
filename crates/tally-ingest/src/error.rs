use chrono::{DateTime, Utc};
use tally_device::{NormalizeError, TransportError};
use uuid::Uuid;

/// Failures surfaced by the ingestion adapters.
///
/// Duplicates and ignored punches are outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),
    #[error("employee {employee_id} has no work calendar")]
    NoCalendarAssigned { employee_id: Uuid },
    #[error("no device matches address '{0}'")]
    UnknownDevice(String),
    #[error("no employee for biometric code '{0}'")]
    UnknownEmployee(String),
    #[error("invalid range: from {from} is not before to {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    #[error("device not usable: {0}")]
    InvalidDevice(String),
    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl IngestError {
    /// Stable machine-readable tag for responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            IngestError::DeviceUnreachable(_) => "DEVICE_UNREACHABLE",
            IngestError::NoCalendarAssigned { .. } => "NO_CALENDAR_ASSIGNED",
            IngestError::UnknownDevice(_) => "UNKNOWN_DEVICE",
            IngestError::UnknownEmployee(_) => "UNKNOWN_EMPLOYEE",
            IngestError::InvalidRange { .. } => "INVALID_RANGE",
            IngestError::InvalidDevice(_) => "INVALID_DEVICE",
            IngestError::Store(_) => "STORE_FAILURE",
        }
    }
}

impl From<NormalizeError> for IngestError {
    fn from(e: NormalizeError) -> Self {
        IngestError::MalformedPayload(e.to_string())
    }
}

impl From<TransportError> for IngestError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Config(msg) => IngestError::InvalidDevice(msg),
            other => IngestError::DeviceUnreachable(other.to_string()),
        }
    }
}
