//! Device payload -> [`DevicePunch`].
//!
//! Converts the device-local timestamp to UTC. Does not look up employees
//! or devices; that is the ingestion layer's job.

use chrono::{DateTime, Utc};
use tally_schemas::{CaptureMethod, DevicePunch, PunchKind};

use crate::payload::{AcsEventRecord, WebhookEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("payload is not valid event json: {0}")]
    InvalidJson(String),
    #[error("payload has no AccessControllerEvent block")]
    MissingEvent,
    #[error("event carries neither a face marker nor a label")]
    MissingMarker,
    #[error("event has no employee code")]
    MissingEmployeeCode,
    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),
}

pub fn parse_webhook_json(raw: &str) -> Result<WebhookEvent, NormalizeError> {
    serde_json::from_str(raw).map_err(|e| NormalizeError::InvalidJson(e.to_string()))
}

/// Normalize a pushed event.
pub fn normalize_webhook(ev: &WebhookEvent) -> Result<DevicePunch, NormalizeError> {
    let inner = ev
        .access_controller_event
        .as_ref()
        .ok_or(NormalizeError::MissingEvent)?;
    let label = inner.label.as_deref().map(str::trim).filter(|l| !l.is_empty());
    if inner.face_rect.is_none() && label.is_none() {
        return Err(NormalizeError::MissingMarker);
    }
    let employee_code = employee_code(inner.employee_no.as_deref())?;
    let at_utc = parse_device_time(ev.date_time.as_deref().unwrap_or_default())?;

    Ok(DevicePunch {
        device_address: ev.ip_address.clone(),
        employee_code,
        employee_name: inner.name.clone(),
        at_utc,
        kind: PunchKind::from_label(label),
        method: method(inner.face_rect.is_some()),
    })
}

/// Normalize one historical record. Pulled events carry no label.
pub fn normalize_acs_record(
    rec: &AcsEventRecord,
    device_address: Option<&str>,
) -> Result<DevicePunch, NormalizeError> {
    let employee_code = employee_code(rec.employee_no.as_deref())?;
    let at_utc = parse_device_time(rec.time.as_deref().unwrap_or_default())?;
    Ok(DevicePunch {
        device_address: device_address.map(str::to_string),
        employee_code,
        employee_name: rec.name.clone(),
        at_utc,
        kind: PunchKind::Unknown,
        method: method(rec.face_rect.is_some()),
    })
}

/// ISO-8601 with offset (`-06:00` or `-0600`) to UTC.
pub fn parse_device_time(raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let s = raw.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| NormalizeError::BadTimestamp(raw.to_string()))
}

fn employee_code(raw: Option<&str>) -> Result<String, NormalizeError> {
    match raw.map(str::trim) {
        Some(code) if !code.is_empty() => Ok(code.to_string()),
        _ => Err(NormalizeError::MissingEmployeeCode),
    }
}

fn method(face: bool) -> CaptureMethod {
    if face {
        CaptureMethod::Face
    } else {
        CaptureMethod::Fingerprint
    }
}
