//! Wire shapes of the ISAPI device API. Field names follow the vendor JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Webhook (device push)
// ---------------------------------------------------------------------------

/// One pushed event, as carried in the `AccessControllerEvent` or
/// `event_log` form field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "ipAddress", default)]
    pub ip_address: Option<String>,
    /// ISO-8601 local time with offset, e.g. `2024-01-10T07:00:00-06:00`.
    #[serde(rename = "dateTime", default)]
    pub date_time: Option<String>,
    #[serde(rename = "AccessControllerEvent", default)]
    pub access_controller_event: Option<AccessControllerEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessControllerEvent {
    #[serde(rename = "employeeNoString", default)]
    pub employee_no: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Present when the punch was a face match.
    #[serde(rename = "FaceRect", default)]
    pub face_rect: Option<Value>,
    /// `"Check In"` / `"Check Out"` when the device is in attendance mode.
    #[serde(default)]
    pub label: Option<String>,
}

// ---------------------------------------------------------------------------
// AcsEvent search (device pull)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcsEventQuery {
    #[serde(rename = "AcsEventCond")]
    pub cond: AcsEventCond,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsEventCond {
    #[serde(rename = "searchID")]
    pub search_id: String,
    pub search_result_position: u32,
    pub max_results: u32,
    pub major: u32,
    pub minor: u32,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcsEventResponse {
    #[serde(rename = "AcsEvent", default)]
    pub acs_event: Option<AcsEventPage>,
}

impl AcsEventResponse {
    pub fn into_records(self) -> Vec<AcsEventRecord> {
        self.acs_event
            .and_then(|p| p.info_list)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcsEventPage {
    #[serde(rename = "InfoList", default)]
    pub info_list: Option<Vec<AcsEventRecord>>,
}

/// One historical event from `InfoList`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcsEventRecord {
    /// ISO-8601 device-local time with offset.
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "employeeNoString", default)]
    pub employee_no: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "FaceRect", default)]
    pub face_rect: Option<Value>,
}
