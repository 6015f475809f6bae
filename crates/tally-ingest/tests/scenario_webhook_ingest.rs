//! Webhook adapter end to end against the in-memory store.
//!
//! Device "lobby" at 192.168.1.64, employee 1001 in UTC.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tally_ingest::{
    IngestError, IngestOptions, Ingestor, MemoryDirectory, MemoryStore, PunchOutcome,
};
use tally_reconcile::{ChangeKind, IgnoreReason};
use tally_schemas::{DeviceIdentity, Employee, PunchKind};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    ingestor: Ingestor,
    store: Arc<MemoryStore>,
    directory: Arc<MemoryDirectory>,
    employee_id: Uuid,
}

fn lobby() -> DeviceIdentity {
    DeviceIdentity {
        device_id: Uuid::new_v4(),
        name: "lobby".to_string(),
        address: "192.168.1.64".to_string(),
        local_address: None,
        port: 80,
        username: "admin".to_string(),
        password_env: None,
        is_public: false,
    }
}

async fn harness(options: IngestOptions) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::default());
    let device = lobby();
    let employee_id = Uuid::new_v4();
    directory
        .add_employee(
            Employee {
                employee_id,
                name: "Ana".to_string(),
                biometric_code: "1001".to_string(),
                device_id: Some(device.device_id),
                timezone: None,
            },
            None,
        )
        .await;
    directory.add_device(device).await;
    let ingestor = Ingestor::new(store.clone(), directory.clone(), directory.clone(), options);
    Harness {
        ingestor,
        store,
        directory,
        employee_id,
    }
}

fn payload(code: &str, local: &str, label: Option<&str>) -> String {
    let label = label
        .map(|l| format!(r#","label":"{l}""#))
        .unwrap_or_default();
    format!(
        r#"{{"ipAddress":"192.168.1.64","dateTime":"{local}",
            "AccessControllerEvent":{{"employeeNoString":"{code}","name":"Visitor",
            "FaceRect":{{"x":0.1}}{label}}}}}"#
    )
}

fn utc(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_in_then_check_out_closes_one_session() {
    let h = harness(IngestOptions::default()).await;

    let r1 = h
        .ingestor
        .ingest_webhook_json(&payload("1001", "2024-01-10T08:00:00Z", Some("Check In")))
        .await
        .unwrap();
    assert_eq!(r1.outcome.changes()[0].kind, ChangeKind::Opened);

    let r2 = h
        .ingestor
        .ingest_webhook_json(&payload("1001", "2024-01-10T17:00:00Z", Some("Check Out")))
        .await
        .unwrap();
    assert_eq!(r2.outcome.changes()[0].kind, ChangeKind::Closed);

    let sessions = h.store.all_sessions(h.employee_id).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].check_in_utc, utc(10, 8));
    assert_eq!(sessions[0].check_out_utc, Some(utc(10, 17)));
    assert_eq!(h.store.all_raw(h.employee_id).await.len(), 2);
}

#[tokio::test]
async fn missing_check_in_is_synthesized_at_eight_local() {
    let h = harness(IngestOptions::default()).await;

    h.ingestor
        .ingest_webhook_json(&payload("1001", "2024-01-10T13:00:00Z", Some("Check Out")))
        .await
        .unwrap();

    let sessions = h.store.all_sessions(h.employee_id).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].check_in_utc, utc(10, 8));
    assert_eq!(sessions[0].check_out_utc, Some(utc(10, 13)));
    assert!(sessions[0].check_in_inferred);
}

#[tokio::test]
async fn short_ledger_horizon_still_sees_the_whole_work_day() {
    let h = harness(IngestOptions {
        ledger_horizon: Duration::hours(1),
        ..IngestOptions::default()
    })
    .await;

    for (at, label) in [
        ("2024-01-10T09:00:00Z", "Check In"),
        ("2024-01-10T10:00:00Z", "Check Out"),
        ("2024-01-10T12:30:00Z", "Check In"),
    ] {
        h.ingestor
            .ingest_webhook_json(&payload("1001", at, Some(label)))
            .await
            .unwrap();
    }

    // The 12:30 check-in falls on a work day that already has one.
    let sessions = h.store.all_sessions(h.employee_id).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].check_in_utc, utc(10, 9));
    assert_eq!(sessions[0].check_out_utc, Some(utc(10, 10)));
    assert_eq!(h.store.all_raw(h.employee_id).await.len(), 3);
}

#[tokio::test]
async fn identical_payload_twice_records_once() {
    let h = harness(IngestOptions::default()).await;
    let body = payload("1001", "2024-01-10T08:00:00Z", Some("Check In"));

    let first = h.ingestor.ingest_webhook_json(&body).await.unwrap();
    let second = h.ingestor.ingest_webhook_json(&body).await.unwrap();

    assert!(matches!(first.outcome, PunchOutcome::Reconciled(_)));
    assert_eq!(second.outcome, PunchOutcome::Duplicate);
    assert_eq!(h.store.all_raw(h.employee_id).await.len(), 1);
    assert_eq!(h.store.all_sessions(h.employee_id).await.len(), 1);
}

#[tokio::test]
async fn offset_timestamp_is_stored_in_utc() {
    let h = harness(IngestOptions::default()).await;

    h.ingestor
        .ingest_webhook_json(&payload("1001", "2024-01-10T07:00:00-06:00", Some("Check In")))
        .await
        .unwrap();

    let raw = h.store.all_raw(h.employee_id).await;
    assert_eq!(raw[0].punched_at_utc, utc(10, 13));
    assert_eq!(raw[0].kind, PunchKind::CheckIn);
}

#[tokio::test]
async fn unlabeled_face_event_is_ignored_without_raw_record() {
    let h = harness(IngestOptions::default()).await;

    let r = h
        .ingestor
        .ingest_webhook_json(&payload("1001", "2024-01-10T08:00:00Z", None))
        .await
        .unwrap();

    assert_eq!(r.outcome.ignored_reason(), Some(IgnoreReason::UnlabeledPunch));
    assert!(h.store.all_raw(h.employee_id).await.is_empty());
}

#[tokio::test]
async fn malformed_payload_is_rejected_without_state_change() {
    let h = harness(IngestOptions::default()).await;

    let err = h.ingestor.ingest_webhook_json("{not json").await.unwrap_err();
    assert!(matches!(err, IngestError::MalformedPayload(_)));

    let no_code = r#"{"ipAddress":"192.168.1.64","dateTime":"2024-01-10T08:00:00Z",
        "AccessControllerEvent":{"label":"Check In"}}"#;
    let err = h.ingestor.ingest_webhook_json(no_code).await.unwrap_err();
    assert_eq!(err.code(), "MALFORMED_PAYLOAD");

    assert!(h.store.all_raw(h.employee_id).await.is_empty());
}

#[tokio::test]
async fn unknown_device_address_is_rejected() {
    let h = harness(IngestOptions::default()).await;
    let body = payload("1001", "2024-01-10T08:00:00Z", Some("Check In"))
        .replace("192.168.1.64", "10.9.9.9");

    let err = h.ingestor.ingest_webhook_json(&body).await.unwrap_err();
    assert!(matches!(err, IngestError::UnknownDevice(ref a) if a == "10.9.9.9"));
}

#[tokio::test]
async fn unknown_employee_without_provisioning_is_rejected() {
    let h = harness(IngestOptions::default()).await;

    let err = h
        .ingestor
        .ingest_webhook_json(&payload("2002", "2024-01-10T08:00:00Z", Some("Check In")))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::UnknownEmployee(ref c) if c == "2002"));
    assert_eq!(h.directory.employees().await.len(), 1);
}

#[tokio::test]
async fn unknown_employee_is_provisioned_when_enabled() {
    let h = harness(IngestOptions {
        auto_provision: true,
        ..IngestOptions::default()
    })
    .await;

    let r = h
        .ingestor
        .ingest_webhook_json(&payload("2002", "2024-01-10T08:00:00Z", Some("Check In")))
        .await
        .unwrap();

    let employees = h.directory.employees().await;
    let created = employees
        .iter()
        .find(|e| e.biometric_code == "2002")
        .unwrap();
    assert_eq!(created.employee_id, r.employee_id);
    assert_eq!(created.name, "Visitor");
    assert!(created.device_id.is_some());
    assert_eq!(h.store.all_sessions(r.employee_id).await.len(), 1);
}

#[tokio::test]
async fn employee_timezone_drives_work_day() {
    let h = harness(IngestOptions::default()).await;
    let employee_id = Uuid::new_v4();
    h.directory
        .add_employee(
            Employee {
                employee_id,
                name: "Luis".to_string(),
                biometric_code: "3003".to_string(),
                device_id: None,
                timezone: Some("America/Mexico_City".to_string()),
            },
            None,
        )
        .await;

    // 13:00Z is 07:00 local: check-in synthesized at 08:00 local clamps to the punch.
    h.ingestor
        .ingest_webhook_json(&payload("3003", "2024-01-10T13:00:00Z", Some("Check Out")))
        .await
        .unwrap();
    let sessions = h.store.all_sessions(employee_id).await;
    assert_eq!(sessions[0].check_in_utc, utc(10, 13));

    // 20:00Z is 14:00 local: a fresh work day gets its 08:00 local (14:00Z) check-in.
    h.ingestor
        .ingest_webhook_json(&payload("3003", "2024-01-11T20:00:00Z", Some("Check Out")))
        .await
        .unwrap();
    let sessions = h.store.all_sessions(employee_id).await;
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[1].check_in_utc, utc(11, 14));
}
