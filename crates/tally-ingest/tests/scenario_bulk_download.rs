//! Bulk adapter against an in-process fake device.
//!
//!   2024-02-01 Thu
//!   2024-02-02 Fri
//!
//! Employee 1001 works Thu and Fri 08:00-17:00 in America/Mexico_City (UTC-6).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use tally_device::{AcsEventRecord, DeviceTransport, EventClass, TransportError};
use tally_ingest::{IngestError, IngestOptions, Ingestor, MemoryDirectory, MemoryStore};
use tally_schemas::{AttendanceSession, DeviceIdentity, Employee, EmployeeCalendar, WorkInterval};
use tally_ingest::AttendanceStore;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fake device
// ---------------------------------------------------------------------------

struct FakeDevice {
    reachable: bool,
    face: Vec<AcsEventRecord>,
    fingerprint: Result<Vec<AcsEventRecord>, TransportError>,
    connects: AtomicUsize,
}

impl FakeDevice {
    fn online(face: Vec<AcsEventRecord>, fingerprint: Vec<AcsEventRecord>) -> Self {
        Self {
            reachable: true,
            face,
            fingerprint: Ok(fingerprint),
            connects: AtomicUsize::new(0),
        }
    }

    fn offline() -> Self {
        Self {
            reachable: false,
            ..Self::online(vec![record("1001", "2024-02-01T08:55:00-06:00")], vec![])
        }
    }
}

#[async_trait::async_trait]
impl DeviceTransport for FakeDevice {
    async fn connect(&self) -> bool {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }

    async fn fetch_events(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        class: EventClass,
    ) -> Result<Vec<AcsEventRecord>, TransportError> {
        match class {
            EventClass::Face => Ok(self.face.clone()),
            EventClass::Fingerprint => self.fingerprint.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ZONE: &str = "America/Mexico_City";

fn record(code: &str, time: &str) -> AcsEventRecord {
    AcsEventRecord {
        time: Some(time.to_string()),
        employee_no: Some(code.to_string()),
        name: Some("Ana".to_string()),
        face_rect: None,
    }
}

fn t(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn day_calendar() -> EmployeeCalendar {
    EmployeeCalendar::new(
        "day",
        vec![
            WorkInterval::new(Weekday::Thu, t(8), t(17)),
            WorkInterval::new(Weekday::Fri, t(8), t(17)),
        ],
    )
}

fn gate() -> DeviceIdentity {
    DeviceIdentity {
        device_id: Uuid::new_v4(),
        name: "gate".to_string(),
        address: "192.168.1.70".to_string(),
        local_address: None,
        port: 80,
        username: "admin".to_string(),
        password_env: None,
        is_public: false,
    }
}

/// Local wall time in the employee's zone, as UTC.
fn local(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, d, h + 6, m, 0).unwrap()
}

fn range() -> (DateTime<Utc>, DateTime<Utc>) {
    (local(1, 0, 0), local(2, 17, 0))
}

struct Harness {
    ingestor: Ingestor,
    store: Arc<MemoryStore>,
    directory: Arc<MemoryDirectory>,
    employee_id: Uuid,
}

async fn harness(calendar: Option<EmployeeCalendar>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::default());
    let employee_id = Uuid::new_v4();
    directory
        .add_employee(
            Employee {
                employee_id,
                name: "Ana".to_string(),
                biometric_code: "1001".to_string(),
                device_id: None,
                timezone: Some(ZONE.to_string()),
            },
            calendar,
        )
        .await;
    let ingestor = Ingestor::new(
        store.clone(),
        directory.clone(),
        directory.clone(),
        IngestOptions::default(),
    );
    Harness {
        ingestor,
        store,
        directory,
        employee_id,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_night_checkout_before_cutoff_closes_session() {
    let h = harness(Some(day_calendar())).await;
    let device = FakeDevice::online(
        vec![record("1001", "2024-02-01T08:55:00-06:00")],
        vec![record("1001", "2024-02-02T04:30:00-06:00")],
    );
    let (from, to) = range();

    let summary = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.processed, 2);
    let sessions = h.store.all_sessions(h.employee_id).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].check_in_utc, local(1, 8, 55));
    assert_eq!(sessions[0].check_out_utc, Some(local(2, 4, 30)));
}

#[tokio::test]
async fn checkout_after_cutoff_is_unmatched_and_keeps_session_open() {
    let h = harness(Some(day_calendar())).await;
    let device = FakeDevice::online(
        vec![
            record("1001", "2024-02-01T08:55:00-06:00"),
            record("1001", "2024-02-02T06:00:00-06:00"),
        ],
        vec![],
    );
    let (from, to) = range();

    let summary = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.unmatched, 1);
    assert_eq!(summary.ignored, 1);
    let sessions = h.store.all_sessions(h.employee_id).await;
    assert!(sessions[0].is_open());
    // Unmatched punches stay on the audit trail.
    assert_eq!(h.store.all_raw(h.employee_id).await.len(), 2);
}

#[tokio::test]
async fn punches_four_minutes_apart_are_one_raw_record() {
    let h = harness(Some(day_calendar())).await;
    let device = FakeDevice::online(
        vec![record("1001", "2024-02-01T08:55:00-06:00")],
        vec![record("1001", "2024-02-01T08:59:00-06:00")],
    );
    let (from, to) = range();

    let summary = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(h.store.all_raw(h.employee_id).await.len(), 1);
}

#[tokio::test]
async fn records_are_replayed_in_time_order_across_classes() {
    let h = harness(Some(day_calendar())).await;
    // Check-out arrives in the first class, check-in in the second.
    let device = FakeDevice::online(
        vec![record("1001", "2024-02-01T17:30:00-06:00")],
        vec![record("1001", "2024-02-01T08:55:00-06:00")],
    );
    let (from, to) = range();

    let summary = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    let sessions = h.store.all_sessions(h.employee_id).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].check_out_utc, Some(local(1, 17, 30)));
}

#[tokio::test]
async fn bad_records_do_not_abort_the_batch() {
    let h = harness(Some(day_calendar())).await;
    let mut no_time = record("1001", "");
    no_time.time = None;
    let device = FakeDevice::online(
        vec![
            no_time,
            record("", "2024-02-01T09:00:00-06:00"),
            record("9999", "2024-02-01T09:00:00-06:00"),
            record("1001", "2024-02-01T08:55:00-06:00"),
        ],
        vec![],
    );
    let (from, to) = range();

    let summary = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    assert_eq!(summary.fetched, 4);
    assert_eq!(summary.malformed, 2);
    assert_eq!(summary.unknown_employee, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.ignored, 3);
}

#[tokio::test]
async fn employee_without_calendar_is_counted_and_raw_kept() {
    let h = harness(None).await;
    let device = FakeDevice::online(vec![record("1001", "2024-02-01T08:55:00-06:00")], vec![]);
    let (from, to) = range();

    let summary = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    assert_eq!(summary.no_calendar, 1);
    assert_eq!(summary.processed, 0);
    assert!(h.store.all_sessions(h.employee_id).await.is_empty());
    assert_eq!(h.store.all_raw(h.employee_id).await.len(), 1);
}

#[tokio::test]
async fn unreachable_device_aborts_before_any_write() {
    let h = harness(Some(day_calendar())).await;
    let device = FakeDevice::offline();
    let (from, to) = range();

    let err = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::DeviceUnreachable(_)));
    assert!(h.store.all_raw(h.employee_id).await.is_empty());
}

#[tokio::test]
async fn inverted_range_is_rejected_before_connecting() {
    let h = harness(Some(day_calendar())).await;
    let device = FakeDevice::online(vec![], vec![]);
    let (from, to) = range();

    let err = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), to, from)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_RANGE");
    assert_eq!(device.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_failing_class_still_replays_the_other() {
    let h = harness(Some(day_calendar())).await;
    let mut device = FakeDevice::online(vec![record("1001", "2024-02-01T08:55:00-06:00")], vec![]);
    device.fingerprint = Err(TransportError::Status { status: 500 });
    let (from, to) = range();

    let summary = h
        .ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
}

#[tokio::test]
async fn stale_open_session_is_closed_when_next_day_opens() {
    let h = harness(Some(day_calendar())).await;
    h.store
        .save_session(&AttendanceSession::open(h.employee_id, local(1, 8, 55)))
        .await
        .unwrap();
    let device = FakeDevice::online(vec![record("1001", "2024-02-02T08:50:00-06:00")], vec![]);
    let (from, to) = range();

    h.ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    let sessions = h.store.all_sessions(h.employee_id).await;
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions.iter().filter(|s| s.is_open()).count(), 1);
    let stale = &sessions[0];
    assert!(stale.check_out_inferred);
    assert!(stale.check_out_utc.unwrap() <= local(2, 8, 50));
}

#[tokio::test]
async fn unknown_employee_is_provisioned_from_record_when_enabled() {
    let h = harness(Some(day_calendar())).await;
    let ingestor = Ingestor::new(
        h.store.clone(),
        h.directory.clone(),
        h.directory.clone(),
        IngestOptions {
            auto_provision: true,
            ..IngestOptions::default()
        },
    );
    let device = FakeDevice::online(vec![record("4004", "2024-02-01T08:55:00-06:00")], vec![]);
    let (from, to) = range();

    let summary = ingestor
        .ingest_bulk_range(&device, &gate(), from, to)
        .await
        .unwrap();

    // Provisioned employees have no calendar yet.
    assert_eq!(summary.no_calendar, 1);
    assert!(h
        .directory
        .employees()
        .await
        .iter()
        .any(|e| e.biometric_code == "4004"));
}
