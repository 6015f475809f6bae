//! Concurrent webhook deliveries for one employee never leave two open
//! sessions or duplicate raw records.

use std::sync::Arc;

use tally_ingest::{IngestOptions, Ingestor, MemoryDirectory, MemoryStore, PunchOutcome};
use tally_schemas::{DeviceIdentity, Employee};
use uuid::Uuid;

async fn setup() -> (Ingestor, Arc<MemoryStore>, Uuid, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::default());
    directory
        .add_device(DeviceIdentity {
            device_id: Uuid::new_v4(),
            name: "lobby".to_string(),
            address: "192.168.1.64".to_string(),
            local_address: None,
            port: 80,
            username: "admin".to_string(),
            password_env: None,
            is_public: false,
        })
        .await;
    let mut ids = Vec::new();
    for code in ["1001", "1002"] {
        let employee_id = Uuid::new_v4();
        directory
            .add_employee(
                Employee {
                    employee_id,
                    name: format!("emp-{code}"),
                    biometric_code: code.to_string(),
                    device_id: None,
                    timezone: None,
                },
                None,
            )
            .await;
        ids.push(employee_id);
    }
    let ingestor = Ingestor::new(store.clone(), directory.clone(), directory, IngestOptions::default());
    (ingestor, store, ids[0], ids[1])
}

fn check_in(code: &str, minute: u32) -> String {
    format!(
        r#"{{"ipAddress":"192.168.1.64","dateTime":"2024-01-10T08:{minute:02}:00Z",
            "AccessControllerEvent":{{"employeeNoString":"{code}","label":"Check In"}}}}"#
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_check_ins_open_exactly_one_session() {
    let (ingestor, store, emp, _) = setup().await;

    let mut tasks = Vec::new();
    for minute in 0..16 {
        let ing = ingestor.clone();
        tasks.push(tokio::spawn(async move {
            ing.ingest_webhook_json(&check_in("1001", minute)).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let sessions = store.all_sessions(emp).await;
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].is_open());
    // Every distinct instant is still recorded once.
    assert_eq!(store.all_raw(emp).await.len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_deliveries_record_once() {
    let (ingestor, store, emp, _) = setup().await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let ing = ingestor.clone();
        tasks.push(tokio::spawn(async move {
            ing.ingest_webhook_json(&check_in("1001", 5)).await
        }));
    }
    let mut duplicates = 0;
    for t in tasks {
        if t.await.unwrap().unwrap().outcome == PunchOutcome::Duplicate {
            duplicates += 1;
        }
    }

    assert_eq!(duplicates, 7);
    assert_eq!(store.all_raw(emp).await.len(), 1);
    assert_eq!(store.all_sessions(emp).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_employees_proceed_independently() {
    let (ingestor, store, a, b) = setup().await;

    let body_a = check_in("1001", 0);
    let body_b = check_in("1002", 0);
    let (ra, rb) = tokio::join!(
        ingestor.ingest_webhook_json(&body_a),
        ingestor.ingest_webhook_json(&body_b),
    );
    ra.unwrap();
    rb.unwrap();

    assert_eq!(store.all_sessions(a).await.len(), 1);
    assert_eq!(store.all_sessions(b).await.len(), 1);
}
