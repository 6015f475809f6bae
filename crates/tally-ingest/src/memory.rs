//! In-memory store and directory. Used by tests and the daemon's memory mode.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tally_config::DirectorySeed;
use tally_reconcile::EmployeeLedger;
use tally_schemas::{
    AttendanceSession, DeviceIdentity, Employee, EmployeeCalendar, RawAttendanceRecord,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{AttendanceStore, CalendarProvider, Directory};

#[derive(Debug, Default)]
struct Tables {
    raw: BTreeMap<Uuid, Vec<RawAttendanceRecord>>,
    sessions: BTreeMap<Uuid, Vec<AttendanceSession>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_sessions(&self, employee_id: Uuid) -> Vec<AttendanceSession> {
        let t = self.tables.read().await;
        t.sessions.get(&employee_id).cloned().unwrap_or_default()
    }

    pub async fn all_raw(&self, employee_id: Uuid) -> Vec<RawAttendanceRecord> {
        let t = self.tables.read().await;
        t.raw.get(&employee_id).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AttendanceStore for MemoryStore {
    async fn load_ledger(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<EmployeeLedger> {
        let (start, end) = (from, to);
        let t = self.tables.read().await;
        let sessions = t
            .sessions
            .get(&employee_id)
            .map(|all| {
                all.iter()
                    .filter(|s| {
                        s.is_open()
                            || (start <= s.check_in_utc && s.check_in_utc <= end)
                            || s.check_out_utc.is_some_and(|o| start <= o && o <= end)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let raw = t
            .raw
            .get(&employee_id)
            .map(|all| {
                all.iter()
                    .filter(|r| start <= r.punched_at_utc && r.punched_at_utc <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(EmployeeLedger {
            employee_id,
            sessions,
            raw,
        })
    }

    async fn append_raw(&self, record: &RawAttendanceRecord) -> Result<()> {
        let mut t = self.tables.write().await;
        t.raw.entry(record.employee_id).or_default().push(record.clone());
        Ok(())
    }

    async fn save_session(&self, session: &AttendanceSession) -> Result<()> {
        let mut t = self.tables.write().await;
        let rows = t.sessions.entry(session.employee_id).or_default();
        match rows.iter_mut().find(|s| s.session_id == session.session_id) {
            Some(slot) => *slot = session.clone(),
            None => rows.push(session.clone()),
        }
        Ok(())
    }

    async fn sessions_between(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceSession>> {
        let mut out: Vec<_> = self
            .all_sessions(employee_id)
            .await
            .into_iter()
            .filter(|s| from <= s.check_in_utc && s.check_in_utc <= to)
            .collect();
        out.sort_by_key(|s| s.check_in_utc);
        Ok(out)
    }

    async fn raw_between(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawAttendanceRecord>> {
        let mut out: Vec<_> = self
            .all_raw(employee_id)
            .await
            .into_iter()
            .filter(|r| from <= r.punched_at_utc && r.punched_at_utc <= to)
            .collect();
        out.sort_by_key(|r| r.punched_at_utc);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DirectoryTables {
    devices: Vec<DeviceIdentity>,
    employees: Vec<Employee>,
    calendars: BTreeMap<Uuid, EmployeeCalendar>,
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    tables: RwLock<DirectoryTables>,
}

impl MemoryDirectory {
    pub fn from_seed(seed: DirectorySeed) -> Self {
        Self {
            tables: RwLock::new(DirectoryTables {
                devices: seed.devices,
                employees: seed.employees,
                calendars: seed.calendars,
            }),
        }
    }

    pub async fn add_device(&self, device: DeviceIdentity) {
        self.tables.write().await.devices.push(device);
    }

    pub async fn add_employee(&self, employee: Employee, calendar: Option<EmployeeCalendar>) {
        let mut t = self.tables.write().await;
        if let Some(cal) = calendar {
            t.calendars.insert(employee.employee_id, cal);
        }
        t.employees.push(employee);
    }

    pub async fn employees(&self) -> Vec<Employee> {
        self.tables.read().await.employees.clone()
    }
}

#[async_trait::async_trait]
impl Directory for MemoryDirectory {
    async fn devices(&self) -> Result<Vec<DeviceIdentity>> {
        Ok(self.tables.read().await.devices.clone())
    }

    async fn device_by_id(&self, device_id: Uuid) -> Result<Option<DeviceIdentity>> {
        let t = self.tables.read().await;
        Ok(t.devices.iter().find(|d| d.device_id == device_id).cloned())
    }

    async fn employee_by_code(&self, biometric_code: &str) -> Result<Option<Employee>> {
        let t = self.tables.read().await;
        Ok(t.employees
            .iter()
            .find(|e| e.biometric_code == biometric_code)
            .cloned())
    }

    async fn employee_by_id(&self, employee_id: Uuid) -> Result<Option<Employee>> {
        let t = self.tables.read().await;
        Ok(t.employees
            .iter()
            .find(|e| e.employee_id == employee_id)
            .cloned())
    }

    async fn provision_employee(&self, employee: Employee) -> Result<Employee> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t
            .employees
            .iter()
            .find(|e| e.biometric_code == employee.biometric_code)
        {
            return Ok(existing.clone());
        }
        t.employees.push(employee.clone());
        Ok(employee)
    }
}

#[async_trait::async_trait]
impl CalendarProvider for MemoryDirectory {
    async fn calendar_for(&self, employee_id: Uuid) -> Result<Option<EmployeeCalendar>> {
        Ok(self.tables.read().await.calendars.get(&employee_id).cloned())
    }
}
