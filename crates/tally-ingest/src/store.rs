//! Repository and directory interfaces.
//!
//! The ingestion pipeline talks only to these traits. `memory.rs` and the
//! `tally-db` crate implement them.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tally_reconcile::EmployeeLedger;
use tally_schemas::{
    AttendanceSession, DeviceIdentity, Employee, EmployeeCalendar, RawAttendanceRecord,
};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Sessions touching `[from, to]` and raw punches inside it, plus the
    /// employee's open session wherever it falls.
    async fn load_ledger(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<EmployeeLedger>;

    async fn append_raw(&self, record: &RawAttendanceRecord) -> Result<()>;

    /// Insert or replace by `session_id`.
    async fn save_session(&self, session: &AttendanceSession) -> Result<()>;

    /// Persist one punch's writes. Implementations with transactions
    /// override this to make the writes atomic.
    async fn commit(
        &self,
        raw: Option<&RawAttendanceRecord>,
        sessions: &[AttendanceSession],
    ) -> Result<()> {
        if let Some(r) = raw {
            self.append_raw(r).await?;
        }
        for s in sessions {
            self.save_session(s).await?;
        }
        Ok(())
    }

    /// Sessions whose check-in falls in `[from, to]`, oldest first.
    async fn sessions_between(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceSession>>;

    /// Raw punches in `[from, to]`, oldest first.
    async fn raw_between(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawAttendanceRecord>>;
}

#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    async fn devices(&self) -> Result<Vec<DeviceIdentity>>;

    async fn device_by_id(&self, device_id: Uuid) -> Result<Option<DeviceIdentity>>;

    /// Device an inbound event reporting `address` came from.
    async fn device_by_address(&self, address: &str) -> Result<Option<DeviceIdentity>> {
        let devices = self.devices().await?;
        Ok(match_device_address(&devices, address).cloned())
    }

    async fn employee_by_code(&self, biometric_code: &str) -> Result<Option<Employee>>;

    async fn employee_by_id(&self, employee_id: Uuid) -> Result<Option<Employee>>;

    /// Create `employee`, or return the existing record with the same
    /// biometric code.
    async fn provision_employee(&self, employee: Employee) -> Result<Employee>;
}

#[async_trait::async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn calendar_for(&self, employee_id: Uuid) -> Result<Option<EmployeeCalendar>>;
}

/// When any device is flagged public, events are matched on the public
/// devices' `local_address` (first match wins). Otherwise on the exact
/// `address`.
pub fn match_device_address<'a>(
    devices: &'a [DeviceIdentity],
    address: &str,
) -> Option<&'a DeviceIdentity> {
    let address = address.trim();
    if devices.iter().any(|d| d.is_public) {
        devices
            .iter()
            .filter(|d| d.is_public)
            .find(|d| d.local_address.as_deref().map(str::trim) == Some(address))
    } else {
        devices.iter().find(|d| d.address.trim() == address)
    }
}
