use anyhow::{anyhow, Context, Result};
use chrono::{NaiveTime, Weekday};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tally_config::DirectorySeed;
use tally_ingest::{CalendarProvider, Directory};
use tally_schemas::{DeviceIdentity, Employee, EmployeeCalendar, WorkInterval};
use tracing::info;
use uuid::Uuid;

use crate::PgStore;

const DEVICE_COLUMNS: &str =
    "device_id, name, address, local_address, port, username, password_env, is_public";

const EMPLOYEE_COLUMNS: &str = "employee_id, name, biometric_code, device_id, timezone";

fn device_from_row(row: &PgRow) -> Result<DeviceIdentity> {
    let port: i32 = row.try_get("port")?;
    Ok(DeviceIdentity {
        device_id: row.try_get("device_id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        local_address: row.try_get("local_address")?,
        port: u16::try_from(port).with_context(|| format!("device port out of range: {port}"))?,
        username: row.try_get("username")?,
        password_env: row.try_get("password_env")?,
        is_public: row.try_get("is_public")?,
    })
}

fn employee_from_row(row: &PgRow) -> Result<Employee> {
    Ok(Employee {
        employee_id: row.try_get("employee_id")?,
        name: row.try_get("name")?,
        biometric_code: row.try_get("biometric_code")?,
        device_id: row.try_get("device_id")?,
        timezone: row.try_get("timezone")?,
    })
}

fn weekday_from_db(n: i16) -> Result<Weekday> {
    Ok(match n {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        6 => Weekday::Sun,
        other => return Err(anyhow!("invalid weekday: {other}")),
    })
}

fn weekday_to_db(w: Weekday) -> i16 {
    w.num_days_from_monday() as i16
}

impl PgStore {
    pub async fn upsert_device(&self, d: &DeviceIdentity) -> Result<()> {
        sqlx::query(
            r#"
            insert into devices (
              device_id, name, address, local_address, port, username, password_env, is_public
            ) values ($1, $2, $3, $4, $5, $6, $7, $8)
            on conflict (device_id) do update
              set name = excluded.name,
                  address = excluded.address,
                  local_address = excluded.local_address,
                  port = excluded.port,
                  username = excluded.username,
                  password_env = excluded.password_env,
                  is_public = excluded.is_public
            "#,
        )
        .bind(d.device_id)
        .bind(&d.name)
        .bind(&d.address)
        .bind(&d.local_address)
        .bind(i32::from(d.port))
        .bind(&d.username)
        .bind(&d.password_env)
        .bind(d.is_public)
        .execute(&self.pool)
        .await
        .context("upsert_device failed")?;
        Ok(())
    }

    pub async fn upsert_employee(&self, e: &Employee) -> Result<()> {
        sqlx::query(
            r#"
            insert into employees (employee_id, name, biometric_code, device_id, timezone)
            values ($1, $2, $3, $4, $5)
            on conflict (employee_id) do update
              set name = excluded.name,
                  biometric_code = excluded.biometric_code,
                  device_id = excluded.device_id,
                  timezone = excluded.timezone
            "#,
        )
        .bind(e.employee_id)
        .bind(&e.name)
        .bind(&e.biometric_code)
        .bind(e.device_id)
        .bind(&e.timezone)
        .execute(&self.pool)
        .await
        .context("upsert_employee failed")?;
        Ok(())
    }

    /// Replace the employee's intervals with `calendar`'s.
    pub async fn set_calendar(&self, employee_id: Uuid, calendar: &EmployeeCalendar) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin set_calendar tx failed")?;
        sqlx::query("delete from work_intervals where employee_id = $1")
            .bind(employee_id)
            .execute(&mut *tx)
            .await
            .context("clear work_intervals failed")?;
        for i in &calendar.intervals {
            sqlx::query(
                r#"
                insert into work_intervals (employee_id, calendar_name, weekday, start_time, end_time)
                values ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(employee_id)
            .bind(&calendar.name)
            .bind(weekday_to_db(i.weekday))
            .bind(i.start)
            .bind(i.end)
            .execute(&mut *tx)
            .await
            .context("insert work_interval failed")?;
        }
        tx.commit().await.context("commit set_calendar tx failed")?;
        Ok(())
    }
}

/// Write the configured directory into the database. Rows absent from
/// the seed are left alone.
pub async fn seed_directory(store: &PgStore, seed: &DirectorySeed) -> Result<()> {
    for d in &seed.devices {
        store.upsert_device(d).await?;
    }
    for e in &seed.employees {
        store.upsert_employee(e).await?;
    }
    for (employee_id, cal) in &seed.calendars {
        store.set_calendar(*employee_id, cal).await?;
    }
    info!(
        devices = seed.devices.len(),
        employees = seed.employees.len(),
        calendars = seed.calendars.len(),
        "directory seeded"
    );
    Ok(())
}

#[async_trait::async_trait]
impl Directory for PgStore {
    async fn devices(&self) -> Result<Vec<DeviceIdentity>> {
        let rows = sqlx::query(&format!("select {DEVICE_COLUMNS} from devices order by name"))
            .fetch_all(&self.pool)
            .await
            .context("devices query failed")?;
        rows.iter().map(device_from_row).collect()
    }

    async fn device_by_id(&self, device_id: Uuid) -> Result<Option<DeviceIdentity>> {
        let row = sqlx::query(&format!(
            "select {DEVICE_COLUMNS} from devices where device_id = $1"
        ))
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .context("device_by_id failed")?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn employee_by_code(&self, biometric_code: &str) -> Result<Option<Employee>> {
        let row = sqlx::query(&format!(
            "select {EMPLOYEE_COLUMNS} from employees where biometric_code = $1"
        ))
        .bind(biometric_code)
        .fetch_optional(&self.pool)
        .await
        .context("employee_by_code failed")?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn employee_by_id(&self, employee_id: Uuid) -> Result<Option<Employee>> {
        let row = sqlx::query(&format!(
            "select {EMPLOYEE_COLUMNS} from employees where employee_id = $1"
        ))
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await
        .context("employee_by_id failed")?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn provision_employee(&self, employee: Employee) -> Result<Employee> {
        sqlx::query(
            r#"
            insert into employees (employee_id, name, biometric_code, device_id, timezone)
            values ($1, $2, $3, $4, $5)
            on conflict (biometric_code) do nothing
            "#,
        )
        .bind(employee.employee_id)
        .bind(&employee.name)
        .bind(&employee.biometric_code)
        .bind(employee.device_id)
        .bind(&employee.timezone)
        .execute(&self.pool)
        .await
        .context("provision_employee failed")?;

        self.employee_by_code(&employee.biometric_code)
            .await?
            .ok_or_else(|| anyhow!("provisioned employee {} not found", employee.biometric_code))
    }
}

#[async_trait::async_trait]
impl CalendarProvider for PgStore {
    async fn calendar_for(&self, employee_id: Uuid) -> Result<Option<EmployeeCalendar>> {
        let rows = sqlx::query(
            r#"
            select calendar_name, weekday, start_time, end_time
            from work_intervals
            where employee_id = $1
            order by weekday, start_time
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await
        .context("calendar_for failed")?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let name: String = first.try_get("calendar_name")?;
        let mut intervals = Vec::with_capacity(rows.len());
        for row in &rows {
            let weekday: i16 = row.try_get("weekday")?;
            let start: NaiveTime = row.try_get("start_time")?;
            let end: NaiveTime = row.try_get("end_time")?;
            intervals.push(WorkInterval::new(weekday_from_db(weekday)?, start, end));
        }
        Ok(Some(EmployeeCalendar::new(name, intervals)))
    }
}
