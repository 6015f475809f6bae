use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use tally_ingest::AttendanceStore;
use tally_reconcile::EmployeeLedger;
use tally_schemas::{AttendanceSession, CaptureMethod, PunchKind, RawAttendanceRecord};
use uuid::Uuid;

use crate::PgStore;

const SESSION_COLUMNS: &str =
    "session_id, employee_id, check_in_utc, check_out_utc, check_in_inferred, check_out_inferred";

const RAW_COLUMNS: &str =
    "record_id, device_id, employee_id, employee_code, kind, method, punched_at_utc";

fn session_from_row(row: &PgRow) -> Result<AttendanceSession> {
    Ok(AttendanceSession {
        session_id: row.try_get("session_id")?,
        employee_id: row.try_get("employee_id")?,
        check_in_utc: row.try_get("check_in_utc")?,
        check_out_utc: row.try_get("check_out_utc")?,
        check_in_inferred: row.try_get("check_in_inferred")?,
        check_out_inferred: row.try_get("check_out_inferred")?,
    })
}

fn raw_from_row(row: &PgRow) -> Result<RawAttendanceRecord> {
    let kind: String = row.try_get("kind")?;
    let method: String = row.try_get("method")?;
    Ok(RawAttendanceRecord {
        record_id: row.try_get("record_id")?,
        device_id: row.try_get("device_id")?,
        employee_id: row.try_get("employee_id")?,
        employee_code: row.try_get("employee_code")?,
        kind: PunchKind::parse(&kind).ok_or_else(|| anyhow!("invalid punch kind: {kind}"))?,
        method: CaptureMethod::parse(&method)
            .ok_or_else(|| anyhow!("invalid capture method: {method}"))?,
        punched_at_utc: row.try_get("punched_at_utc")?,
    })
}

async fn insert_raw<'e>(ex: impl PgExecutor<'e>, r: &RawAttendanceRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into raw_attendance (
          record_id, device_id, employee_id, employee_code, kind, method, punched_at_utc
        ) values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(r.record_id)
    .bind(r.device_id)
    .bind(r.employee_id)
    .bind(&r.employee_code)
    .bind(r.kind.as_str())
    .bind(r.method.as_str())
    .bind(r.punched_at_utc)
    .execute(ex)
    .await
    .context("insert raw_attendance failed")?;
    Ok(())
}

/// Closed sessions are immutable, so only the check-out columns move on
/// conflict.
async fn upsert_session<'e>(ex: impl PgExecutor<'e>, s: &AttendanceSession) -> Result<()> {
    sqlx::query(
        r#"
        insert into attendance_sessions (
          session_id, employee_id, check_in_utc, check_out_utc, check_in_inferred, check_out_inferred
        ) values ($1, $2, $3, $4, $5, $6)
        on conflict (session_id) do update
          set check_out_utc = excluded.check_out_utc,
              check_out_inferred = excluded.check_out_inferred
          where attendance_sessions.check_out_utc is null
        "#,
    )
    .bind(s.session_id)
    .bind(s.employee_id)
    .bind(s.check_in_utc)
    .bind(s.check_out_utc)
    .bind(s.check_in_inferred)
    .bind(s.check_out_inferred)
    .execute(ex)
    .await
    .context("upsert attendance_sessions failed")?;
    Ok(())
}

#[async_trait::async_trait]
impl AttendanceStore for PgStore {
    async fn load_ledger(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<EmployeeLedger> {
        let (start, end) = (from, to);

        let rows = sqlx::query(&format!(
            r#"
            select {SESSION_COLUMNS}
            from attendance_sessions
            where employee_id = $1
              and (check_out_utc is null
                   or check_in_utc between $2 and $3
                   or check_out_utc between $2 and $3)
            order by check_in_utc
            "#
        ))
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("load_ledger sessions failed")?;
        let sessions = rows.iter().map(session_from_row).collect::<Result<Vec<_>>>()?;

        let rows = sqlx::query(&format!(
            r#"
            select {RAW_COLUMNS}
            from raw_attendance
            where employee_id = $1 and punched_at_utc between $2 and $3
            order by punched_at_utc
            "#
        ))
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("load_ledger raw failed")?;
        let raw = rows.iter().map(raw_from_row).collect::<Result<Vec<_>>>()?;

        Ok(EmployeeLedger {
            employee_id,
            sessions,
            raw,
        })
    }

    async fn append_raw(&self, record: &RawAttendanceRecord) -> Result<()> {
        insert_raw(&self.pool, record).await
    }

    async fn save_session(&self, session: &AttendanceSession) -> Result<()> {
        upsert_session(&self.pool, session).await
    }

    async fn commit(
        &self,
        raw: Option<&RawAttendanceRecord>,
        sessions: &[AttendanceSession],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin commit tx failed")?;
        if let Some(r) = raw {
            insert_raw(&mut *tx, r).await?;
        }
        // Order matters: a stale close precedes the open that replaces it.
        for s in sessions {
            upsert_session(&mut *tx, s).await?;
        }
        tx.commit().await.context("commit tx failed")?;
        Ok(())
    }

    async fn sessions_between(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AttendanceSession>> {
        let rows = sqlx::query(&format!(
            r#"
            select {SESSION_COLUMNS}
            from attendance_sessions
            where employee_id = $1 and check_in_utc between $2 and $3
            order by check_in_utc
            "#
        ))
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("sessions_between failed")?;
        rows.iter().map(session_from_row).collect()
    }

    async fn raw_between(
        &self,
        employee_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawAttendanceRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            select {RAW_COLUMNS}
            from raw_attendance
            where employee_id = $1 and punched_at_utc between $2 and $3
            order by punched_at_utc
            "#
        ))
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .context("raw_between failed")?;
        rows.iter().map(raw_from_row).collect()
    }
}
