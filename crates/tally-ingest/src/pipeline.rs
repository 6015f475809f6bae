//! Shared per-punch pipeline: resolve employee, suppress duplicates, record,
//! reconcile, persist. Both adapters funnel through [`Ingestor::process_punch`].

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tally_calendar::{parse_tz, CalendarError, DayPolicy};
use tally_config::TallyConfig;
use tally_device::IsapiOptions;
use tally_reconcile::{
    is_duplicate, ChangeKind, DuplicateTolerance, IgnoreReason, Outcome, ReconcileParams,
    ReconciliationPolicy, Reconciler, SessionChange,
};
use tally_schemas::{DeviceIdentity, DevicePunch, Employee, PunchEvent, PunchKind, RawAttendanceRecord};
use tracing::{info, warn};
use uuid::Uuid;

use crate::locks::EmployeeLocks;
use crate::store::{AttendanceStore, CalendarProvider, Directory};
use crate::IngestError;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub params: ReconcileParams,
    pub bulk_window: Duration,
    pub ledger_horizon: Duration,
    /// Zone for employees without one.
    pub default_tz: Tz,
    pub auto_provision: bool,
    pub device: IsapiOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            params: ReconcileParams::default(),
            bulk_window: Duration::seconds(600),
            ledger_horizon: Duration::hours(48),
            default_tz: Tz::UTC,
            auto_provision: false,
            device: IsapiOptions::default(),
        }
    }
}

impl IngestOptions {
    pub fn from_config(cfg: &TallyConfig) -> anyhow::Result<Self> {
        let r = &cfg.reconcile;
        Ok(Self {
            params: ReconcileParams {
                day: DayPolicy {
                    previous_day_cutoff: r.previous_day_cutoff,
                },
                late_checkout_cutoff: r.late_checkout_cutoff,
                inferred_check_in: r.inferred_check_in,
            },
            bulk_window: Duration::seconds(r.bulk_duplicate_window_secs),
            ledger_horizon: Duration::hours(r.ledger_horizon_hours),
            default_tz: cfg.default_tz().context("timezone")?,
            auto_provision: cfg.directory.auto_provision_unknown,
            device: IsapiOptions {
                timeout: std::time::Duration::from_secs(cfg.device.timeout_secs),
                page_size: cfg.device.page_size,
                device_tz: cfg.device_tz().context("device.timezone")?,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Outcome of one punch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PunchOutcome {
    /// Already recorded within tolerance; nothing written.
    Duplicate,
    /// Raw punch recorded (unless unlabeled) and reconciled.
    Reconciled(Outcome),
}

impl PunchOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            PunchOutcome::Duplicate => "duplicate",
            PunchOutcome::Reconciled(Outcome::Applied(_)) => "applied",
            PunchOutcome::Reconciled(Outcome::Ignored(_)) => "ignored",
        }
    }

    pub fn ignored_reason(&self) -> Option<IgnoreReason> {
        match self {
            PunchOutcome::Reconciled(o) => o.ignored_reason(),
            PunchOutcome::Duplicate => None,
        }
    }

    pub fn changes(&self) -> &[SessionChange] {
        match self {
            PunchOutcome::Reconciled(o) => o.changes(),
            PunchOutcome::Duplicate => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchReceipt {
    pub employee_id: Uuid,
    pub outcome: PunchOutcome,
}

/// JSON-friendly view of a receipt.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptView {
    pub employee_id: Uuid,
    pub status: &'static str,
    pub reason: Option<&'static str>,
    pub session_ids: Vec<Uuid>,
}

impl From<&PunchReceipt> for ReceiptView {
    fn from(r: &PunchReceipt) -> Self {
        Self {
            employee_id: r.employee_id,
            status: r.outcome.status(),
            reason: r.outcome.ignored_reason().map(|i| i.as_str()),
            session_ids: r
                .outcome
                .changes()
                .iter()
                .map(|c| c.session.session_id)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Owns the collaborators for one deployment. Cheap to clone.
#[derive(Clone)]
pub struct Ingestor {
    pub(crate) store: Arc<dyn AttendanceStore>,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) calendars: Arc<dyn CalendarProvider>,
    pub(crate) locks: Arc<EmployeeLocks>,
    pub(crate) options: IngestOptions,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        directory: Arc<dyn Directory>,
        calendars: Arc<dyn CalendarProvider>,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            directory,
            calendars,
            locks: Arc::new(EmployeeLocks::new()),
            options,
        }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn AttendanceStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Zone the employee's punches are resolved in.
    pub fn employee_tz(&self, employee: &Employee) -> Tz {
        match employee.timezone.as_deref().map(parse_tz) {
            Some(Ok(tz)) => tz,
            Some(Err(e)) => {
                warn!(employee_id = %employee.employee_id, error = %e, "employee timezone invalid; using default");
                self.options.default_tz
            }
            None => self.options.default_tz,
        }
    }

    /// `ledger_horizon` around `at`, never narrower than what the
    /// reconciler and the duplicate window read.
    fn ledger_span(&self, reconciler: &Reconciler, at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let (from, to) = reconciler.ledger_span(at, self.options.bulk_window);
        let horizon = self.options.ledger_horizon;
        (from.min(at - horizon), to.max(at + horizon))
    }

    /// Look the employee up by biometric code, provisioning when enabled.
    pub(crate) async fn resolve_employee(
        &self,
        punch: &DevicePunch,
        device: Option<&DeviceIdentity>,
    ) -> Result<Employee, IngestError> {
        if let Some(e) = self.directory.employee_by_code(&punch.employee_code).await? {
            return Ok(e);
        }
        if !self.options.auto_provision {
            warn!(code = %punch.employee_code, "unknown employee; not provisioned");
            return Err(IngestError::UnknownEmployee(punch.employee_code.clone()));
        }
        let candidate = Employee {
            employee_id: Uuid::new_v4(),
            name: punch
                .employee_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| punch.employee_code.clone()),
            biometric_code: punch.employee_code.clone(),
            device_id: device.map(|d| d.device_id),
            timezone: None,
        };
        let employee = self.directory.provision_employee(candidate).await?;
        info!(employee_id = %employee.employee_id, code = %employee.biometric_code, "employee provisioned");
        Ok(employee)
    }

    /// Run one punch through suppression and reconciliation under the
    /// employee's lock. The store is consistent when this returns.
    pub async fn process_punch(
        &self,
        punch: &DevicePunch,
        device: Option<&DeviceIdentity>,
        policy: ReconciliationPolicy,
    ) -> Result<PunchReceipt, IngestError> {
        let employee = self.resolve_employee(punch, device).await?;
        let employee_id = employee.employee_id;
        let event = PunchEvent::from_device(punch, employee_id, device.map(|d| d.device_id));
        let reconciler = Reconciler::new(self.employee_tz(&employee), self.options.params);

        let _guard = self.locks.lock(employee_id).await;

        let (from, to) = self.ledger_span(&reconciler, event.at_utc);
        let ledger = self.store.load_ledger(employee_id, from, to).await?;

        let tolerance = DuplicateTolerance::for_policy(policy, self.options.bulk_window);
        if is_duplicate(&ledger.raw, employee_id, event.at_utc, tolerance) {
            info!(%employee_id, at = %event.at_utc, policy = policy.as_str(), "duplicate punch suppressed");
            return Ok(PunchReceipt {
                employee_id,
                outcome: PunchOutcome::Duplicate,
            });
        }

        if policy == ReconciliationPolicy::LabelDriven && event.kind == PunchKind::Unknown {
            info!(%employee_id, at = %event.at_utc, "unlabeled webhook punch ignored");
            return Ok(PunchReceipt {
                employee_id,
                outcome: PunchOutcome::Reconciled(Outcome::Ignored(IgnoreReason::UnlabeledPunch)),
            });
        }

        let raw = RawAttendanceRecord::from_event(&event);

        let calendar = match policy {
            ReconciliationPolicy::ShiftDriven => self.calendars.calendar_for(employee_id).await?,
            ReconciliationPolicy::LabelDriven => None,
        };

        let outcome = match reconciler.decide(&ledger, &event, policy, calendar.as_ref()) {
            Ok(o) => o,
            Err(CalendarError::NoCalendarAssigned) => {
                // The raw punch is still part of the audit trail.
                self.store.commit(Some(&raw), &[]).await?;
                warn!(%employee_id, at = %event.at_utc, "employee has no calendar; punch recorded, not reconciled");
                return Err(IngestError::NoCalendarAssigned { employee_id });
            }
            Err(e) => return Err(IngestError::Store(e.into())),
        };

        let sessions: Vec<_> = outcome.changes().iter().map(|c| c.session.clone()).collect();
        self.store.commit(Some(&raw), &sessions).await?;
        log_outcome(employee_id, &event, policy, &outcome);

        Ok(PunchReceipt {
            employee_id,
            outcome: PunchOutcome::Reconciled(outcome),
        })
    }
}

fn log_outcome(employee_id: Uuid, event: &PunchEvent, policy: ReconciliationPolicy, outcome: &Outcome) {
    let policy = policy.as_str();
    let at = event.at_utc;
    match outcome {
        Outcome::Applied(changes) => {
            for c in changes {
                let session_id = c.session.session_id;
                match c.kind {
                    ChangeKind::Opened => info!(%employee_id, %session_id, %at, policy, "session opened"),
                    ChangeKind::Closed => info!(%employee_id, %session_id, %at, policy, "session closed"),
                    ChangeKind::InferredCheckIn => {
                        info!(%employee_id, %session_id, %at, policy, "session created with inferred check-in")
                    }
                    ChangeKind::StaleClosed => {
                        info!(%employee_id, %session_id, %at, policy, "stale open session closed speculatively")
                    }
                }
            }
        }
        Outcome::Ignored(IgnoreReason::UnmatchedCheckout) => {
            warn!(%employee_id, %at, policy, "check-out does not match open session day; ignored")
        }
        Outcome::Ignored(reason) => info!(%employee_id, %at, policy, reason = reason.as_str(), "punch ignored"),
    }
}
