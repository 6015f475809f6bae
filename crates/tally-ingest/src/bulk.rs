//! Device pull path: fetch a date range, replay chronologically under the
//! shift-driven policy with a windowed duplicate tolerance.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_config::secrets::ResolvedDeviceSecrets;
use tally_device::{normalize_acs_record, DeviceTransport, EventClass, IsapiClient};
use tally_reconcile::{IgnoreReason, ReconciliationPolicy};
use tally_schemas::{DeviceIdentity, DevicePunch};
use tracing::{error, info, warn};

use crate::pipeline::{Ingestor, PunchOutcome};
use crate::IngestError;

/// Aggregate result of one bulk download.
///
/// `processed + ignored == fetched`. The remaining counters break `ignored`
/// down by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub fetched: usize,
    /// Records that opened or closed a session.
    pub processed: usize,
    pub ignored: usize,
    pub duplicates: usize,
    pub unmatched: usize,
    pub no_calendar: usize,
    pub malformed: usize,
    pub unknown_employee: usize,
    pub failed: usize,
}

impl Ingestor {
    /// Build a client for `device` and run [`Ingestor::ingest_bulk_range`].
    pub async fn download_from_device(
        &self,
        device: &DeviceIdentity,
        secrets: &ResolvedDeviceSecrets,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BulkSummary, IngestError> {
        check_range(from, to)?;
        let password = secrets
            .require_password(device)
            .map_err(|e| IngestError::InvalidDevice(format!("{e:#}")))?;
        let client = IsapiClient::for_device(device, password, self.options.device)?;
        self.ingest_bulk_range(&client, device, from, to).await
    }

    pub async fn ingest_bulk_range(
        &self,
        transport: &dyn DeviceTransport,
        device: &DeviceIdentity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BulkSummary, IngestError> {
        check_range(from, to)?;

        if !transport.connect().await {
            error!(device = %device.name, "device unreachable; bulk download aborted");
            return Err(IngestError::DeviceUnreachable(device.name.clone()));
        }

        let mut records = Vec::new();
        let mut class_failures = 0;
        for class in EventClass::ALL {
            match transport.fetch_events(from, to, class).await {
                Ok(batch) => records.extend(batch),
                Err(e) => {
                    warn!(device = %device.name, class = class.as_str(), error = %e, "event class fetch failed");
                    class_failures += 1;
                }
            }
        }
        if class_failures == EventClass::ALL.len() {
            return Err(IngestError::DeviceUnreachable(format!(
                "{}: no event class could be fetched",
                device.name
            )));
        }

        let mut summary = BulkSummary {
            fetched: records.len(),
            ..BulkSummary::default()
        };

        let mut punches: Vec<DevicePunch> = Vec::with_capacity(records.len());
        for rec in &records {
            match normalize_acs_record(rec, Some(device.address.as_str())) {
                Ok(p) => punches.push(p),
                Err(e) => {
                    warn!(device = %device.name, error = %e, "device record skipped");
                    summary.malformed += 1;
                }
            }
        }
        // Stable: equal instants keep device order.
        punches.sort_by_key(|p| p.at_utc);

        for punch in &punches {
            match self
                .process_punch(punch, Some(device), ReconciliationPolicy::ShiftDriven)
                .await
            {
                Ok(receipt) => match receipt.outcome {
                    PunchOutcome::Duplicate => summary.duplicates += 1,
                    PunchOutcome::Reconciled(outcome) => {
                        if outcome.is_applied() {
                            summary.processed += 1;
                        } else if outcome.ignored_reason() == Some(IgnoreReason::UnmatchedCheckout) {
                            summary.unmatched += 1;
                        }
                    }
                },
                Err(IngestError::NoCalendarAssigned { .. }) => summary.no_calendar += 1,
                Err(IngestError::UnknownEmployee(_)) => summary.unknown_employee += 1,
                Err(e) => {
                    error!(device = %device.name, code = e.code(), error = %e, "punch failed; continuing batch");
                    summary.failed += 1;
                }
            }
        }
        summary.ignored = summary.fetched - summary.processed;

        info!(
            device = %device.name,
            %from,
            %to,
            fetched = summary.fetched,
            processed = summary.processed,
            ignored = summary.ignored,
            duplicates = summary.duplicates,
            "bulk download complete"
        );
        Ok(summary)
    }
}

fn check_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(), IngestError> {
    if from >= to {
        return Err(IngestError::InvalidRange { from, to });
    }
    Ok(())
}
