//! Device push path: one event per call, label-driven, exact-second
//! duplicate tolerance.

use tally_device::{normalize_webhook, parse_webhook_json, WebhookEvent};
use tally_reconcile::ReconciliationPolicy;
use tracing::warn;

use crate::pipeline::{Ingestor, PunchReceipt};
use crate::store::Directory;
use crate::IngestError;

impl Ingestor {
    /// Parse the event JSON and ingest it.
    pub async fn ingest_webhook_json(&self, raw: &str) -> Result<PunchReceipt, IngestError> {
        let event = parse_webhook_json(raw).map_err(|e| {
            warn!(error = %e, "webhook payload rejected");
            IngestError::from(e)
        })?;
        self.ingest_webhook(&event).await
    }

    pub async fn ingest_webhook(&self, event: &WebhookEvent) -> Result<PunchReceipt, IngestError> {
        let punch = normalize_webhook(event).map_err(|e| {
            warn!(error = %e, "webhook event rejected");
            IngestError::from(e)
        })?;

        let address = punch.device_address.as_deref().unwrap_or_default();
        let device = self
            .directory
            .device_by_address(address)
            .await?
            .ok_or_else(|| {
                warn!(address, "webhook from unknown device");
                IngestError::UnknownDevice(address.to_string())
            })?;

        self.process_punch(&punch, Some(&device), ReconciliationPolicy::LabelDriven)
            .await
    }
}
