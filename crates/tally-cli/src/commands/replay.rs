//! `tally replay`: feed a saved webhook payload through the webhook path.

use anyhow::{anyhow, Context, Result};
use std::fs;
use tally_ingest::ReceiptView;

use super::{build_ingestor, load_config};

pub async fn run(config_paths: &[String], payload_file: &str) -> Result<()> {
    let bytes = fs::read(payload_file)
        .with_context(|| format!("read payload file failed: {payload_file}"))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let raw = String::from_utf8(bytes.to_vec()).context("payload file must be UTF-8 text")?;

    let cfg = load_config(config_paths)?;
    let seed = cfg.directory_seed();
    let ingestor = build_ingestor(&cfg, &seed).await?;

    let receipt = ingestor
        .ingest_webhook_json(raw.trim())
        .await
        .map_err(|e| anyhow!("{}: {e}", e.code()))?;
    let view = ReceiptView::from(&receipt);

    println!("employee_id={}", view.employee_id);
    println!("status={}", view.status);
    if let Some(reason) = view.reason {
        println!("reason={reason}");
    }
    for id in &view.session_ids {
        println!("session_id={id}");
    }
    Ok(())
}
