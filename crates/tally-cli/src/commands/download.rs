//! `tally download`: pull a device range and print the summary.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tally_config::secrets::resolve_device_secrets;
use tally_schemas::DeviceIdentity;
use uuid::Uuid;

use super::{build_ingestor, load_config};

/// `selector` is a device id, name or address.
pub fn find_device<'a>(devices: &'a [DeviceIdentity], selector: &str) -> Option<&'a DeviceIdentity> {
    let selector = selector.trim();
    if let Ok(id) = Uuid::parse_str(selector) {
        return devices.iter().find(|d| d.device_id == id);
    }
    devices
        .iter()
        .find(|d| d.name == selector)
        .or_else(|| devices.iter().find(|d| d.address == selector))
}

pub async fn run(
    config_paths: &[String],
    selector: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<()> {
    let cfg = load_config(config_paths)?;
    let seed = cfg.directory_seed();
    let device = find_device(&seed.devices, selector)
        .cloned()
        .ok_or_else(|| anyhow!("no configured device matches '{selector}'"))?;
    let secrets = resolve_device_secrets(&seed.devices);
    let ingestor = build_ingestor(&cfg, &seed).await?;

    let summary = ingestor
        .download_from_device(&device, &secrets, from, to)
        .await
        .map_err(|e| anyhow!("{}: {e}", e.code()))?;

    println!("device={}", device.name);
    println!("fetched={}", summary.fetched);
    println!("processed={}", summary.processed);
    println!("ignored={}", summary.ignored);
    println!("duplicates={}", summary.duplicates);
    println!("unmatched={}", summary.unmatched);
    println!("no_calendar={}", summary.no_calendar);
    println!("malformed={}", summary.malformed);
    println!("unknown_employee={}", summary.unknown_employee);
    println!("failed={}", summary.failed);
    Ok(())
}
