//! Command handler modules for tally-cli.
//!
//! Shared config and store wiring lives here.

pub mod download;
pub mod replay;

use std::sync::Arc;

use anyhow::Result;
use tally_config::{load_layered_yaml, report_unused_keys, DirectorySeed, TallyConfig, UnusedKeyPolicy};
use tally_ingest::{IngestOptions, Ingestor, MemoryDirectory, MemoryStore};

/// Load, check and type the layered config.
pub fn load_config(config_paths: &[String]) -> Result<TallyConfig> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = load_layered_yaml(&path_refs)?;

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
    }
    TallyConfig::from_loaded(&loaded)
}

/// Postgres when TALLY_DATABASE_URL is set, otherwise a throwaway
/// in-memory store seeded from config.
pub async fn build_ingestor(cfg: &TallyConfig, seed: &DirectorySeed) -> Result<Ingestor> {
    let options = IngestOptions::from_config(cfg)?;
    if std::env::var(tally_db::ENV_DB_URL).is_ok() {
        let pool = tally_db::connect_from_env().await?;
        tally_db::migrate(&pool).await?;
        let store = Arc::new(tally_db::PgStore::new(pool));
        tally_db::seed_directory(&store, seed).await?;
        return Ok(Ingestor::new(store.clone(), store.clone(), store, options));
    }

    eprintln!("WARN: {} not set; results are not persisted", tally_db::ENV_DB_URL);
    let directory = Arc::new(MemoryDirectory::from_seed(seed.clone()));
    Ok(Ingestor::new(
        Arc::new(MemoryStore::new()),
        directory.clone(),
        directory,
        options,
    ))
}
