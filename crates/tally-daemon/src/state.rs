//! Shared runtime state for tally-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The ingestor holds the
//! store, directory and per-employee locks; everything else is read-only.

use std::sync::Arc;

use anyhow::Result;
use tally_config::secrets::{resolve_device_secrets, ResolvedDeviceSecrets};
use tally_config::TallyConfig;
use tally_ingest::{IngestOptions, Ingestor, MemoryDirectory, MemoryStore};

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            service: "tally-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Where attendance is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    Postgres,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Memory => "memory",
            StoreMode::Postgres => "postgres",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub mode: StoreMode,
    pub ingestor: Ingestor,
    /// Device passwords, resolved once at startup.
    pub secrets: Arc<ResolvedDeviceSecrets>,
}

impl AppState {
    pub fn new(mode: StoreMode, ingestor: Ingestor, secrets: ResolvedDeviceSecrets) -> Self {
        Self {
            build: BuildInfo::default(),
            mode,
            ingestor,
            secrets: Arc::new(secrets),
        }
    }

    /// In-memory store seeded from the configured directory.
    pub fn in_memory(cfg: &TallyConfig) -> Result<Self> {
        let seed = cfg.directory_seed();
        let secrets = resolve_device_secrets(&seed.devices);
        let directory = Arc::new(MemoryDirectory::from_seed(seed));
        let ingestor = Ingestor::new(
            Arc::new(MemoryStore::new()),
            directory.clone(),
            directory,
            IngestOptions::from_config(cfg)?,
        );
        Ok(Self::new(StoreMode::Memory, ingestor, secrets))
    }

    /// Postgres-backed store. The configured directory is written to the
    /// database first.
    pub async fn postgres(cfg: &TallyConfig, pool: tally_db::PgPool) -> Result<Self> {
        let store = Arc::new(tally_db::PgStore::new(pool));
        let seed = cfg.directory_seed();
        tally_db::seed_directory(&store, &seed).await?;
        let secrets = resolve_device_secrets(&seed.devices);
        let ingestor = Ingestor::new(
            store.clone(),
            store.clone(),
            store,
            IngestOptions::from_config(cfg)?,
        );
        Ok(Self::new(StoreMode::Postgres, ingestor, secrets))
    }
}
