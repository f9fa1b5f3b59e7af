pub mod codec;
pub mod config;
pub mod deliver;
pub mod import;
pub mod templates;

use anyhow::Result;
use ditrack_core::config::{LoadedConfig, load_config};
use ditrack_core::store::{DocumentStore, MirroredStore, SqliteStore};
use std::path::Path;
use tracing::info;

/// Resolve config for a command and log where it came from.
pub fn load(explicit: Option<&Path>, project_root: &Path) -> Result<LoadedConfig> {
    let loaded = load_config(explicit, project_root)?;
    match &loaded.source {
        Some(path) => info!(source = %path.display(), "config loaded"),
        None => info!("no config file found, using defaults"),
    }
    Ok(loaded)
}

/// Open the configured SQLite store, mirrored into the legacy store when
/// `[store] legacy_path` is set.
pub fn open_store(loaded: &LoadedConfig, project_root: &Path) -> Result<Box<dyn DocumentStore>> {
    let store = &loaded.config.store;
    let primary = SqliteStore::open(&store.resolve_path(project_root))?;
    let Some(legacy_path) = store.resolve_legacy_path(project_root) else {
        return Ok(Box::new(primary));
    };
    info!(legacy = %legacy_path.display(), "mirroring writes into legacy store");
    let legacy = SqliteStore::open(&legacy_path)?;
    Ok(Box::new(MirroredStore::new(primary, legacy)))
}
