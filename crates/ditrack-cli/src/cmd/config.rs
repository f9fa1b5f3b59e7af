use anyhow::{Context as _, Result};
use ditrack_core::config::EngineConfig;
use serde::Serialize;
use std::path::Path;

use crate::output::{OutputMode, render};

#[derive(Debug, Serialize)]
struct ConfigView {
    source: Option<String>,
    store_path: String,
    config: EngineConfig,
}

/// Execute `ditrack config`.
///
/// # Errors
///
/// Returns an error if config loading or serialization fails.
pub fn run_config(config: Option<&Path>, project_root: &Path, output: OutputMode) -> Result<()> {
    let loaded = super::load(config, project_root)?;
    let view = ConfigView {
        source: loaded.source.as_ref().map(|path| path.display().to_string()),
        store_path: loaded
            .config
            .store
            .resolve_path(project_root)
            .display()
            .to_string(),
        config: loaded.config,
    };
    let toml_text = toml::to_string_pretty(&view.config).context("serialize config")?;

    render(output, &view, |view, w| {
        writeln!(
            w,
            "# source: {}",
            view.source.as_deref().unwrap_or("(defaults)")
        )?;
        writeln!(w, "# store: {}", view.store_path)?;
        write!(w, "{toml_text}")
    })
}
