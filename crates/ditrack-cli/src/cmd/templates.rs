use anyhow::Result;
use clap::Args;
use ditrack_core::templates::{TemplateFields, render as render_template};
use serde::Serialize;
use std::path::Path;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct TemplatesArgs {
    pub previous_state: String,
    pub current_state: String,

    /// Interpolation field as `name=value`; repeatable.
    #[arg(long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, String)>,

    /// Render every candidate, not only the one that would be posted.
    #[arg(long)]
    pub all: bool,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))
}

#[derive(Debug, Serialize)]
struct Preview {
    candidates: Vec<String>,
    rendered: Vec<String>,
}

/// Execute `ditrack templates`.
///
/// # Errors
///
/// Returns an error if either state is empty or config loading fails.
pub fn run_templates(
    args: &TemplatesArgs,
    config: Option<&Path>,
    project_root: &Path,
    output: OutputMode,
) -> Result<()> {
    let loaded = super::load(config, project_root)?;
    let candidates = loaded
        .config
        .comments
        .templates
        .select(&args.previous_state, &args.current_state)?;

    let mut fields = TemplateFields::new()
        .with("previousState", args.previous_state.as_str())
        .with("currentState", args.current_state.as_str());
    for (name, value) in &args.fields {
        fields.set(name, value.as_str());
    }

    let shown = if args.all { candidates.len() } else { 1 };
    let rendered = candidates
        .iter()
        .take(shown)
        .map(|template| render_template(template, &fields))
        .collect();

    render(output, &Preview { candidates, rendered }, |preview, w| {
        for text in &preview.rendered {
            writeln!(w, "{text}")?;
            if args.all {
                writeln!(w, "---")?;
            }
        }
        Ok(())
    })
}
