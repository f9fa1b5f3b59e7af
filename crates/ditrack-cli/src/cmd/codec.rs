use anyhow::{Context as _, Result};
use clap::Args;
use ditrack_core::codec::{self, StateChangeEvent};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct EncodeArgs {
    pub property_id: String,
    pub item_id: String,
    pub state: String,

    /// Causality token of the write that produced the change.
    #[arg(long)]
    pub write_version: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Base64 message as published on the bus.
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventView {
    message: String,
    path: String,
    property_id: String,
    item_id: String,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_version: Option<u64>,
}

impl EventView {
    fn new(event: StateChangeEvent) -> Result<Self> {
        Ok(Self {
            message: codec::encode_event(&event).context("encode state-change message")?,
            path: event.to_path().context("encode state-change message")?,
            property_id: event.property_id,
            item_id: event.item_id,
            state: event.state,
            write_version: event.write_version,
        })
    }
}

/// Execute `ditrack encode`.
///
/// # Errors
///
/// Returns an error if any segment is empty, contains `/` or has surrounding
/// whitespace, or on write failure.
pub fn run_encode(args: &EncodeArgs, output: OutputMode) -> Result<()> {
    let mut event = StateChangeEvent::new(&args.property_id, &args.item_id, &args.state);
    if let Some(version) = args.write_version {
        event = event.with_write_version(version);
    }

    render(output, &EventView::new(event)?, |view, w| {
        writeln!(w, "{}", view.message)
    })
}

/// Execute `ditrack decode`.
///
/// # Errors
///
/// Returns an error if the message is malformed, or on write failure.
pub fn run_decode(args: &DecodeArgs, output: OutputMode) -> Result<()> {
    let event = codec::decode(&args.message).context("decode state-change message")?;

    render(output, &EventView::new(event)?, |view, w| {
        pretty_kv(w, "property", &view.property_id)?;
        pretty_kv(w, "item", &view.item_id)?;
        pretty_kv(w, "state", &view.state)?;
        if let Some(version) = view.write_version {
            pretty_kv(w, "write version", version.to_string())?;
        }
        Ok(())
    })
}
