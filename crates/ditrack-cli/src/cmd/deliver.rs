use anyhow::{Context as _, Result};
use clap::Args;
use ditrack_core::bus::{BusReport, EventBus};
use ditrack_core::handlers::{SyncContext, default_handlers};
use ditrack_core::ticketing::HttpTicketing;
use serde::Serialize;
use std::io::{self, BufRead};
use std::path::Path;
use tracing::info;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct DeliverArgs {
    /// Encoded state-change messages.
    pub messages: Vec<String>,

    /// Also read messages from stdin, one per line.
    #[arg(long)]
    pub stdin: bool,
}

#[derive(Debug, Serialize)]
struct OutcomeView {
    handler: &'static str,
    outcome: String,
    attempts: u32,
}

#[derive(Debug, Serialize)]
struct DeadLetterView {
    handler: &'static str,
    code: &'static str,
    error: String,
    attempts: u32,
    message: String,
}

#[derive(Debug, Serialize)]
struct DeliveryReport {
    messages: usize,
    retried: usize,
    outcomes: Vec<OutcomeView>,
    dead_letters: Vec<DeadLetterView>,
}

impl DeliveryReport {
    fn new(messages: usize, report: BusReport) -> Self {
        Self {
            messages,
            retried: report.retried,
            outcomes: report
                .outcomes
                .into_iter()
                .map(|entry| OutcomeView {
                    handler: entry.handler,
                    outcome: entry.outcome.to_string(),
                    attempts: entry.attempts,
                })
                .collect(),
            dead_letters: report
                .dead_letters
                .into_iter()
                .map(|letter| DeadLetterView {
                    handler: letter.handler,
                    code: letter.code.code(),
                    error: letter.error,
                    attempts: letter.attempts,
                    message: letter.message,
                })
                .collect(),
        }
    }
}

fn collect_messages(args: &DeliverArgs) -> Result<Vec<String>> {
    let mut messages = args.messages.clone();
    if args.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.context("read message from stdin")?;
            if !line.trim().is_empty() {
                messages.push(line);
            }
        }
    }
    Ok(messages)
}

/// Execute `ditrack deliver`.
///
/// # Errors
///
/// Returns an error if no messages were given, the store cannot be opened,
/// or any delivery ended as a dead letter.
pub fn run_deliver(
    args: &DeliverArgs,
    config: Option<&Path>,
    project_root: &Path,
    output: OutputMode,
) -> Result<()> {
    let messages = collect_messages(args)?;
    if messages.is_empty() {
        anyhow::bail!("no messages to deliver; pass them as arguments or use --stdin");
    }

    let loaded = super::load(config, project_root)?;
    let store = super::open_store(&loaded, project_root)?;
    let api = HttpTicketing::from_config(&loaded.config.ticketing);
    let ctx = SyncContext {
        store: store.as_ref(),
        api: &api,
        comments: &loaded.config.comments,
    };

    let bus_config = &loaded.config.bus;
    let mut bus = EventBus::new(ctx, default_handlers(), bus_config.max_attempts)
        .with_redelivery(bus_config.redelivery_policy())
        .with_max_concurrency(bus_config.max_concurrency);
    for message in &messages {
        bus.publish(message);
    }
    let report = bus.drain();
    let dead = report.dead_letters.len();
    info!(
        messages = messages.len(),
        finished = report.outcomes.len(),
        dead,
        "delivery finished"
    );

    render(output, &DeliveryReport::new(messages.len(), report), |report, w| {
        for outcome in &report.outcomes {
            pretty_kv(w, outcome.handler, &outcome.outcome)?;
        }
        for letter in &report.dead_letters {
            pretty_kv(
                w,
                letter.handler,
                format!("dead letter [{}] {}", letter.code, letter.error),
            )?;
        }
        Ok(())
    })?;

    if dead > 0 {
        anyhow::bail!("{dead} deliveries failed");
    }
    Ok(())
}
