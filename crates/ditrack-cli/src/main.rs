#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ditrack: deficient-item ticket sync engine",
    long_about = None
)]
struct Cli {
    /// Config file to use instead of the default lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Encode a state-change message",
        after_help = "EXAMPLES:\n    # Message for a pending item\n    ditrack encode prop-1 di-1 pending\n\n    # Include the write version\n    ditrack encode prop-1 di-1 pending --write-version 12"
    )]
    Encode(cmd::codec::EncodeArgs),

    #[command(
        about = "Decode a state-change message",
        after_help = "EXAMPLES:\n    ditrack decode cHJvcC0xL2RpLTEvc3RhdGUvcGVuZGluZw=="
    )]
    Decode(cmd::codec::DecodeArgs),

    #[command(
        about = "Load documents into the store",
        long_about = "Load items, users, credentials, property integrations and card references from a JSON file into the configured store.",
        after_help = "EXAMPLES:\n    ditrack import fixtures.json"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        about = "Deliver messages to every sync handler",
        long_about = "Publish state-change messages on the in-process bus and run every sync handler against the configured store and ticketing API.",
        after_help = "EXAMPLES:\n    # Deliver one message\n    ditrack deliver cHJvcC0xL2RpLTEvc3RhdGUvcGVuZGluZw==\n\n    # One message per line from stdin\n    ditrack deliver --stdin < messages.txt"
    )]
    Deliver(cmd::deliver::DeliverArgs),

    #[command(
        about = "Preview comment template selection",
        after_help = "EXAMPLES:\n    ditrack templates requires-action pending --field firstName=Ada"
    )]
    Templates(cmd::templates::TemplatesArgs),

    #[command(about = "Show the effective configuration")]
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DITRACK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "ditrack=debug,ditrack_core=debug,info"
        } else {
            "ditrack=info,ditrack_core=info,warn"
        })
    });

    let format = env::var("DITRACK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    let config = cli.config.as_deref();
    debug!(root = %project_root.display(), ?config, "starting");

    match cli.command {
        Commands::Encode(ref args) => cmd::codec::run_encode(args, output),
        Commands::Decode(ref args) => cmd::codec::run_decode(args, output),
        Commands::Import(ref args) => cmd::import::run_import(args, config, &project_root, output),
        Commands::Deliver(ref args) => {
            cmd::deliver::run_deliver(args, config, &project_root, output)
        }
        Commands::Templates(ref args) => {
            cmd::templates::run_templates(args, config, &project_root, output)
        }
        Commands::Config => cmd::config::run_config(config, &project_root, output),
    }
}
