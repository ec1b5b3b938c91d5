mod cli;
mod commands;
mod config;
mod retry;

use anyhow::Result;
use clap::Parser;
use therapist_core::CancelSignal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use commands::Context;
use config::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let directive = if cli.verbose {
        "therapist=debug"
    } else {
        "therapist=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::resolve(cli.config.as_deref())?;
    let process_name = cli
        .process
        .clone()
        .unwrap_or_else(|| config.process_name.clone());

    let cancel = CancelSignal::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Interrupted, stopping...");
        handler_cancel.cancel();
    })?;

    debug!("Target process: {}", process_name);
    let ctx = Context {
        config,
        process_name,
        cancel,
    };

    match cli.command {
        Command::Status => commands::status::run(&ctx),
        Command::Scan => commands::scan::run(&ctx),
        Command::List { group, labor, json } => {
            commands::list::run(&ctx, group, labor.as_deref(), json)
        }
        Command::Edit {
            changes,
            profession,
            entity,
            dry_run,
        } => commands::edit::run(
            &ctx,
            changes.as_deref(),
            profession.as_deref(),
            &entity,
            dry_run,
        ),
        Command::Dump { output } => commands::dump::run(&ctx, output.as_deref()),
    }
}
