mod commands;
mod logging;
mod render;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::logging::init_logging;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(version, about)]
/// varcol, inspect and edit variable-size column stores.
///
/// Every command operates on the store persisted in `--store` and prints
/// its result as JSON to stdout, logs are written to stderr.
pub struct Args {
    #[arg(long, env = "VARCOL_LOG_LEVEL", default_value = "warn")]
    /// Set the log level of the tool.
    ///
    /// This can filter on various levels, for example `info,varcol_store=debug`
    /// will display all logs at `info` level severity and above, and the
    /// store's own logs from `debug` up.
    log_level: String,
    #[arg(long, env = "VARCOL_LOG_JSON")]
    /// Emit logs in JSON format rather than as plain text.
    log_json: bool,
    #[arg(long, env = "VARCOL_LOG_NO_ANSI")]
    /// Disable ANSI colour codes being present in the logs.
    log_no_ansi: bool,
    #[arg(long, env = "VARCOL_STORE", default_value = "./varcol-data")]
    /// The directory the store is persisted in.
    store: PathBuf,
    #[command(subcommand)]
    command: commands::Commands,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args).context("Init logging")?;

    info!("varcol v{}", env!("CARGO_PKG_VERSION"));
    args.command.display_startup_message(&args.store);

    let Args { store, command, .. } = args;
    let output = command.execute(&store)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
