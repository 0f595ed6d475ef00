//! EFR CLI - Command line tool for the European flood-risk refresh.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "efr-cli",
    version,
    about = "European flood-risk forecast refresh toolkit"
)]
struct Cli {
    /// Configuration file (defaults to config/efr.toml when present)
    #[arg(short, long, global = true, env = "EFR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: efr_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    log::debug!("Starting efr-cli {}", env!("CARGO_PKG_VERSION"));
    efr_cmd::run(cli.command, cli.config).await
}
