//! Command implementations for the EFR CLI.
//!
//! Provides subcommands for the incremental flood-risk refresh and for
//! inspecting the region dataset and its features.

use chrono::NaiveDate;
use clap::Subcommand;
use std::path::PathBuf;

pub mod commands;
pub mod config;
pub mod features;
pub mod publish;
pub mod refresh;

#[derive(Subcommand)]
pub enum Command {
    /// Refresh flood forecasts for every region not yet updated today
    Refresh {
        /// Keep the updated dataset local instead of publishing it
        #[arg(long)]
        no_publish: bool,

        /// Download the published dataset before refreshing
        #[arg(long)]
        download: bool,
    },

    /// Download the published dataset to the configured path
    Download,

    /// Report how many regions are fresh or stale
    Status {
        /// Date to check against (defaults to today, UTC)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },

    /// Export the assembled feature matrix for the first regions as CSV
    Features {
        /// Output CSV path
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Number of regions to include
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Run date the forecast window is built around (defaults to today, UTC)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,

        /// Also score each row with both classifiers
        #[arg(long)]
        with_predictions: bool,
    },
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    efr_utils::dates::parse_date(s).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

pub async fn run(command: Command, config: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = config::load_settings(config)?;
    match command {
        Command::Refresh {
            no_publish,
            download,
        } => commands::run_refresh(&settings, !no_publish, download).await,
        Command::Download => commands::run_download(&settings).await,
        Command::Status { date } => commands::run_status(&settings, date),
        Command::Features {
            output,
            limit,
            date,
            with_predictions,
        } => commands::run_features(&settings, &output, limit, date, with_predictions).await,
    }
}
