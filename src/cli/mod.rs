//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    config::Config,
    error::Result,
    request::{Frequency, Reducer},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download, aggregate and export precipitation for a region
    Extract {
        #[command(flatten)]
        run: RunArgs,
        /// Also save per-bucket statistics next to the export
        #[arg(long)]
        summary: bool,
    },
    /// Show the request and output grid without contacting the service
    Plan {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the default configuration
    Config {},
}

/// Configuration file plus per-run overrides.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Location name used in the output folder
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long, value_enum)]
    pub frequency: Option<Frequency>,
    #[arg(long, value_enum)]
    pub reducer: Option<Reducer>,
    #[arg(long)]
    pub start_year: Option<i32>,
    /// Exclusive
    #[arg(long)]
    pub end_year: Option<i32>,
    /// Base directory for exports
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
    /// Per-call network timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl RunArgs {
    /// Loads the configuration file, or the defaults, and applies overrides.
    pub fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(location) = &self.location {
            config.location = location.clone();
        }
        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }
        if let Some(reducer) = self.reducer {
            config.reducer = reducer;
        }
        if let Some(start_year) = self.start_year {
            config.start_year = start_year;
        }
        if let Some(end_year) = self.end_year {
            config.end_year = end_year;
        }
        if let Some(out_dir) = &self.out_dir {
            config.out_dir = out_dir.clone();
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }

        Ok(config)
    }
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    )
}

// -- Tests -------------------------------------------------------------------
