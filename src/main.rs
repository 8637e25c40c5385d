mod aggregate;
mod cli;
mod config;
mod download;
mod error;
mod export;
mod parquet;
mod raster;
mod request;
mod service;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Extract { run, summary } => match run.resolve() {
            Ok(config) => command::extract(&config, *summary)
                .await
                .map(|filename| format!("File saved to `{}`", filename)),
            Err(e) => Err(e.into()),
        },
        Commands::Plan { run } => match run.resolve() {
            Ok(config) => command::plan(&config),
            Err(e) => Err(e.into()),
        },
        Commands::Config {} => command::default_config(),
    };

    match outcome {
        Ok(message) => println!("{}", message),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
