mod anomaly;
mod config;
mod error;
mod figure;
mod literal;
mod manager;
mod readers;
mod series;
mod stats;

use crate::config::Config;
use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    /// Directory holding the input datasets.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// PNG file to write.
    #[arg(long, default_value = "OHAnomaly_1850-2014_IPCC_AR6.png")]
    output: PathBuf,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the normalized traces as JSON.
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let cfg = match &args.config {
        Some(file) => Config::from_file(file).context("failed to construct cfg")?,
        None => Config::default(),
    };

    let mgr = Manager::new(&args.data_dir, cfg);
    mgr.run(&args.output, args.export.as_deref())?;

    log::info!("wrote {:?}", args.output);

    Ok(())
}
