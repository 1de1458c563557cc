//! `cms-etl`: CMS RIF to i2b2 upload jobs.

use clap::Parser;
use cms_cli::logging::init_logging;
use tracing::error;

mod cli;
mod commands;

use crate::cli::{Cli, Command};
use crate::commands::{run_columns, run_upload};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    if let Err(err) = init_logging(&cli.log_config()) {
        eprintln!("error: failed to initialize logging: {err}");
        std::process::exit(1);
    }
    let result = match &cli.command {
        Command::Run(args) => run_upload(args).map(drop),
        Command::Columns(args) => run_columns(args),
    };
    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
