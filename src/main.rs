use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod check;
mod cli;
mod config;
mod dataset;
mod error;
mod fixtures;
mod gate;
mod locator;
mod output;
mod runner;
mod time;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Check(args) => workflow::run_check(args),
        Command::Header(args) => workflow::run_header(args),
        Command::Fetch(args) => workflow::run_fetch(args),
        Command::Url(args) => workflow::run_url(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
