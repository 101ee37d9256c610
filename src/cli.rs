//! CLI argument parsing for the regression harness.
//!
//! Commands share the batch config; the `url` command only needs an endpoint
//! and a dataset id so addresses can be checked by hand.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "dapreg",
    version,
    about = "Regression harness for OPeNDAP dataset access",
    after_help = "Commands:\n  check --config <file>                  Header, timed fetch and content check per scenario\n  header --config <file>                 Header-only comparison per scenario\n  fetch --config <file>                  Download missing local fixtures\n  url --endpoint <host> --dataset <id>   Print the remote dataset address\n\nExamples:\n  dapreg check --config batch.json --out report.json\n  dapreg check --config batch.json --mirror mirror/\n  dapreg url --endpoint 145.23.218.149 --dataset 'Many%20small%20files_1'",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Check(CheckArgs),
    Header(HeaderArgs),
    Fetch(FetchArgs),
    Url(UrlArgs),
}

/// Dataset source options shared by the batch commands.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Batch config JSON (endpoint, thresholds, scenarios)
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Serve remote addresses from <DIR>/<dataset id>.json instead of the network
    #[arg(long, value_name = "DIR")]
    pub mirror: Option<PathBuf>,

    /// Download missing local fixtures before running
    #[arg(long)]
    pub download: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Run the full regression batch, stopping at the first failure")]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Write the JSON run report here
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Compare local and remote headers without reading data")]
pub struct HeaderArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Write the JSON run report here
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Download missing local fixtures and exit")]
pub struct FetchArgs {
    /// Batch config JSON (endpoint, thresholds, scenarios)
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Print the remote address of a dataset")]
pub struct UrlArgs {
    /// Server host, optionally with a port
    #[arg(long, value_name = "HOST")]
    pub endpoint: String,

    /// Dataset id, already URL-encoded
    #[arg(long, value_name = "ID")]
    pub dataset: String,
}
