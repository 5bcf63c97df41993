mod bootstrap_helpers;
mod bot_config;
mod cli_args;
mod runtime;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::runtime::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());
    run_cli(cli).await
}
