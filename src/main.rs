mod auth;
mod bridge;
mod cli;
mod config;
mod credentials;
mod detect;
mod error;
mod intents;
mod logging;
mod provider;
mod server;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing(1000);

    let cli = Cli::parse();
    cli::run(cli).await
}
