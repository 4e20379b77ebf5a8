use anyhow::Result;
use clap::Parser;

use dbshift::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.execute().await
}
