mod cli;
mod commands;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    chemfetch::observability::init_tracing();

    let cli = Cli::parse();
    commands::run(cli).await
}
