use clap::Parser;
use medbot_cli::{Cli, commands, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads env-backed flags.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init_tracing(cli.verbose);

    commands::run(cli).await
}
