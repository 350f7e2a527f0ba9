use clap::Parser;
use tracing_subscriber::EnvFilter;

use microfinance_api::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT secrets, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("microfinance_api=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = microfinance_api::cli::run(cli).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
