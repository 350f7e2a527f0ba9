// cli/mod.rs - process entry: serve, migrate or seed

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::database::{seed, DatabaseManager};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "microfinance-api")]
#[command(about = "Microfinance back office HTTP API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Port to listen on; overrides API_PORT")]
        port: Option<u16>,
    },

    #[command(about = "Apply pending database migrations and exit")]
    Migrate,

    #[command(about = "Insert permissions, roles and the admin user, then exit")]
    Seed,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env();
    tracing::info!("Starting Microfinance API in {:?} mode", config.environment);

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.api.port = port;
            }
            serve(config).await
        }
        Command::Migrate => {
            let pool = DatabaseManager::connect(&config.database).await?;
            DatabaseManager::migrate(&pool).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Command::Seed => {
            let pool = DatabaseManager::connect(&config.database).await?;
            let state = AppState::from_config(pool, config)?;
            seed::run(&state.pool, &state.config.database, state.auth.as_ref()).await?;
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let pool = DatabaseManager::connect(&config.database).await?;
    if config.database.run_migrations {
        DatabaseManager::migrate(&pool).await?;
    }

    let port = config.api.port;
    let state = AppState::from_config(pool, config)?;
    if state.config.database.seed_data {
        seed::run(&state.pool, &state.config.database, state.auth.as_ref()).await?;
    }

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Microfinance API listening on http://{}", bind_addr);

    axum::serve(listener, crate::routes::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
