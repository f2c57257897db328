//! Strangler fig proxy - routes traffic between the monolith and the new services
//!
//! Configuration comes from the environment (optionally a .env file); a
//! malformed upstream URL stops the process before it starts serving.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use strangler::gateway::{build_router, MigrationRoll, SeededRoll};
use strangler::{GatewayConfig, GatewayState, PathRouter, Upstreams};

#[derive(Parser)]
#[command(name = "strangler-proxy")]
#[command(about = "Strangler fig gateway for gradual monolith migration", long_about = None)]
struct Cli {
    /// Listening port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load environment variables
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path)?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }

    // Initialize tracing
    strangler::observability::init_tracing();

    let mut config = GatewayConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let roll: Box<dyn MigrationRoll> = match config.migration_seed {
        Some(seed) => Box::new(SeededRoll::from_seed(seed)),
        None => Box::new(SeededRoll::from_entropy()),
    };

    let upstreams = Upstreams::new(
        config.monolith_url.clone(),
        config.movies_service_url.clone(),
        config.events_service_url.clone(),
    )?;

    let state = Arc::new(GatewayState {
        router: PathRouter::new(config.migration, roll),
        upstreams,
    });
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Strangler Fig Proxy started on port {}", config.port);
    tracing::info!("Monolith URL: {}", config.monolith_url);
    tracing::info!("Movies Service URL: {}", config.movies_service_url);
    tracing::info!("Events Service URL: {}", config.events_service_url);
    tracing::info!("Gradual migration enabled: {}", config.migration.enabled);
    tracing::info!("Movies migration percentage: {}%", config.migration.percent);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
