//! Events service - HTTP ingestion to NATS JetStream plus per-topic consumers
//!
//! The HTTP surface and the three consumer loops start together. A consumer
//! that fails only takes down its own topic. The HTTP surface starts even when
//! the broker is unreachable; publishes fail with 500 until it comes up.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use strangler::events::{build_router, supervise, AppState, ConsumeError, EventPublisher, Topic};
use strangler::{EventsConfig, InMemoryBroker, NatsClient};

#[derive(Parser)]
#[command(name = "events-service")]
#[command(about = "Event ingestion service backed by NATS JetStream", long_about = None)]
struct Cli {
    /// Listening port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Load environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Use a process-local broker instead of NATS (events are lost on exit)
    #[arg(long)]
    in_memory: bool,
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

    let mut config = EventsConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    // One consumer loop per topic, all in the same group
    let mut consumers = Vec::with_capacity(Topic::ALL.len());
    let publisher: Arc<dyn EventPublisher> = if cli.in_memory {
        tracing::warn!("Using the in-memory broker; events do not leave this process");
        let broker = InMemoryBroker::new();
        for topic in Topic::ALL {
            let broker = broker.clone();
            consumers.push(tokio::spawn(supervise(
                topic,
                config.restart_policy,
                move || {
                    let source = broker.subscribe(topic);
                    async move { Ok::<_, ConsumeError>(source) }
                },
            )));
        }
        Arc::new(broker)
    } else {
        // Connects in the background; an unreachable broker is not fatal
        let nats = NatsClient::connect(&config).await.map_err(|e| {
            tracing::error!("Failed to create NATS client: {}", e);
            e
        })?;
        for topic in Topic::ALL {
            let nats = nats.clone();
            consumers.push(tokio::spawn(supervise(
                topic,
                config.restart_policy,
                move || {
                    let nats = nats.clone();
                    async move { nats.subscribe(topic).await }
                },
            )));
        }
        Arc::new(nats)
    };

    let state = AppState { publisher };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Events service starting on port {}", config.port);
    if !cli.in_memory {
        tracing::info!("Connecting to NATS brokers at {:?}", config.broker_addrs);
        tracing::info!(
            "Consumer group '{}' on stream '{}'",
            config.consumer_group,
            config.stream_name
        );
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    for handle in consumers {
        match handle.await {
            Ok(exit) => tracing::warn!(
                "Consumer for topic {} exited after {} messages: {}",
                exit.topic,
                exit.messages_read,
                exit.error
            ),
            Err(e) => tracing::error!("Consumer task failed: {}", e),
        }
    }

    server.await??;

    Ok(())
}
