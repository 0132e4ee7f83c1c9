// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry Relay server.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: kafka:9092, questdb:9000, HTTP on 0.0.0.0:8080
//! telemetry-relay
//!
//! # Subscribe to topics at startup
//! telemetry-relay --topic sensor_data --topic lab_data
//!
//! # Using configuration file
//! telemetry-relay --config relay.toml
//!
//! # Write an example configuration
//! telemetry-relay gen-config --output relay.toml
//! ```
//!
//! # Endpoints
//!
//! - `GET /ws` - Live readings (WebSocket)
//! - `GET /health` - Health check
//! - `GET /api/v1/stats` - Relay counters
//! - `GET /api/v1/subscriptions` - Subscribed topics
//! - `GET /api/v1/topics/subscribe?topic_name=<t>` - Provision and subscribe
//! - `GET /api/v1/sensors` - Latest reading per device

mod handlers;
mod routes;
mod viewer;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telemetry_relay::{KafkaBroker, QuestDbClient, Relay, RelayConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Kafka to QuestDB and WebSocket telemetry relay
#[derive(Parser, Debug)]
#[command(name = "telemetry-relay")]
#[command(about = "Relays Kafka sensor telemetry into QuestDB and to live WebSocket viewers")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// HTTP server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Kafka bootstrap servers (comma-separated)
    #[arg(long)]
    brokers: Option<String>,

    /// QuestDB HTTP URL
    #[arg(long)]
    store_url: Option<String>,

    /// Topic to provision and subscribe at startup (can repeat)
    #[arg(short, long = "topic")]
    topics: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "relay.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Shared application state
pub struct AppState {
    relay: Relay<KafkaBroker>,
    store: QuestDbClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = &args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;
    info!("Telemetry Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Brokers: {}", config.broker.brokers);
    info!("Store: {} (table {})", config.store.url, config.store.table);

    let broker = Arc::new(KafkaBroker::new(&config.broker).context("creating Kafka client")?);
    let store = QuestDbClient::new(&config.store).context("creating QuestDB client")?;
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let startup_topics = config.server.topics.clone();

    let state = Arc::new(AppState {
        relay: Relay::new(config, broker, Arc::new(store.clone())),
        store,
    });

    for topic in &startup_topics {
        match state.relay.provision_and_subscribe(topic).await {
            Ok(status) => info!("Startup subscription: {:?}", status),
            Err(e) => error!("Failed to subscribe to '{}' at startup: {}", topic, e),
        }
    }

    let app = routes::api_routes()
        .merge(routes::ws_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    info!("HTTP API: http://{}/api/v1", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down consumers...");
    state.relay.shutdown().await;

    let stats = state.relay.stats();
    info!(
        "Final: {} received, {} stored, {} decode errors, {} sink errors",
        stats.messages_received, stats.readings_stored, stats.decode_errors, stats.sink_errors
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received");
}

fn build_config(args: &Args) -> anyhow::Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RelayConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(brokers) = &args.brokers {
        config.broker.brokers = brokers.clone();
    }
    if let Some(url) = &args.store_url {
        config.store.url = url.clone();
    }
    for topic in &args.topics {
        if !config.server.topics.contains(topic) {
            config.server.topics.push(topic.clone());
        }
    }

    config.validate()?;
    Ok(config)
}

fn cmd_gen_config(output: &Path) -> anyhow::Result<()> {
    let mut example = RelayConfig::default();
    example.server.topics = vec!["sensor_data".to_string()];

    let toml_str = toml::to_string_pretty(&example)?;
    std::fs::write(output, toml_str).with_context(|| format!("writing {}", output.display()))?;
    println!("Generated configuration: {}", output.display());
    Ok(())
}

fn cmd_validate(config: &Path) -> anyhow::Result<()> {
    let loaded = RelayConfig::from_file(config)?;
    println!("Configuration is valid: {}", config.display());
    println!("  Brokers: {}", loaded.broker.brokers);
    println!("  Store: {} ({})", loaded.store.url, loaded.store.table);
    println!("  Startup topics: {}", loaded.server.topics.len());
    println!("  Decode failures: {:?}", loaded.consumer.on_decode_error);
    Ok(())
}
