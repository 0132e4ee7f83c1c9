// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor simulator for the telemetry relay.
//!
//! Spawns one task per simulated device. Each device publishes a random
//! reading (temperature, humidity, CO2) to a Kafka topic at its own fixed
//! interval, drawn once at startup.
//!
//! # Usage
//!
//! ```bash
//! # 10 incubators on localhost
//! relay-sim --brokers localhost:9092 --sensors 10
//!
//! # Flat payloads instead of the {"value": {...}} envelope
//! relay-sim --flat --prefix LAB --sensors 3
//! ```

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::ops::Range;
use std::time::Duration;
use telemetry_relay::{EnvelopedMessage, Reading};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const TEMPERATURE_RANGE: Range<f64> = -10.0..30.0;
const HUMIDITY_RANGE: Range<f64> = 0.0..100.0;
const CO2_RANGE: Range<f64> = 0.0..100.0;

/// Telemetry sensor simulator
#[derive(Parser, Debug, Clone)]
#[command(name = "relay-sim")]
#[command(about = "Publish simulated sensor readings to Kafka")]
#[command(version)]
struct Args {
    /// Kafka bootstrap servers
    #[arg(short, long, default_value = "localhost:9092")]
    brokers: String,

    /// Destination topic
    #[arg(short, long, default_value = "sensor_data")]
    topic: String,

    /// Number of simulated devices
    #[arg(short = 'n', long, default_value = "5")]
    sensors: usize,

    /// Serial number prefix (serials are <prefix>0000, <prefix>0001, ...)
    #[arg(short, long, default_value = "ABC")]
    prefix: String,

    /// Sensor type reported by every device
    #[arg(long, default_value = "Incubator")]
    sensor_type: String,

    /// Shortest publish interval (seconds)
    #[arg(long, default_value = "5")]
    min_interval: u64,

    /// Longest publish interval, exclusive (seconds)
    #[arg(long, default_value = "10")]
    max_interval: u64,

    /// Delay between device start-ups (milliseconds)
    #[arg(long, default_value = "2000")]
    stagger_ms: u64,

    /// Publish flat records instead of enveloped ones
    #[arg(long)]
    flat: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if args.min_interval == 0 || args.max_interval <= args.min_interval {
        anyhow::bail!(
            "invalid interval range {}..{} seconds",
            args.min_interval,
            args.max_interval
        );
    }

    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &args.brokers)
        .set("message.timeout.ms", "5000")
        .create()
        .context("creating Kafka producer")?;

    info!("Telemetry sensor simulator v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "{} device(s) -> topic '{}' on {} ({})",
        args.sensors,
        args.topic,
        args.brokers,
        if args.flat { "flat" } else { "enveloped" }
    );

    for serial in serials(&args.prefix, args.sensors) {
        let interval = Duration::from_secs(fastrand::u64(args.min_interval..args.max_interval));
        info!("Starting {} (every {:?})", serial, interval);

        tokio::spawn(run_device(producer.clone(), args.clone(), serial, interval));
        tokio::time::sleep(Duration::from_millis(args.stagger_ms)).await;
    }

    tokio::signal::ctrl_c().await?;
    info!("Stopping simulator");
    Ok(())
}

/// Publish readings for one device forever.
async fn run_device(producer: FutureProducer, args: Args, serial: String, interval: Duration) {
    loop {
        let reading = random_reading(&serial, &args.sensor_type);
        match encode(&reading, args.flat) {
            Ok(payload) => {
                let record = FutureRecord::<(), Vec<u8>>::to(&args.topic).payload(&payload);
                match producer.send(record, Duration::from_secs(5)).await {
                    Ok(_) => debug!("{} published {} bytes", serial, payload.len()),
                    Err((e, _)) => warn!("{} failed to publish: {}", serial, e),
                }
            }
            Err(e) => warn!("{} failed to encode reading: {}", serial, e),
        }

        tokio::time::sleep(interval).await;
    }
}

/// Device serials: prefix followed by a zero-padded four-digit index.
fn serials(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{:04}", prefix, i)).collect()
}

fn random_reading(serial: &str, sensor_type: &str) -> Reading {
    Reading::new(
        serial,
        sensor_type,
        Utc::now(),
        vec![
            uniform(TEMPERATURE_RANGE),
            uniform(HUMIDITY_RANGE),
            uniform(CO2_RANGE),
        ],
    )
}

/// Uniform sample from a half-open range.
fn uniform(range: Range<f64>) -> f64 {
    range.start + fastrand::f64() * (range.end - range.start)
}

fn encode(reading: &Reading, flat: bool) -> serde_json::Result<Vec<u8>> {
    let wire = reading.to_wire();
    if flat {
        serde_json::to_vec(&wire)
    } else {
        serde_json::to_vec(&EnvelopedMessage::new(wire))
    }
}
