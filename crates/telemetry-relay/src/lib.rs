// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Telemetry Relay
//!
//! Consumes sensor telemetry from Kafka topics and relays every message to
//! two destinations at once:
//!
//! - **QuestDB**: each reading is appended as one Line Protocol row
//! - **Live viewers**: the raw payload is pushed to every connected WebSocket
//!
//! # Pipeline
//!
//! ```text
//! Provisioner --(topic ready)--> TopicConsumer --> decoder
//!                                                     |
//!                                   +-----------------+-----------------+
//!                                   v                                   v
//!                          ReadingSink (QuestDB)              ViewerHub (WebSocket)
//! ```
//!
//! # Quick Start
//!
//! ```bash
//! # Relay with defaults (kafka:9092, questdb:9000), subscribing at startup
//! telemetry-relay --topic sensor_data
//!
//! # Using a config file
//! telemetry-relay --config relay.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [broker]
//! brokers = "kafka:9092"
//!
//! [broker.retry]
//! delay_ms = 2000
//! max_attempts = 0   # retry forever
//!
//! [consumer]
//! on_decode_error = "skip"
//!
//! [store]
//! url = "http://questdb:9000"
//!
//! [server]
//! port = 8080
//! topics = ["sensor_data"]
//! ```

pub mod broker;
pub mod config;
pub mod consumer;
pub mod decoder;
pub mod dispatch;
pub mod hub;
pub mod kafka;
pub mod line_protocol;
pub mod provisioner;
pub mod questdb;
pub mod reading;
pub mod relay;
pub mod sink;
pub mod stats;

pub use broker::{Broker, BrokerError, MessageStream, ReadError, TopicSpec, TopicStatus};
pub use config::{ConfigError, DecodeFailurePolicy, RelayConfig};
pub use consumer::{ConsumerExit, TopicConsumer};
pub use decoder::{decode, DecodeError, PayloadShape};
pub use dispatch::Dispatcher;
pub use hub::{BroadcastReport, ViewerConnection, ViewerError, ViewerHub, ViewerId};
pub use kafka::KafkaBroker;
pub use provisioner::{ProvisionError, Provisioner, RetryPolicy};
pub use questdb::QuestDbClient;
pub use reading::{EnvelopedMessage, Reading, WireReading};
pub use relay::{Relay, RelayError, SubscriptionInfo, SubscriptionStatus};
pub use sink::{ReadingSink, SinkError};
pub use stats::{RelayStats, RelayStatsSnapshot};
