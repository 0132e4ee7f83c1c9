// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions.

use crate::handlers;
use crate::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;

/// API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/stats", get(handlers::stats))
        .route("/api/v1/subscriptions", get(handlers::subscriptions))
        .route("/api/v1/topics/subscribe", get(handlers::subscribe))
        .route("/api/v1/sensors", get(handlers::sensors))
        // Legacy route used by existing deployment scripts
        .route(
            "/api/create_kafka_topic_and_subscribe",
            get(handlers::subscribe),
        )
}

/// Live viewer endpoint
pub fn ws_routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(handlers::ws))
}
