// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP request handlers.

use crate::viewer::handle_socket;
use crate::AppState;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telemetry_relay::{ProvisionError, RelayError, SinkError, SubscriptionStatus};
use tracing::{error, warn};

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let code = match &err {
            RelayError::InvalidTopic { .. } => 400,
            RelayError::Provision(ProvisionError::BrokerUnavailable { .. }) => 503,
            RelayError::ShuttingDown => 503,
            RelayError::Provision(ProvisionError::TopicCreateFailed { .. }) => 500,
            RelayError::Subscribe { .. } => 500,
        };
        Self {
            error: error_chain(&err),
            code,
        }
    }
}

impl From<SinkError> for ApiError {
    fn from(err: SinkError) -> Self {
        let code = match &err {
            SinkError::Connect(_) => 503,
            SinkError::Timeout(_) => 504,
            _ => 502,
        };
        Self {
            error: err.to_string(),
            code,
        }
    }
}

/// Render an error and its sources on one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    topic_name: Option<String>,
}

/// GET /ws
pub async fn ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if !state.relay.hub().has_capacity().await {
        warn!("Connection rejected: max viewers reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "viewers": state.relay.active_viewer_count().await,
        "max_viewers": state.relay.config().hub.max_viewers,
    }))
}

/// GET /api/v1/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.relay.stats())
}

/// GET /api/v1/subscriptions
pub async fn subscriptions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.relay.subscriptions())
}

/// GET /api/v1/topics/subscribe?topic_name=...
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SubscribeParams>,
) -> Result<Json<SubscriptionStatus>, ApiError> {
    let Some(topic) = params.topic_name.filter(|t| !t.is_empty()) else {
        return Err(ApiError {
            error: "missing query parameter 'topic_name'".to_string(),
            code: 400,
        });
    };

    match state.relay.provision_and_subscribe(&topic).await {
        Ok(status) => Ok(Json(status)),
        Err(e) => {
            error!("Subscribe to '{}' failed: {}", topic, error_chain(&e));
            Err(e.into())
        }
    }
}

/// GET /api/v1/sensors
pub async fn sensors(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(state.store.latest_readings().await?))
}
