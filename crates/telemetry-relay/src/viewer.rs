// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebSocket viewer sessions.
//!
//! The send half of each socket is handed to the hub; the receive half stays
//! here and is drained until the client goes away.

use crate::AppState;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use telemetry_relay::{ViewerConnection, ViewerError};
use tracing::{debug, info, warn};

/// Outbound half of a viewer's socket.
pub struct WsViewer {
    sink: SplitSink<WebSocket, Message>,
}

impl WsViewer {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ViewerConnection for WsViewer {
    async fn send(&mut self, payload: Bytes) -> Result<(), ViewerError> {
        self.sink
            .send(frame_for(payload))
            .await
            .map_err(|e| ViewerError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

/// Text frame for UTF-8 payloads, binary otherwise.
fn frame_for(payload: Bytes) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

/// Run one viewer connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (ws_tx, mut ws_rx) = socket.split();

    let Some(id) = state
        .relay
        .register_viewer(Box::new(WsViewer::new(ws_tx)))
        .await
    else {
        return;
    };

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                info!("[{}] Received: {}", id, text);
            }
            Ok(Message::Binary(data)) => {
                debug!("[{}] Received {} binary bytes", id, data.len());
            }
            Ok(Message::Close(_)) => {
                info!("[{}] Viewer closed connection", id);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!("[{}] WebSocket error: {}", id, e);
                break;
            }
        }
    }

    state.relay.remove_viewer(id).await;
}
