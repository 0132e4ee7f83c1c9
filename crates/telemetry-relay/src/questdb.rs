// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QuestDB writer over the HTTP Line Protocol endpoint.
//!
//! One pooled HTTP client is shared by every write; each reading is sent as
//! its own request to `/write?precision=n`. The `/exec` endpoint serves the
//! latest reading per device.

use crate::config::StoreConfig;
use crate::line_protocol::LineBuffer;
use crate::reading::Reading;
use crate::sink::{encode_reading, ReadingSink, SinkError, SERIAL_COLUMN, TIMESTAMP_COLUMN};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// HTTP client for one QuestDB table.
#[derive(Debug, Clone)]
pub struct QuestDbClient {
    http: reqwest::Client,
    base_url: String,
    table: String,
    timeout: Duration,
}

impl QuestDbClient {
    pub fn new(config: &StoreConfig) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SinkError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            table: config.table.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn write_url(&self) -> String {
        format!("{}/write?precision=n", self.base_url)
    }

    /// Query text for the newest row of every device.
    pub fn latest_query(&self) -> String {
        format!(
            "SELECT * FROM {} LATEST ON {} PARTITION BY {}",
            self.table, TIMESTAMP_COLUMN, SERIAL_COLUMN
        )
    }

    /// Send an already-encoded Line Protocol body.
    async fn post_lines(&self, body: String) -> Result<(), SinkError> {
        let response = self
            .http
            .post(self.write_url())
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Newest row of every device, as returned by QuestDB's `/exec` endpoint.
    pub async fn latest_readings(&self) -> Result<serde_json::Value, SinkError> {
        let response = self
            .http
            .get(format!("{}/exec", self.base_url))
            .query(&[("query", self.latest_query())])
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))
    }

    fn map_request_error(&self, e: reqwest::Error) -> SinkError {
        if e.is_timeout() {
            SinkError::Timeout(self.timeout)
        } else if e.is_connect() {
            SinkError::Connect(e.to_string())
        } else {
            SinkError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl ReadingSink for QuestDbClient {
    async fn write(&self, reading: &Reading) -> Result<(), SinkError> {
        let mut buffer = LineBuffer::new();
        buffer.push(&encode_reading(&self.table, reading)?);
        self.post_lines(buffer.take()).await?;
        debug!("Wrote reading from {} to {}", reading.serial, self.table);
        Ok(())
    }
}
