// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time-series sink for decoded readings.
//!
//! Each reading becomes one append-only row:
//!
//! ```text
//! sensor_historical_data,serial_number=ABC0001 sensor_type="Incubator",timestamp=1704067200000000t,reading1=21.5,reading2=55.0 1704067200000000000
//! ```

use crate::line_protocol::{FieldValue, Line, LineError};
use crate::reading::Reading;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Tag column holding the device serial.
pub const SERIAL_COLUMN: &str = "serial_number";
/// String column holding the sensor kind.
pub const SENSOR_TYPE_COLUMN: &str = "sensor_type";
/// Timestamp column mirroring the designated timestamp.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Sink write errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid row: {0}")]
    Line(#[from] LineError),

    #[error("timestamp {0} is outside the storable range")]
    TimestampOutOfRange(DateTime<Utc>),

    #[error("store unreachable: {0}")]
    Connect(String),

    #[error("store write timed out after {0:?}")]
    Timeout(Duration),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store rejected write (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for decoded readings. Append only.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Append one reading.
    async fn write(&self, reading: &Reading) -> Result<(), SinkError>;
}

/// Encode a reading as one Line Protocol row for `table`.
pub fn encode_reading(table: &str, reading: &Reading) -> Result<String, SinkError> {
    let timestamp_ns = reading
        .timestamp
        .timestamp_nanos_opt()
        .ok_or(SinkError::TimestampOutOfRange(reading.timestamp))?;

    let mut line = Line::new(table)
        .tag(SERIAL_COLUMN, reading.serial.as_str())
        .field(
            SENSOR_TYPE_COLUMN,
            FieldValue::String(reading.sensor_type.clone()),
        )
        .field(
            TIMESTAMP_COLUMN,
            FieldValue::TimestampMicros(reading.timestamp.timestamp_micros()),
        );

    for (i, value) in reading.readings.iter().enumerate() {
        line = line.field(format!("reading{}", i + 1), FieldValue::Float(*value));
    }

    Ok(line.at(timestamp_ns)?)
}
