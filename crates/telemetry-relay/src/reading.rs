// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor readings and their wire representation.
//!
//! Devices publish one of two JSON shapes:
//!
//! ```json
//! // Flat
//! {"Serial": "ABCD0001", "Type": "Incubator", "Timestamp": "2024-01-01T00:00:00Z",
//!  "Reading1": 21.5, "Reading2": 55.0, "Reading3": 400.0}
//!
//! // Enveloped
//! {"value": {"type": "JSON", "data": {"Serial": "ABCD0001", ...}}}
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of numeric values carried by one reading.
pub const MAX_READINGS: usize = 3;

/// Type tag carried by enveloped payloads.
pub const ENVELOPE_TYPE_JSON: &str = "JSON";

/// A normalized sensor sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Device identity.
    pub serial: String,
    /// Sensor kind, e.g. "Incubator".
    pub sensor_type: String,
    /// Instant the device took the sample.
    pub timestamp: DateTime<Utc>,
    /// `Reading1..ReadingN`, in order. Never empty, at most [`MAX_READINGS`].
    pub readings: Vec<f64>,
}

impl Reading {
    /// Create a reading.
    pub fn new(
        serial: impl Into<String>,
        sensor_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        readings: Vec<f64>,
    ) -> Self {
        Self {
            serial: serial.into(),
            sensor_type: sensor_type.into(),
            timestamp,
            readings,
        }
    }

    /// Flat wire form of this reading.
    pub fn to_wire(&self) -> WireReading {
        WireReading {
            serial: self.serial.clone(),
            sensor_type: self.sensor_type.clone(),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            reading1: self.readings.first().copied().unwrap_or_default(),
            reading2: self.readings.get(1).copied(),
            reading3: self.readings.get(2).copied(),
        }
    }
}

/// Flat record as published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireReading {
    #[serde(rename = "Serial")]
    pub serial: String,

    #[serde(rename = "Type")]
    pub sensor_type: String,

    /// RFC3339 timestamp.
    #[serde(rename = "Timestamp")]
    pub timestamp: String,

    #[serde(rename = "Reading1")]
    pub reading1: f64,

    #[serde(rename = "Reading2", default, skip_serializing_if = "Option::is_none")]
    pub reading2: Option<f64>,

    #[serde(rename = "Reading3", default, skip_serializing_if = "Option::is_none")]
    pub reading3: Option<f64>,
}

/// Type-tagged wrapper around a [`WireReading`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WireReading,
}

/// Enveloped message as published to the broker (`{"value": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopedMessage {
    pub value: Envelope,
}

impl EnvelopedMessage {
    /// Wrap a reading in a JSON-tagged envelope.
    pub fn new(data: WireReading) -> Self {
        Self {
            value: Envelope {
                kind: ENVELOPE_TYPE_JSON.to_string(),
                data,
            },
        }
    }
}
