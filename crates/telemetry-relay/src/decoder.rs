// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload decoding.
//!
//! A payload is first tried as an envelope (an object holding a nested `data`
//! object, either at the root or under `value`), then as a flat record. Both
//! shapes normalize to the same [`Reading`].

use crate::reading::{Reading, ENVELOPE_TYPE_JSON, MAX_READINGS};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

const FIELD_SERIAL: &str = "Serial";
const FIELD_TYPE: &str = "Type";
const FIELD_TIMESTAMP: &str = "Timestamp";
const READING_FIELDS: [&str; MAX_READINGS] = ["Reading1", "Reading2", "Reading3"];

/// Decoding errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("unsupported envelope type '{0}'")]
    UnsupportedEnvelope(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' must be a {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("invalid RFC3339 timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("'{present}' is set but '{missing}' is not")]
    ReadingGap {
        present: &'static str,
        missing: &'static str,
    },
}

/// Wire shape a payload was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Enveloped,
    Flat,
}

/// Decode a raw broker payload into a [`Reading`].
pub fn decode(payload: &[u8]) -> Result<Reading, DecodeError> {
    decode_with_shape(payload).map(|(reading, _)| reading)
}

/// Decode a raw broker payload, also reporting which wire shape matched.
pub fn decode_with_shape(payload: &[u8]) -> Result<(Reading, PayloadShape), DecodeError> {
    let root: Value = serde_json::from_slice(payload)?;
    if !root.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    if let Some(result) = try_decode_envelope(&root) {
        return result.map(|reading| (reading, PayloadShape::Enveloped));
    }

    try_decode_flat(&root).map(|reading| (reading, PayloadShape::Flat))
}

/// Returns `None` when `root` does not look like an envelope at all.
fn try_decode_envelope(root: &Value) -> Option<Result<Reading, DecodeError>> {
    let wrapper = match root.get("value") {
        Some(value @ Value::Object(_)) => value,
        _ => root,
    };
    let data = wrapper.get("data").filter(|data| data.is_object())?;

    Some(check_envelope_type(wrapper).and_then(|()| try_decode_flat(data)))
}

fn check_envelope_type(wrapper: &Value) -> Result<(), DecodeError> {
    match wrapper.get("type") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(kind)) if kind.eq_ignore_ascii_case(ENVELOPE_TYPE_JSON) => Ok(()),
        Some(other) => Err(DecodeError::UnsupportedEnvelope(match other {
            Value::String(s) => s.clone(),
            v => v.to_string(),
        })),
    }
}

fn try_decode_flat(record: &Value) -> Result<Reading, DecodeError> {
    let fields = record.as_object().ok_or(DecodeError::NotAnObject)?;

    let serial = required_str(fields, FIELD_SERIAL)?;
    let sensor_type = required_str(fields, FIELD_TYPE)?;
    let raw_timestamp = required_str(fields, FIELD_TIMESTAMP)?;

    let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
        .map_err(|source| DecodeError::InvalidTimestamp {
            value: raw_timestamp.to_string(),
            source,
        })?
        .with_timezone(&Utc);

    Ok(Reading {
        serial: serial.to_string(),
        sensor_type: sensor_type.to_string(),
        timestamp,
        readings: collect_readings(fields)?,
    })
}

fn required_str<'a>(
    fields: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, DecodeError> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(DecodeError::EmptyField(name)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(DecodeError::InvalidField {
            field: name,
            expected: "string",
        }),
    }
}

/// `Reading1` is required; later values are optional but must be contiguous.
fn collect_readings(fields: &Map<String, Value>) -> Result<Vec<f64>, DecodeError> {
    let mut readings = Vec::with_capacity(MAX_READINGS);

    for (index, &name) in READING_FIELDS.iter().enumerate() {
        let value = match fields.get(name) {
            None | Some(Value::Null) => continue,
            Some(value) => value.as_f64().ok_or(DecodeError::InvalidField {
                field: name,
                expected: "number",
            })?,
        };

        if readings.len() != index {
            return Err(DecodeError::ReadingGap {
                present: name,
                missing: READING_FIELDS[readings.len()],
            });
        }
        readings.push(value);
    }

    if readings.is_empty() {
        return Err(DecodeError::MissingField(READING_FIELDS[0]));
    }
    Ok(readings)
}
