// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Line Protocol rows, as accepted by QuestDB's `/write` endpoint.
//!
//! ```text
//! table,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See: <https://questdb.io/docs/reference/api/ilp/overview/>

use std::fmt;
use thiserror::Error;

/// Row construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("row for '{0}' has no fields")]
    NoFields(String),

    #[error("tag '{0}' has an empty value")]
    EmptyTag(String),

    #[error("'{0}' contains a line break")]
    LineBreak(String),
}

/// A value stored in a row field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit float, written without suffix.
    Float(f64),
    /// 64-bit signed integer, suffixed with `i`.
    Integer(i64),
    /// UTF-8 string, double-quoted.
    String(String),
    /// Boolean.
    Boolean(bool),
    /// Microseconds since the Unix epoch, suffixed with `t` (QuestDB timestamp column).
    TimestampMicros(i64),
}

impl FieldValue {
    /// Format this value for Line Protocol.
    pub fn to_line_protocol(&self) -> String {
        match self {
            // Debug formatting keeps a decimal point on whole numbers ("55.0").
            FieldValue::Float(v) => format!("{:?}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"")
                    .replace('\n', "\\n");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => v.to_string(),
            FieldValue::TimestampMicros(v) => format!("{}t", v),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// Builder for a single Line Protocol row.
///
/// Tags are written in insertion order, then fields, then the designated
/// timestamp.
#[derive(Debug, Clone)]
pub struct Line {
    table: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
}

impl Line {
    /// Start a row for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Add a tag (QuestDB symbol column).
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Finish the row with its designated timestamp (nanoseconds since epoch).
    pub fn at(self, timestamp_ns: i64) -> Result<String, LineError> {
        if self.fields.is_empty() {
            return Err(LineError::NoFields(self.table));
        }

        reject_line_breaks(&self.table)?;
        let mut line = escape_table(&self.table);

        for (key, value) in &self.tags {
            if value.is_empty() {
                return Err(LineError::EmptyTag(key.clone()));
            }
            reject_line_breaks(key)?;
            reject_line_breaks(value)?;
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            reject_line_breaks(key)?;
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        line.push(' ');
        line.push_str(&timestamp_ns.to_string());
        Ok(line)
    }
}

/// Newline-terminated request body holding one or more rows.
#[derive(Debug, Default)]
pub struct LineBuffer {
    body: String,
    rows: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished row.
    pub fn push(&mut self, row: &str) {
        self.body.push_str(row);
        self.body.push('\n');
        self.rows += 1;
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Take the accumulated body, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        self.rows = 0;
        std::mem::take(&mut self.body)
    }
}

/// Line breaks end a row and cannot be escaped outside string fields.
fn reject_line_breaks(s: &str) -> Result<(), LineError> {
    if s.contains(['\n', '\r']) {
        return Err(LineError::LineBreak(s.escape_debug().to_string()));
    }
    Ok(())
}

/// Table names escape backslashes, commas and spaces.
fn escape_table(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape backslashes, commas, equals
/// signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
