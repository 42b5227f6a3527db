//! Time-series points and their InfluxDB line protocol form.
//!
//! ```text
//! measurement field1=val1,field2=val2 timestamp_ms
//! ```

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum PointError {
    #[error("a point needs at least one field")]
    NoFields,
    #[error("field {field} is not a finite number")]
    NonFinite { field: String },
}

/// A value that can be stored in a point field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    String(String),
}

impl FieldValue {
    /// Floats are written in their shortest round-trip form, strings are
    /// double-quoted with `\` and `"` escaped.
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(v) => Some(v),
            FieldValue::Float(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// A named, timestamped set of field values written to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    fields: Vec<(String, FieldValue)>,
    timestamp_ms: i64,
}

impl Point {
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder {
            measurement: measurement.into(),
            fields: Vec::new(),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Render the point as a single line, fields in insertion order.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(&self.measurement);

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_field_key(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        line.push(' ');
        line.push_str(&self.timestamp_ms.to_string());
        line
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line_protocol())
    }
}

pub struct PointBuilder {
    measurement: String,
    fields: Vec<(String, FieldValue)>,
}

impl PointBuilder {
    pub fn float_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), FieldValue::Float(value)));
        self
    }

    pub fn string_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .push((key.into(), FieldValue::String(value.into())));
        self
    }

    /// Line protocol needs at least one field and cannot carry NaN or infinity.
    pub fn time_ms(self, timestamp_ms: i64) -> Result<Point, PointError> {
        if self.fields.is_empty() {
            return Err(PointError::NoFields);
        }
        if let Some((key, _)) = self
            .fields
            .iter()
            .find(|(_, value)| value.as_float().is_some_and(|v| !v.is_finite()))
        {
            return Err(PointError::NonFinite { field: key.clone() });
        }
        Ok(Point {
            measurement: self.measurement,
            fields: self.fields,
            timestamp_ms,
        })
    }
}

/// Spaces and commas must be escaped with a backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_field_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
