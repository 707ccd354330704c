//! Telemetry datagram parser
//!
//! Two wire formats share the ingress port and are told apart by the first
//! non-whitespace byte:
//!
//! - `{` : a JSON object (field aliases accepted, see [`JsonSample`])
//! - anything else: comma-delimited positional fields
//!   `time,track,chassis,lap,lap_distance,speed,accel_x,accel_y[,steering,brake,rpm]`
//!
//! The time field may be empty or absent, in which case the receipt time is
//! stamped. Numbers must be finite.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::tracks::normalize_track;
use crate::types::TelemetrySample;

/// Minimum positional fields in the delimited format.
const CSV_REQUIRED_FIELDS: usize = 8;

/// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty datagram")]
    Empty,

    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    #[error("JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected at least {CSV_REQUIRED_FIELDS} fields, got {0}")]
    TooFewFields(usize),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field `{0}` is not finite")]
    NonFinite(&'static str),

    #[error("unrecognised timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// JSON wire shape. Loggers disagree on names, so common spellings are
/// accepted.
#[derive(Debug, Deserialize)]
struct JsonSample {
    #[serde(default, alias = "time", alias = "ts")]
    timestamp: Option<serde_json::Value>,
    #[serde(default, alias = "track_id", alias = "circuit")]
    track: Option<String>,
    #[serde(default, alias = "vehicle_id", alias = "car", alias = "vehicle")]
    chassis: Option<String>,
    #[serde(default, alias = "lap_number")]
    lap: Option<f64>,
    #[serde(default, alias = "lapdist", alias = "distance")]
    lap_distance: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default, alias = "accx", alias = "accx_can")]
    accel_x: Option<f64>,
    #[serde(default, alias = "accy", alias = "accy_can")]
    accel_y: Option<f64>,
    #[serde(default, alias = "steering", alias = "steering_angle_deg")]
    steering_angle: Option<f64>,
    #[serde(default, alias = "brake", alias = "pbrake_f")]
    brake_pressure: Option<f64>,
    #[serde(default, alias = "nmot")]
    rpm: Option<f64>,
    #[serde(default)]
    slip: Option<f64>,
    #[serde(default)]
    tire_stress: Option<f64>,
}

/// Parse one datagram. `received_at` is stamped when the payload carries
/// no timestamp.
pub fn parse_datagram(
    bytes: &[u8],
    received_at: DateTime<Utc>,
) -> Result<TelemetrySample, ParseError> {
    let first = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .ok_or(ParseError::Empty)?;

    if bytes[first] == b'{' {
        let raw: JsonSample = serde_json::from_slice(&bytes[first..])?;
        from_json(raw, received_at)
    } else {
        let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
        parse_csv(text, received_at)
    }
}

fn from_json(raw: JsonSample, received_at: DateTime<Utc>) -> Result<TelemetrySample, ParseError> {
    let timestamp = match raw.timestamp {
        None | Some(serde_json::Value::Null) => received_at,
        Some(serde_json::Value::Number(n)) => {
            let value = n
                .as_f64()
                .ok_or_else(|| ParseError::InvalidTimestamp(n.to_string()))?;
            from_epoch(value)?
        }
        Some(serde_json::Value::String(s)) => parse_timestamp(&s, received_at)?,
        Some(other) => return Err(ParseError::InvalidTimestamp(other.to_string())),
    };

    let chassis = raw
        .chassis
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(ParseError::MissingField("chassis"))?;

    Ok(TelemetrySample {
        timestamp,
        track: normalize_track(raw.track.as_deref().unwrap_or_default()),
        chassis,
        lap: lap_number(required("lap", raw.lap)?)?,
        lap_distance: required("lap_distance", raw.lap_distance)?,
        speed: required("speed", raw.speed)?,
        accel_x: required("accel_x", raw.accel_x)?,
        accel_y: required("accel_y", raw.accel_y)?,
        steering_angle: optional("steering_angle", raw.steering_angle)?,
        brake_pressure: optional("brake_pressure", raw.brake_pressure)?,
        rpm: optional("rpm", raw.rpm)?,
        slip: optional("slip", raw.slip)?,
        tire_stress: optional("tire_stress", raw.tire_stress)?,
    })
}

fn parse_csv(text: &str, received_at: DateTime<Utc>) -> Result<TelemetrySample, ParseError> {
    let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    if fields.len() < CSV_REQUIRED_FIELDS {
        return Err(ParseError::TooFewFields(fields.len()));
    }

    let chassis = fields[2];
    if chassis.is_empty() {
        return Err(ParseError::MissingField("chassis"));
    }

    let optional_at = |idx: usize, name: &'static str| -> Result<Option<f64>, ParseError> {
        match fields.get(idx) {
            Some(raw) if !raw.is_empty() => number(name, raw).map(Some),
            _ => Ok(None),
        }
    };

    Ok(TelemetrySample {
        timestamp: parse_timestamp(fields[0], received_at)?,
        track: normalize_track(fields[1]),
        chassis: chassis.to_string(),
        lap: lap_number(number("lap", fields[3])?)?,
        lap_distance: number("lap_distance", fields[4])?,
        speed: number("speed", fields[5])?,
        accel_x: number("accel_x", fields[6])?,
        accel_y: number("accel_y", fields[7])?,
        steering_angle: optional_at(8, "steering_angle")?,
        brake_pressure: optional_at(9, "brake_pressure")?,
        rpm: optional_at(10, "rpm")?,
        slip: None,
        tire_stress: None,
    })
}

fn number(field: &'static str, raw: &str) -> Result<f64, ParseError> {
    let value: f64 = raw.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: raw.to_string(),
    })?;
    finite(field, value)
}

fn finite(field: &'static str, value: f64) -> Result<f64, ParseError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::NonFinite(field))
    }
}

fn required(field: &'static str, value: Option<f64>) -> Result<f64, ParseError> {
    finite(field, value.ok_or(ParseError::MissingField(field))?)
}

fn optional(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ParseError> {
    value.map(|v| finite(field, v)).transpose()
}

fn lap_number(value: f64) -> Result<u32, ParseError> {
    if value < 0.0 || value > f64::from(u32::MAX) {
        return Err(ParseError::InvalidNumber {
            field: "lap",
            value: value.to_string(),
        });
    }
    Ok(value as u32)
}

/// Epoch seconds or milliseconds (fractional allowed), or RFC 3339.
fn parse_timestamp(raw: &str, received_at: DateTime<Utc>) -> Result<DateTime<Utc>, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(received_at);
    }
    if let Ok(value) = raw.parse::<f64>() {
        return from_epoch(value);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))
}

fn from_epoch(value: f64) -> Result<DateTime<Utc>, ParseError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ParseError::InvalidTimestamp(value.to_string()));
    }
    let millis = if value > EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .ok_or_else(|| ParseError::InvalidTimestamp(value.to_string()))
}
