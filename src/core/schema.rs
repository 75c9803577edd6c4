//! Typed records shared by every component.
//!
//! Incoming payloads are parsed and validated here exactly once; the rest of
//! the engine only ever sees a well-formed [`SensorReading`] or [`Bounds`].
//! Anything else becomes a [`ValidationError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use validator::Validate;

pub const VIOLATION_MESSAGE: &str = "out of bounds";
pub const RECOVERY_MESSAGE: &str = "back to normal";

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected a JSON object mapping sensor names to bounds")]
    NotAnObject,

    #[error("{0}")]
    Invalid(#[from] validator::ValidationErrors),
}

fn validate_finite(value: f64) -> Result<(), validator::ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("not_finite");
        err.message = Some(format!("{} is not a finite number", value).into());
        Err(err)
    }
}

/// Sensor names become subject tokens, so whitespace, wildcards and empty
/// tokens (`.co2`, `co2.`, `a..b`) are out.
fn validate_sensor_name(name: &str) -> Result<(), validator::ValidationError> {
    if name.chars().any(|c| c.is_whitespace() || c == '*' || c == '>') {
        let mut err = validator::ValidationError::new("invalid_sensor_name");
        err.message = Some(format!("'{}' contains whitespace or wildcards", name).into());
        return Err(err);
    }
    if name.split('.').any(str::is_empty) {
        let mut err = validator::ValidationError::new("invalid_sensor_name");
        err.message = Some(format!("'{}' contains an empty subject token", name).into());
        return Err(err);
    }
    Ok(())
}

/// The JSON body of a reading message. The timestamp comes from the broker.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReadingPayload {
    #[validate(
        length(min = 1, message = "Sensor name must not be empty"),
        custom(function = "validate_sensor_name")
    )]
    pub name: String,
    pub device_id: String,
    pub location: String,
    #[validate(custom(function = "validate_finite"))]
    pub value: f64,
}

/// One physical sample, immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    pub device_id: String,
    pub location: String,
    pub value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl SensorReading {
    /// Parses and validates a reading message body.
    pub fn from_payload(payload: &[u8], timestamp: OffsetDateTime) -> Result<Self, ValidationError> {
        let body: ReadingPayload = serde_json::from_slice(payload)?;
        body.validate()?;
        Ok(Self {
            name: body.name,
            device_id: body.device_id,
            location: body.location,
            value: body.value,
            timestamp,
        })
    }
}

/// Inclusive `[min, max]` range of normal values for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_range"))]
pub struct Bounds {
    #[validate(
        length(min = 1, message = "Sensor name must not be empty"),
        custom(function = "validate_sensor_name")
    )]
    pub sensor: String,
    pub min: f64,
    pub max: f64,
}

fn validate_range(bounds: &Bounds) -> Result<(), validator::ValidationError> {
    validate_finite(bounds.min)?;
    validate_finite(bounds.max)?;
    if bounds.min > bounds.max {
        let mut err = validator::ValidationError::new("inverted_bounds");
        err.message = Some(format!("min {} is greater than max {}", bounds.min, bounds.max).into());
        return Err(err);
    }
    Ok(())
}

impl Bounds {
    /// Builds validated bounds.
    ///
    /// # Errors
    ///
    /// Rejects an empty or wildcard name, non-finite limits and `min > max`.
    pub fn new(sensor: impl Into<String>, min: f64, max: f64) -> Result<Self, ValidationError> {
        let bounds = Self {
            sensor: sensor.into(),
            min,
            max,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Whether `value` is within `[min, max]`, both ends included.
    ///
    /// Inverted bounds contain nothing.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= self.max && value >= self.min && value <= self.max
    }
}

/// The `{min, max}` object of a config message entry.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundsEntry {
    pub min: f64,
    pub max: f64,
}

/// Parses a config message into per-sensor results.
///
/// The outer error covers a body that is not a JSON object at all. Inside,
/// every entry is validated on its own so one bad entry does not spoil the
/// rest.
pub fn parse_config_message(
    payload: &[u8],
) -> Result<Vec<(String, Result<Bounds, ValidationError>)>, ValidationError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    let serde_json::Value::Object(entries) = value else {
        return Err(ValidationError::NotAnObject);
    };

    Ok(entries
        .into_iter()
        .map(|(sensor, raw)| {
            let bounds = serde_json::from_value::<BoundsEntry>(raw)
                .map_err(ValidationError::from)
                .and_then(|entry| Bounds::new(sensor.clone(), entry.min, entry.max));
            (sensor, bounds)
        })
        .collect())
}

/// Published on `<alerts prefix>.<sensor name>` for every hysteresis transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub message: String,
    #[serde(rename = "sensor_data")]
    pub reading: SensorReading,
    #[serde(rename = "sensor_bounds")]
    pub bounds: Bounds,
}

impl AlertEvent {
    pub fn violation(reading: SensorReading, bounds: Bounds) -> Self {
        Self {
            message: VIOLATION_MESSAGE.to_string(),
            reading,
            bounds,
        }
    }

    pub fn recovery(reading: SensorReading, bounds: Bounds) -> Self {
        Self {
            message: RECOVERY_MESSAGE.to_string(),
            reading,
            bounds,
        }
    }

    pub fn is_recovery(&self) -> bool {
        self.message == RECOVERY_MESSAGE
    }
}
