use serde::{Deserialize, Deserializer};

use crate::point::{Point, PointError};

/// Measurement name every telemetry point is written under.
pub const MEASUREMENT: &str = "sensor_data";

/// One sensor reading as sent by a device.
///
/// Every field is optional on the wire: absent or `null` values fall back to
/// an empty device id and `0.0` measurements. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub device_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub temperature: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub humidity: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub luminosity: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub pressure: f32,
}

impl TelemetryRecord {
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Build the `sensor_data` point for this reading.
    pub fn to_point(&self, timestamp_ms: i64) -> Result<Point, PointError> {
        Point::builder(MEASUREMENT)
            .string_field("deviceId", self.device_id.as_str())
            .float_field("temperature", widen(self.temperature))
            .float_field("humidity", widen(self.humidity))
            .float_field("luminosity", widen(self.luminosity))
            .float_field("pressure", widen(self.pressure))
            .time_ms(timestamp_ms)
    }
}

/// Widen through the shortest decimal form so `21.3f32` stays `21.3`
/// instead of `21.299999237060547`.
fn widen(value: f32) -> f64 {
    value
        .to_string()
        .parse::<f64>()
        .unwrap_or_else(|_| f64::from(value))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
