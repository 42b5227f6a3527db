use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::influx::{PointWriter, WriteError};
use crate::point::{Point, PointError};
use crate::telemetry::TelemetryRecord;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to build point: {0}")]
    InvalidPoint(#[from] PointError),
    #[error("failed to write point: {0}")]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Decode,
    Write,
}

impl RelayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RelayError::Decode(_) | RelayError::InvalidPoint(_) => FailureKind::Decode,
            RelayError::Write(_) => FailureKind::Write,
        }
    }
}

/// What happened to one message of a batch.
#[derive(Debug)]
pub struct MessageOutcome {
    pub index: usize,
    pub result: Result<Point, RelayError>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub messages: Vec<MessageOutcome>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn written(&self) -> usize {
        self.messages.iter().filter(|m| m.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.written()
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &RelayError)> {
        self.messages
            .iter()
            .filter_map(|m| m.result.as_ref().err().map(|e| (m.index, e)))
    }
}

/// Decode, stamp and write every message of the batch in order.
///
/// Never fails as a whole: each message's error is logged and recorded in the
/// returned outcome, then processing moves on to the next message.
pub async fn process_batch<I, M>(writer: &(dyn PointWriter + Send + Sync), messages: I) -> BatchOutcome
where
    I: IntoIterator<Item = M>,
    M: AsRef<[u8]>,
{
    let start = Instant::now();
    let mut outcome = BatchOutcome::default();

    for (index, message) in messages.into_iter().enumerate() {
        let result = process_message(writer, message.as_ref()).await;
        match &result {
            Ok(point) => info!("Data written to InfluxDB: {}", point),
            Err(error) => error!(index, kind = ?error.kind(), "Failed to process message: {}", error),
        }
        outcome.messages.push(MessageOutcome { index, result });
    }

    info!(
        total = outcome.len(),
        written = outcome.written(),
        failed = outcome.failed(),
        elapsed_ms = start.elapsed().as_millis(),
        "batch processed"
    );
    outcome
}

async fn process_message(
    writer: &(dyn PointWriter + Send + Sync),
    message: &[u8],
) -> Result<Point, RelayError> {
    let record = TelemetryRecord::decode(message)?;
    debug!(
        device_id = %record.device_id,
        temperature = record.temperature,
        humidity = record.humidity,
        luminosity = record.luminosity,
        pressure = record.pressure,
        "Creating point"
    );

    let point = record.to_point(chrono::Utc::now().timestamp_millis())?;
    writer.write(&point).await?;
    Ok(point)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::point::FieldValue;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeWriter {
        points: Mutex<Vec<Point>>,
        reject_device: Option<&'static str>,
    }

    impl FakeWriter {
        fn rejecting(device: &'static str) -> Self {
            FakeWriter {
                reject_device: Some(device),
                ..Default::default()
            }
        }

        fn take_points(&self) -> Vec<Point> {
            std::mem::take(&mut self.points.lock().unwrap())
        }
    }

    #[async_trait]
    impl PointWriter for FakeWriter {
        async fn write(&self, point: &Point) -> Result<(), WriteError> {
            let device = point.field("deviceId").and_then(FieldValue::as_str);
            if device.is_some() && device == self.reject_device {
                return Err(WriteError::Rejected {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "boom".to_string(),
                });
            }
            self.points.lock().unwrap().push(point.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let writer = FakeWriter::default();
        let before = chrono::Utc::now().timestamp_millis();
        let outcome = process_batch(
            &writer,
            [r#"{"deviceId":"d1","temperature":21.5}"#, "not-json"],
        )
        .await;
        let after = chrono::Utc::now().timestamp_millis();

        assert_eq!(outcome.len(), 2);
        assert_eq!(outcome.written(), 1);
        assert_eq!(outcome.failed(), 1);

        let failures: Vec<_> = outcome.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert_eq!(failures[0].1.kind(), FailureKind::Decode);

        let points = writer.take_points();
        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.measurement(), "sensor_data");
        assert_eq!(point.field("deviceId").and_then(FieldValue::as_str), Some("d1"));
        assert_eq!(point.field("temperature").and_then(FieldValue::as_float), Some(21.5));
        for field in ["humidity", "luminosity", "pressure"] {
            assert_eq!(point.field(field).and_then(FieldValue::as_float), Some(0.0));
        }
        assert!(point.timestamp_ms() >= before && point.timestamp_ms() <= after);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_batch() {
        let writer = FakeWriter::rejecting("bad");
        let outcome = process_batch(
            &writer,
            vec![
                r#"{"deviceId":"a","humidity":55}"#.to_string(),
                r#"{"deviceId":"bad"}"#.to_string(),
                r#"{"deviceId":"c","pressure":990.5}"#.to_string(),
            ],
        )
        .await;

        assert_eq!(outcome.written(), 2);
        let failures: Vec<_> = outcome.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert_eq!(failures[0].1.kind(), FailureKind::Write);

        let devices: Vec<_> = writer
            .take_points()
            .iter()
            .map(|p| p.field("deviceId").and_then(FieldValue::as_str).unwrap().to_string())
            .collect();
        assert_eq!(devices, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_redelivery_writes_duplicates() {
        let writer = FakeWriter::default();
        let batch = [r#"{"deviceId":"d1","luminosity":12}"#];
        process_batch(&writer, batch).await;
        process_batch(&writer, batch).await;
        assert_eq!(writer.take_points().len(), 2);
    }

    #[tokio::test]
    async fn test_non_finite_value_is_a_decode_failure() {
        let writer = FakeWriter::default();
        let outcome = process_batch(&writer, [r#"{"deviceId":"d1","temperature":1e40}"#]).await;
        assert_eq!(outcome.written(), 0);
        let (_, error) = outcome.failures().next().unwrap();
        assert!(matches!(error, RelayError::InvalidPoint(_)));
        assert_eq!(error.kind(), FailureKind::Decode);
        assert!(writer.take_points().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let writer = FakeWriter::default();
        let outcome = process_batch(&writer, Vec::<Vec<u8>>::new()).await;
        assert!(outcome.is_empty());
        assert_eq!(outcome.failed(), 0);
    }
}
