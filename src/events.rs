use aws_lambda_events::event::kafka::KafkaEvent;
use aws_lambda_events::event::kinesis::KinesisEvent;
use aws_lambda_events::event::sqs::SqsEvent;
use base64::prelude::*;
use flate2::read::MultiGzDecoder;
use serde::de::{self, Deserialize, Deserializer};
use serde_json::Value;
use std::io::Read;
use tracing::debug;

/// Every trigger shape the relay accepts.
#[derive(Debug)]
pub enum Combined {
    /// A plain JSON array of message strings.
    Batch(Vec<String>),
    Kinesis(KinesisEvent),
    Sqs(SqsEvent),
    Kafka(KafkaEvent),
}

impl<'de> Deserialize<'de> for Combined {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw_value: Value = Deserialize::deserialize(deserializer)?;
        debug!("raw_value: {:?}", raw_value);

        if let Ok(messages) = Vec::<String>::deserialize(&raw_value) {
            tracing::info!("raw message batch detected");
            return Ok(Combined::Batch(messages));
        }

        // kinesis must be tried before sqs, every sqs record field is optional
        if let Ok(event) = KinesisEvent::deserialize(&raw_value) {
            tracing::info!("kinesis event detected");
            return Ok(Combined::Kinesis(event));
        }

        if let Ok(event) = SqsEvent::deserialize(&raw_value) {
            tracing::info!("sqs event detected");
            return Ok(Combined::Sqs(event));
        }

        // IMPORTANT: kafka must be evaluated last as it uses an arbitrary map to evaluate records.
        // Since all other fields are optional, this map could potentially match any arbitrary JSON
        // and result in empty values.
        if let Ok(event) = KafkaEvent::deserialize(&raw_value) {
            if event.records.is_empty() {
                return Err(de::Error::custom(format!(
                    "unsupported or bad event type: {raw_value}"
                )));
            }
            tracing::info!("kafka event detected");
            return Ok(Combined::Kafka(event));
        }

        Err(de::Error::custom(format!(
            "unsupported event type: {raw_value}"
        )))
    }
}

impl Combined {
    /// Flatten the event into its message payloads, in delivery order.
    pub fn into_messages(self) -> Vec<Vec<u8>> {
        match self {
            Combined::Batch(messages) => messages.into_iter().map(String::into_bytes).collect(),
            Combined::Kinesis(event) => event
                .records
                .into_iter()
                .map(|record| maybe_gunzip(record.kinesis.data.0))
                .collect(),
            Combined::Sqs(event) => event
                .records
                .into_iter()
                .map(|record| record.body.unwrap_or_default().into_bytes())
                .collect(),
            Combined::Kafka(event) => {
                let mut partitions: Vec<_> = event.records.into_iter().collect();
                partitions.sort_by(|(a, _), (b, _)| a.cmp(b));
                partitions
                    .into_iter()
                    .flat_map(|(topic_partition, records)| {
                        debug!("Kafka records for {topic_partition}: {}", records.len());
                        records
                    })
                    .map(|record| {
                        let value = record.value.unwrap_or_default();
                        // check if value is base64 encoded
                        BASE64_STANDARD
                            .decode(&value)
                            .unwrap_or_else(|_| value.into_bytes())
                    })
                    .collect()
            }
        }
    }
}

fn maybe_gunzip(data: Vec<u8>) -> Vec<u8> {
    let mut decompressed = Vec::new();
    match MultiGzDecoder::new(data.as_slice()).read_to_end(&mut decompressed) {
        Ok(_) => decompressed,
        Err(_) => {
            debug!("Data does not appear to be valid gzip format. Treating as UTF-8");
            data
        }
    }
}
