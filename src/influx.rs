use async_trait::async_trait;
use http::header::USER_AGENT;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::point::Point;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("influxdb request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("influxdb rejected the point with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Anything that can persist a single point.
#[async_trait]
pub trait PointWriter {
    async fn write(&self, point: &Point) -> Result<(), WriteError>;
}

pub type DynPointWriter = Arc<dyn PointWriter + Send + Sync>;

/// Writes points to the InfluxDB 1.x `/write` endpoint, one request per point.
#[derive(Clone)]
pub struct InfluxWriter {
    client: reqwest::Client,
    write_url: String,
    database: String,
    username: String,
    password: String,
}

impl InfluxWriter {
    pub fn new(config: &Config) -> Result<Self, WriteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(InfluxWriter {
            client,
            write_url: format!("{}/write", config.endpoint.trim_end_matches('/')),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl PointWriter for InfluxWriter {
    async fn write(&self, point: &Point) -> Result<(), WriteError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str()), ("precision", "ms")])
            .basic_auth(&self.username, Some(&self.password))
            .header(
                USER_AGENT,
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            )
            .body(point.to_line_protocol())
            .send()
            .await?;

        let status = response.status();
        debug!(
            %status,
            elapsed_ms = start.elapsed().as_millis(),
            uri = %self.write_url,
            "influxdb write completed"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WriteError::Rejected { status, body });
        }

        Ok(())
    }
}
