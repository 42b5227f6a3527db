use aws_config::BehaviorVersion;
use lambda_runtime::{Error, LambdaEvent};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::influx::{DynPointWriter, InfluxWriter};

pub mod config;
pub mod events;
pub mod influx;
pub mod point;
pub mod process;
pub mod telemetry;

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

pub fn set_up_influx_writer(config: &Config) -> Result<DynPointWriter, Error> {
    let writer = InfluxWriter::new(config)?;
    info!(
        endpoint = %config.endpoint,
        database = writer.database(),
        "InfluxDB writer initialised"
    );
    Ok(Arc::new(writer))
}

/// Build the sink from the environment.
///
/// Incomplete configuration is not an error here: it is logged as fatal and
/// `None` is returned so every invocation is skipped instead of crashing the
/// function. A password secret that cannot be resolved is an error, so the
/// runtime fails the init and retries it.
pub async fn load_writer_from_env() -> Result<Option<DynPointWriter>, Error> {
    let mut config = match Config::load_from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "FATAL: relay is not configured, invocations will be skipped");
            return Ok(None);
        }
    };
    debug!(?config, "configuration loaded");

    // if the password provided is an ARN, get the password from Secrets Manager
    if config.password_is_secret_arn() {
        let aws_config = aws_config::load_defaults(BehaviorVersion::v2023_11_09()).await;
        let secret_id = config.password.clone();
        config.password = config::get_password_from_secrets_manager(&aws_config, secret_id)
            .await
            .map_err(|e| {
                error!(error = %e, "unable to resolve the InfluxDB password");
                e.to_string()
            })?;
    }

    set_up_influx_writer(&config).map(Some)
}

// lambda handler
pub async fn handler(
    writer: Option<DynPointWriter>,
    evt: LambdaEvent<events::Combined>,
) -> Result<(), Error> {
    let messages = evt.payload.into_messages();
    info!("Received {} message(s)", messages.len());

    let Some(writer) = writer else {
        error!(
            "FATAL: relay is not configured, skipping batch of {} message(s)",
            messages.len()
        );
        return Ok(());
    };

    process::process_batch(writer.as_ref(), messages).await;

    Ok(())
}
