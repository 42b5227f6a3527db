use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use sensor_telemetry_relay::events;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    sensor_telemetry_relay::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let writer = sensor_telemetry_relay::load_writer_from_env().await?;

    run(service_fn(|request: LambdaEvent<events::Combined>| {
        sensor_telemetry_relay::handler(writer.clone(), request)
    }))
    .await
}
