use anyhow::Result;
use jobgate_core::{config::Config, server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let prometheus = telemetry::init(&config.telemetry)?;

    info!("Starting Jobgate Core");
    info!("HTTP server listening on {}", config.http_addr());
    info!(
        topic = %config.broker.job_topic(),
        bucket = %config.blob_store.bucket,
        "Dispatching jobs"
    );

    server::run(config, prometheus).await
}
