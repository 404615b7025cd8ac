mod cli;
mod config;

use clap::Parser;
use cli::Cli;
use common::aws::{AwsClient, AwsClientConfig};
use common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use config::ServiceConfig;
use drain_runner::Runner;
use object_downloader::{
    EnvelopeVerifier, NoopVerifier, ObjectDownloader, TopicAllowlistVerifier,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let log_format = match config.log_format.parse::<LogFormat>() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        service_name: "s3-drain".to_string(),
        log_level: if cli.verbose {
            "info".to_string()
        } else {
            config.log_level.clone()
        },
        log_format,
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(queue = %cli.queue_name, keep = cli.keep, "Starting s3-drain");
    debug!("Configuration: {:?}", config);

    let aws = AwsClient::load(&AwsClientConfig {
        max_attempts: config.aws_max_attempts,
        endpoint_url: config.aws_endpoint_url.clone(),
    })
    .await;

    let allowed_topics = config.allowed_topics();
    let verifier: Arc<dyn EnvelopeVerifier> = if allowed_topics.is_empty() {
        Arc::new(NoopVerifier)
    } else {
        Arc::new(TopicAllowlistVerifier::new(allowed_topics))
    };

    let downloader = match ObjectDownloader::new(
        aws.create_queue_client(),
        aws.create_object_store_client(),
        verifier,
        config.downloader_config(&cli.queue_name, cli.keep),
    )
    .await
    {
        Ok(downloader) => downloader,
        Err(e) => {
            error!(error = %e, "Failed to start");
            std::process::exit(1);
        }
    };

    let outcome = Runner::new()
        .with_app_process(move |ctx| downloader.run(ctx))
        .with_closer(|| async move {
            info!("Stopped consuming");
            Ok(())
        })
        .with_shutdown_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;

    std::process::exit(outcome.exit_code());
}
