use crate::aws::{S3ObjectStore, SqsQueue};
use crate::domain::{ObjectStore, Queue};
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use std::sync::Arc;
use tracing::info;

/// Settings for building AWS clients
#[derive(Debug, Clone)]
pub struct AwsClientConfig {
    /// Attempts per SDK call, including the first (adaptive retry mode)
    pub max_attempts: u32,
    /// Endpoint override, e.g. a localstack URL
    pub endpoint_url: Option<String>,
}

impl Default for AwsClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            endpoint_url: None,
        }
    }
}

/// Shared AWS configuration from which the queue and object store capabilities are built
pub struct AwsClient {
    sdk_config: SdkConfig,
    force_path_style: bool,
}

impl AwsClient {
    pub async fn load(config: &AwsClientConfig) -> Self {
        info!(
            max_attempts = config.max_attempts,
            endpoint_url = config.endpoint_url.as_deref().unwrap_or("default"),
            "Loading AWS configuration"
        );

        let retry_config = RetryConfig::adaptive().with_max_attempts(config.max_attempts);
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).retry_config(retry_config);
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;

        info!(
            region = sdk_config.region().map(|r| r.as_ref()).unwrap_or("unset"),
            "AWS configuration loaded"
        );

        Self {
            sdk_config,
            // Custom endpoints (localstack, minio) rarely support virtual-hosted buckets
            force_path_style: config.endpoint_url.is_some(),
        }
    }

    /// Create a Queue trait object backed by SQS
    pub fn create_queue_client(&self) -> Arc<dyn Queue> {
        Arc::new(SqsQueue::new(aws_sdk_sqs::Client::new(&self.sdk_config)))
    }

    /// Create an ObjectStore trait object backed by S3
    pub fn create_object_store_client(&self) -> Arc<dyn ObjectStore> {
        Arc::new(S3ObjectStore::new(
            self.sdk_config.clone(),
            self.force_path_style,
        ))
    }
}
