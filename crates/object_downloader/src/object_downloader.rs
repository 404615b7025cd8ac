use crate::domain::{
    Downloader, EnvelopeVerifier, FatalError, NotificationDecoder, NotificationService,
};
use crate::queue::create_notification_processor;
use common::{
    BatchReport, CapabilityResult, ObjectStore, Queue, QueueConsumer, QueueConsumerConfig,
    QueueHandle, SQS_MAX_BATCH, SQS_MAX_WAIT_SECS,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ObjectDownloaderConfig {
    pub queue_name: String,
    pub dead_letter_queue: Option<String>,
    pub download_root: PathBuf,
    pub batch_size: usize,
    pub receive_wait: Duration,
    pub error_backoff: Duration,
    pub keep_messages: bool,
    pub download_concurrency: usize,
    pub decode_object_keys: bool,
}

impl Default for ObjectDownloaderConfig {
    fn default() -> Self {
        Self {
            queue_name: String::new(),
            dead_letter_queue: None,
            download_root: PathBuf::from("objects"),
            batch_size: SQS_MAX_BATCH,
            receive_wait: Duration::from_secs(2),
            error_backoff: Duration::from_secs(1),
            keep_messages: false,
            download_concurrency: 1,
            decode_object_keys: true,
        }
    }
}

impl ObjectDownloaderConfig {
    pub fn validate(&self) -> Result<(), FatalError> {
        if self.queue_name.trim().is_empty() {
            return Err(FatalError::InvalidConfig("queue name is empty".to_string()));
        }
        if !(1..=SQS_MAX_BATCH).contains(&self.batch_size) {
            return Err(FatalError::InvalidConfig(format!(
                "batch size must be between 1 and {}, got {}",
                SQS_MAX_BATCH, self.batch_size
            )));
        }
        if self.receive_wait.as_secs() > SQS_MAX_WAIT_SECS {
            return Err(FatalError::InvalidConfig(format!(
                "receive wait must be at most {}s, got {}s",
                SQS_MAX_WAIT_SECS,
                self.receive_wait.as_secs()
            )));
        }
        if self.download_concurrency == 0 {
            return Err(FatalError::InvalidConfig(
                "download concurrency must be at least 1".to_string(),
            ));
        }
        if self.dead_letter_queue.as_deref() == Some(self.queue_name.as_str()) {
            return Err(FatalError::InvalidConfig(
                "dead-letter queue must differ from the source queue".to_string(),
            ));
        }
        Ok(())
    }
}

/// Drains a notification queue into the download root
pub struct ObjectDownloader {
    consumer: QueueConsumer,
}

impl ObjectDownloader {
    /// Resolve the queues and wire the pipeline
    ///
    /// Any failure here is fatal: the process must not start consuming.
    pub async fn new(
        queue: Arc<dyn Queue>,
        object_store: Arc<dyn ObjectStore>,
        verifier: Arc<dyn EnvelopeVerifier>,
        config: ObjectDownloaderConfig,
    ) -> Result<Self, FatalError> {
        config.validate()?;
        info!(queue = %config.queue_name, "Initializing object downloader");

        flag_unauthenticated(verifier.as_ref());

        let handle = resolve_queue(queue.as_ref(), &config.queue_name).await?;
        info!(url = %handle.url, "Using queue");

        let dead_letter = match &config.dead_letter_queue {
            Some(name) => {
                let handle = resolve_queue(queue.as_ref(), name).await?;
                info!(url = %handle.url, "Using dead-letter queue");
                Some(handle)
            }
            None => None,
        };

        let downloader = Downloader::new(object_store, config.download_root.clone());
        let service = Arc::new(NotificationService::new(
            NotificationDecoder::new(config.decode_object_keys),
            verifier,
            downloader,
            config.download_concurrency,
        ));

        let consumer = QueueConsumer::new(
            queue,
            handle,
            dead_letter,
            QueueConsumerConfig {
                batch_size: config.batch_size,
                receive_wait: config.receive_wait,
                error_backoff: config.error_backoff,
                keep_messages: config.keep_messages,
            },
            create_notification_processor(service),
        );

        info!(
            download_root = %config.download_root.display(),
            keep_messages = config.keep_messages,
            "Object downloader initialized"
        );

        Ok(Self { consumer })
    }

    pub fn queue(&self) -> &QueueHandle {
        self.consumer.handle()
    }

    /// Receive and process one batch
    pub async fn poll_once(&self) -> CapabilityResult<BatchReport> {
        self.consumer.poll_once().await
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        self.consumer.run(ctx).await
    }
}

/// Report a verifier that does not establish provenance, returning whether it was flagged
///
/// Logged at error level so it shows under the default filter.
fn flag_unauthenticated(verifier: &dyn EnvelopeVerifier) -> bool {
    if verifier.authenticates() {
        return false;
    }
    error!(
        "notification envelopes are NOT authenticated; any publisher able to reach the queue can trigger downloads"
    );
    true
}

async fn resolve_queue(queue: &dyn Queue, name: &str) -> Result<QueueHandle, FatalError> {
    queue
        .resolve(name)
        .await
        .map_err(|source| FatalError::QueueResolution {
            queue: name.to_string(),
            source,
        })
}
