use crate::domain::{Downloader, EnvelopeVerifier, NotificationDecoder, ProcessError};
use common::domain::QueueMessage;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Domain service turning one queue message into local artifacts
///
/// Flow:
/// 1. Decode the envelope and the embedded storage event
/// 2. Run the envelope through the verification hook
/// 3. Download every record, in record order
///
/// The first failing download aborts the rest of the message. Up to
/// `download_concurrency` downloads of the same message run at once; the
/// call returns only after all of them have finished.
pub struct NotificationService {
    decoder: NotificationDecoder,
    verifier: Arc<dyn EnvelopeVerifier>,
    downloader: Downloader,
    download_concurrency: usize,
}

impl NotificationService {
    pub fn new(
        decoder: NotificationDecoder,
        verifier: Arc<dyn EnvelopeVerifier>,
        downloader: Downloader,
        download_concurrency: usize,
    ) -> Self {
        Self {
            decoder,
            verifier,
            downloader,
            download_concurrency: download_concurrency.max(1),
        }
    }

    #[instrument(skip(self, message), fields(message_id = %message.message_id, receive_count = message.receive_count))]
    pub async fn process_message(&self, message: &QueueMessage) -> Result<Vec<PathBuf>, ProcessError> {
        let decoded = self.decoder.decode(&message.body)?;
        self.verifier.verify(&decoded.envelope)?;

        debug!(
            task_count = decoded.tasks.len(),
            topic = decoded.envelope.topic_arn.as_deref().unwrap_or("unknown"),
            "decoded notification"
        );

        let paths = stream::iter(decoded.tasks)
            .map(|task| async move { self.downloader.download(&task).await })
            .buffered(self.download_concurrency)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(paths)
    }
}
