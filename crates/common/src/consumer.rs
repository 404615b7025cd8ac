use crate::domain::{CapabilityResult, Queue, QueueHandle, QueueMessage};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of processing a batch of messages
/// Provides fine-grained control over which messages to acknowledge, retry or dead-letter
#[derive(Debug, Default)]
pub struct ProcessingResult {
    /// Messages that were processed successfully and should be deleted
    pub ack: Vec<usize>,
    /// Messages that failed and should be left on the queue for redelivery
    pub nak: Vec<(usize, Option<String>)>,
    /// Messages that can never succeed; forwarded to the dead-letter queue when one is configured
    pub dead_letter: Vec<(usize, Option<String>)>,
}

impl ProcessingResult {
    /// Create a result where all messages should be left for redelivery
    pub fn nak_all(count: usize, error: Option<String>) -> Self {
        Self {
            nak: (0..count).map(|i| (i, error.clone())).collect(),
            ..Default::default()
        }
    }
}

/// Type alias for the batch processor function
/// Takes a slice of received messages and returns a ProcessingResult
/// The processor is responsible for decoding and processing the messages
pub type BatchProcessor =
    Box<dyn Fn(&[QueueMessage]) -> BoxFuture<'static, anyhow::Result<ProcessingResult>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct QueueConsumerConfig {
    pub batch_size: usize,
    pub receive_wait: Duration,
    pub error_backoff: Duration,
    /// Never delete messages (neither acknowledged nor dead-lettered ones)
    pub keep_messages: bool,
}

impl Default for QueueConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            receive_wait: Duration::from_secs(2),
            error_backoff: Duration::from_secs(1),
            keep_messages: false,
        }
    }
}

/// What happened to one received batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub acknowledged: usize,
    pub dead_lettered: usize,
    pub kept: usize,
    /// Messages left on the queue, with the reason
    pub left_for_redelivery: Vec<(String, String)>,
}

/// Queue consumer that long-polls batches and acknowledges per message
/// The consumer handles receiving, deletion, dead-lettering and error handling
/// Message decoding and business logic are delegated to the processor function
pub struct QueueConsumer {
    queue: Arc<dyn Queue>,
    handle: QueueHandle,
    dead_letter: Option<QueueHandle>,
    config: QueueConsumerConfig,
    processor: BatchProcessor,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn Queue>,
        handle: QueueHandle,
        dead_letter: Option<QueueHandle>,
        config: QueueConsumerConfig,
        processor: BatchProcessor,
    ) -> Self {
        Self {
            queue,
            handle,
            dead_letter,
            config,
            processor,
        }
    }

    pub fn handle(&self) -> &QueueHandle {
        &self.handle
    }

    /// Poll until the token is cancelled
    ///
    /// Cancellation interrupts the long-poll only; a batch that has been
    /// received is always processed and acknowledged before the token is
    /// checked again.
    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(queue = %self.handle.name, url = %self.handle.url, "Starting consumer loop");

        loop {
            info!(queue = %self.handle.name, "Checking for messages");

            let received = tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                result = self.receive_batch() => result,
            };

            match received {
                Ok(messages) => {
                    let report = self.process_batch(messages).await;
                    if report.received > 0 {
                        debug!(
                            received = report.received,
                            acknowledged = report.acknowledged,
                            dead_lettered = report.dead_lettered,
                            kept = report.kept,
                            left = report.left_for_redelivery.len(),
                            "Batch complete"
                        );
                    }
                }
                Err(e) => {
                    error!(error = %e, transient = e.is_transient(), "Error receiving messages");
                    // Continue polling despite errors
                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }

            if ctx.is_cancelled() {
                info!("Received shutdown signal, stopping consumer");
                break;
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    /// Receive and fully process a single batch
    pub async fn poll_once(&self) -> CapabilityResult<BatchReport> {
        let messages = self.receive_batch().await?;
        Ok(self.process_batch(messages).await)
    }

    async fn receive_batch(&self) -> CapabilityResult<Vec<QueueMessage>> {
        debug!(
            batch_size = self.config.batch_size,
            wait_secs = self.config.receive_wait.as_secs(),
            "Fetching message batch"
        );

        self.queue
            .receive(&self.handle, self.config.batch_size, self.config.receive_wait)
            .await
    }

    async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let mut report = BatchReport {
            received: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() {
            debug!("No messages in batch");
            return report;
        }

        debug!(message_count = messages.len(), "Received message batch");

        let processing_result = match (self.processor)(messages.as_slice()).await {
            Ok(result) => result,
            Err(e) => {
                // If the processor returns an error, leave every message for redelivery
                error!(error = %e, "Processor returned error, leaving all messages");
                ProcessingResult::nak_all(messages.len(), Some(e.to_string()))
            }
        };

        for idx in processing_result.ack {
            let Some(message) = messages.get(idx) else {
                warn!(message_index = idx, batch_size = messages.len(), "Invalid ack index in ProcessingResult");
                continue;
            };

            if self.config.keep_messages {
                info!(message_id = %message.message_id, "Keeping processed message");
                report.kept += 1;
                continue;
            }

            match self.queue.delete(&self.handle, message).await {
                Ok(()) => {
                    info!(message_id = %message.message_id, "Deleted message");
                    report.acknowledged += 1;
                }
                Err(e) => {
                    error!(error = %e, message_id = %message.message_id, "Failed to delete message");
                    report
                        .left_for_redelivery
                        .push((message.message_id.clone(), e.to_string()));
                }
            }
        }

        for (idx, reason) in processing_result.dead_letter {
            let Some(message) = messages.get(idx) else {
                warn!(message_index = idx, batch_size = messages.len(), "Invalid dead-letter index in ProcessingResult");
                continue;
            };
            let reason = reason.unwrap_or_else(|| "unprocessable message".to_string());

            if self.config.keep_messages {
                info!(message_id = %message.message_id, "Keeping unprocessable message");
                report.kept += 1;
                continue;
            }

            match self.dead_letter(message).await {
                Ok(true) => report.dead_lettered += 1,
                Ok(false) => report
                    .left_for_redelivery
                    .push((message.message_id.clone(), reason)),
                Err(e) => {
                    error!(error = %e, message_id = %message.message_id, "Failed to dead-letter message");
                    report
                        .left_for_redelivery
                        .push((message.message_id.clone(), reason));
                }
            }
        }

        for (idx, reason) in processing_result.nak {
            let Some(message) = messages.get(idx) else {
                warn!(message_index = idx, batch_size = messages.len(), "Invalid nak index in ProcessingResult");
                continue;
            };
            let reason = reason.unwrap_or_else(|| "processing failed".to_string());

            debug!(
                message_id = %message.message_id,
                receive_count = message.receive_count,
                reason = %reason,
                "Leaving message for redelivery"
            );
            report
                .left_for_redelivery
                .push((message.message_id.clone(), reason));
        }

        report
    }

    /// Forward the body to the dead-letter queue, then delete the original
    ///
    /// Returns false when no dead-letter queue is configured.
    async fn dead_letter(&self, message: &QueueMessage) -> CapabilityResult<bool> {
        let Some(dead_letter) = &self.dead_letter else {
            debug!(message_id = %message.message_id, "No dead-letter queue configured, leaving message");
            return Ok(false);
        };

        self.queue.send(dead_letter, &message.body).await?;
        self.queue.delete(&self.handle, message).await?;

        warn!(
            message_id = %message.message_id,
            dead_letter_queue = %dead_letter.name,
            "Moved message to dead-letter queue"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CapabilityError, MockQueue};

    fn handle(name: &str) -> QueueHandle {
        QueueHandle {
            name: name.to_string(),
            url: format!("https://sqs.local/{}", name),
        }
    }

    fn message(id: &str) -> QueueMessage {
        QueueMessage {
            message_id: id.to_string(),
            body: format!("body-{}", id),
            receipt_handle: format!("rh-{}", id),
            receive_count: 1,
        }
    }

    fn fixed_processor(
        ack: Vec<usize>,
        nak: Vec<usize>,
        dead_letter: Vec<usize>,
    ) -> BatchProcessor {
        Box::new(move |_messages: &[QueueMessage]| {
            let result = ProcessingResult {
                ack: ack.clone(),
                nak: nak.iter().map(|i| (*i, Some("failed".to_string()))).collect(),
                dead_letter: dead_letter
                    .iter()
                    .map(|i| (*i, Some("undecodable".to_string())))
                    .collect(),
            };
            Box::pin(async move { Ok(result) })
        })
    }

    #[tokio::test]
    async fn test_poll_once_deletes_only_acked_messages() {
        let mut queue = MockQueue::new();
        queue
            .expect_receive()
            .times(1)
            .returning(|_, _, _| Ok(vec![message("a"), message("b"), message("c")]));
        queue
            .expect_delete()
            .withf(|_, m: &QueueMessage| m.receipt_handle == "rh-a" || m.receipt_handle == "rh-c")
            .times(2)
            .returning(|_, _| Ok(()));

        let consumer = QueueConsumer::new(
            Arc::new(queue),
            handle("in"),
            None,
            QueueConsumerConfig::default(),
            fixed_processor(vec![0, 2], vec![1], vec![]),
        );

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.received, 3);
        assert_eq!(report.acknowledged, 2);
        assert_eq!(report.left_for_redelivery, vec![("b".to_string(), "failed".to_string())]);
    }

    #[tokio::test]
    async fn test_keep_messages_suppresses_deletion() {
        let mut queue = MockQueue::new();
        queue
            .expect_receive()
            .returning(|_, _, _| Ok(vec![message("a"), message("b")]));
        queue.expect_delete().times(0);
        queue.expect_send().times(0);

        let consumer = QueueConsumer::new(
            Arc::new(queue),
            handle("in"),
            Some(handle("dlq")),
            QueueConsumerConfig {
                keep_messages: true,
                ..Default::default()
            },
            fixed_processor(vec![0], vec![], vec![1]),
        );

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.kept, 2);
        assert_eq!(report.acknowledged, 0);
        assert_eq!(report.dead_lettered, 0);
    }

    #[tokio::test]
    async fn test_dead_letter_forwards_then_deletes() {
        let mut queue = MockQueue::new();
        queue
            .expect_receive()
            .returning(|_, _, _| Ok(vec![message("bad")]));
        queue
            .expect_send()
            .withf(|h: &QueueHandle, body: &str| h.name == "dlq" && body == "body-bad")
            .times(1)
            .returning(|_, _| Ok(()));
        queue
            .expect_delete()
            .withf(|h: &QueueHandle, m: &QueueMessage| h.name == "in" && m.message_id == "bad")
            .times(1)
            .returning(|_, _| Ok(()));

        let consumer = QueueConsumer::new(
            Arc::new(queue),
            handle("in"),
            Some(handle("dlq")),
            QueueConsumerConfig::default(),
            fixed_processor(vec![], vec![], vec![0]),
        );

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert!(report.left_for_redelivery.is_empty());
    }

    #[tokio::test]
    async fn test_failed_dead_letter_send_keeps_original() {
        let mut queue = MockQueue::new();
        queue
            .expect_receive()
            .returning(|_, _, _| Ok(vec![message("bad")]));
        queue
            .expect_send()
            .times(1)
            .returning(|_, _| Err(CapabilityError::Throttled("slow down".to_string())));
        queue.expect_delete().times(0);

        let consumer = QueueConsumer::new(
            Arc::new(queue),
            handle("in"),
            Some(handle("dlq")),
            QueueConsumerConfig::default(),
            fixed_processor(vec![], vec![], vec![0]),
        );

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.dead_lettered, 0);
        assert_eq!(report.left_for_redelivery.len(), 1);
    }

    #[tokio::test]
    async fn test_processor_error_leaves_whole_batch() {
        let mut queue = MockQueue::new();
        queue
            .expect_receive()
            .returning(|_, _, _| Ok(vec![message("a"), message("b")]));
        queue.expect_delete().times(0);

        let processor: BatchProcessor = Box::new(|_messages: &[QueueMessage]| {
            Box::pin(async { Err(anyhow::anyhow!("boom")) })
        });
        let consumer = QueueConsumer::new(
            Arc::new(queue),
            handle("in"),
            None,
            QueueConsumerConfig::default(),
            processor,
        );

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.left_for_redelivery.len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled_during_poll() {
        let mut queue = MockQueue::new();
        queue.expect_receive().returning(|_, _, _| Ok(Vec::new()));

        let consumer = QueueConsumer::new(
            Arc::new(queue),
            handle("in"),
            None,
            QueueConsumerConfig::default(),
            fixed_processor(vec![], vec![], vec![]),
        );

        let token = CancellationToken::new();
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), consumer.run(token)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    /// Queue that holds every receive open for the full wait, like an idle long-poll
    struct IdleQueue;

    #[async_trait::async_trait]
    impl Queue for IdleQueue {
        async fn resolve(&self, name: &str) -> CapabilityResult<QueueHandle> {
            Ok(handle(name))
        }

        async fn receive(
            &self,
            _handle: &QueueHandle,
            _max_messages: usize,
            wait: Duration,
        ) -> CapabilityResult<Vec<QueueMessage>> {
            tokio::time::sleep(wait).await;
            Ok(Vec::new())
        }

        async fn delete(&self, _handle: &QueueHandle, _message: &QueueMessage) -> CapabilityResult<()> {
            Ok(())
        }

        async fn send(&self, _handle: &QueueHandle, _body: &str) -> CapabilityResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_long_poll() {
        let consumer = QueueConsumer::new(
            Arc::new(IdleQueue),
            handle("in"),
            None,
            QueueConsumerConfig {
                receive_wait: Duration::from_secs(20),
                ..Default::default()
            },
            fixed_processor(vec![], vec![], vec![]),
        );

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(1), consumer.run(token)).await;

        assert!(matches!(result, Ok(Ok(()))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_survives_receive_errors() {
        let mut queue = MockQueue::new();
        queue
            .expect_receive()
            .times(2..)
            .returning(|_, _, _| Err(CapabilityError::Unavailable("connection refused".to_string())));

        let consumer = QueueConsumer::new(
            Arc::new(queue),
            handle("in"),
            None,
            QueueConsumerConfig {
                error_backoff: Duration::from_millis(5),
                ..Default::default()
            },
            fixed_processor(vec![], vec![], vec![]),
        );

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), consumer.run(token)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
