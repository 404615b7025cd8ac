use crate::domain::error::CapabilityResult;
use async_trait::async_trait;
use std::time::Duration;

/// Resolved reference to a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub url: String,
}

/// A message as delivered by the queue
///
/// `receipt_handle` is the acknowledgment token needed to delete the message.
/// `receive_count` is the provider's approximate delivery count, 0 when the
/// provider did not report one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
    pub receipt_handle: String,
    pub receive_count: u32,
}

/// Queue capability consumed by the consumer loop
///
/// Implementations should:
/// - Resolve a queue name to a handle once at startup
/// - Long-poll for at most `wait` when no messages are available
/// - Delete by receipt handle, never by message id
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Queue: Send + Sync {
    /// Resolve a queue name to a handle
    async fn resolve(&self, name: &str) -> CapabilityResult<QueueHandle>;

    /// Receive up to `max_messages`, blocking up to `wait` while the queue is empty
    async fn receive(
        &self,
        handle: &QueueHandle,
        max_messages: usize,
        wait: Duration,
    ) -> CapabilityResult<Vec<QueueMessage>>;

    /// Delete (acknowledge) a message
    async fn delete(&self, handle: &QueueHandle, message: &QueueMessage) -> CapabilityResult<()>;

    /// Enqueue a new message with the given body
    async fn send(&self, handle: &QueueHandle, body: &str) -> CapabilityResult<()>;
}
