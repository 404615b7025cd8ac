use crate::aws::classify_sdk_error;
use crate::domain::{CapabilityError, CapabilityResult, Queue, QueueHandle, QueueMessage};
use async_trait::async_trait;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use std::time::Duration;
use tracing::{debug, warn};

/// Largest batch SQS returns from a single receive
pub const SQS_MAX_BATCH: usize = 10;

/// Longest long-poll SQS allows
pub const SQS_MAX_WAIT_SECS: u64 = 20;

/// Queue backed by SQS
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }
}

fn to_queue_message(message: &Message) -> Option<QueueMessage> {
    let message_id = message.message_id().unwrap_or_default().to_string();
    let Some(receipt_handle) = message.receipt_handle() else {
        warn!(message_id = %message_id, "received message without receipt handle, ignoring");
        return None;
    };

    let receive_count = message
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|count| count.parse().ok())
        .unwrap_or(0);

    Some(QueueMessage {
        message_id,
        body: message.body().unwrap_or_default().to_string(),
        receipt_handle: receipt_handle.to_string(),
        receive_count,
    })
}

#[async_trait]
impl Queue for SqsQueue {
    async fn resolve(&self, name: &str) -> CapabilityResult<QueueHandle> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| classify_sdk_error("failed to resolve queue", e))?;

        let url = output
            .queue_url()
            .ok_or_else(|| CapabilityError::NotFound(format!("no URL returned for queue {}", name)))?;

        Ok(QueueHandle {
            name: name.to_string(),
            url: url.to_string(),
        })
    }

    async fn receive(
        &self,
        handle: &QueueHandle,
        max_messages: usize,
        wait: Duration,
    ) -> CapabilityResult<Vec<QueueMessage>> {
        let max_messages = max_messages.clamp(1, SQS_MAX_BATCH) as i32;
        let wait_secs = wait.as_secs().min(SQS_MAX_WAIT_SECS) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&handle.url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_secs)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| classify_sdk_error("failed to receive messages", e))?;

        let messages: Vec<QueueMessage> =
            output.messages().iter().filter_map(to_queue_message).collect();

        debug!(queue = %handle.name, count = messages.len(), "received messages");
        Ok(messages)
    }

    async fn delete(&self, handle: &QueueHandle, message: &QueueMessage) -> CapabilityResult<()> {
        self.client
            .delete_message()
            .queue_url(&handle.url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(|e| classify_sdk_error("failed to delete message", e))?;
        Ok(())
    }

    async fn send(&self, handle: &QueueHandle, body: &str) -> CapabilityResult<()> {
        self.client
            .send_message()
            .queue_url(&handle.url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| classify_sdk_error("failed to send message", e))?;
        Ok(())
    }
}
