use crate::domain::{NotificationService, ProcessError};
use common::{BatchProcessor, ProcessingResult, QueueMessage};
use std::sync::Arc;
use tracing::{debug, error};

/// Create a BatchProcessor that runs each message through the notification service
///
/// Messages are processed one after another in receipt order. A failure only
/// affects the message it belongs to.
pub fn create_notification_processor(service: Arc<NotificationService>) -> BatchProcessor {
    Box::new(move |messages: &[QueueMessage]| {
        let service = Arc::clone(&service);

        // Owned copies, the slice does not outlive this call
        let messages = messages.to_vec();

        Box::pin(async move {
            let mut result = ProcessingResult::default();

            for (idx, message) in messages.iter().enumerate() {
                match service.process_message(message).await {
                    Ok(paths) => {
                        debug!(
                            message_id = %message.message_id,
                            artifact_count = paths.len(),
                            "successfully processed notification"
                        );
                        result.ack.push(idx);
                    }
                    Err(e) => {
                        report_failure(message, &e);
                        if e.is_permanent() {
                            result.dead_letter.push((idx, Some(e.to_string())));
                        } else {
                            result.nak.push((idx, Some(e.to_string())));
                        }
                    }
                }
            }

            Ok(result)
        })
    })
}

fn report_failure(message: &QueueMessage, err: &ProcessError) {
    match err {
        ProcessError::Download(download) => error!(
            message_id = %message.message_id,
            bucket = %download.bucket,
            key = %download.key,
            stage = %download.stage,
            error = %download.source,
            "failed to download object, message left for redelivery"
        ),
        ProcessError::Decode(decode) => error!(
            message_id = %message.message_id,
            receive_count = message.receive_count,
            error = %decode,
            "failed to decode notification"
        ),
        ProcessError::Rejected(rejected) => error!(
            message_id = %message.message_id,
            error = %rejected,
            "notification failed verification"
        ),
    }
}
