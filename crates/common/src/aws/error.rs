use crate::domain::CapabilityError;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

/// Map an AWS SDK error onto the capability error taxonomy
///
/// Transport failures (timeouts, dispatch failures, truncated responses) are
/// classified before looking at the service error code.
pub fn classify_sdk_error<E, R>(context: &str, err: SdkError<E, R>) -> CapabilityError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = format!("{}: {}", context, DisplayErrorContext(&err));

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            CapabilityError::Unavailable(message)
        }
        SdkError::ResponseError(_) => CapabilityError::Interrupted(message),
        _ => classify_error_code(err.code(), message),
    }
}

fn classify_error_code(code: Option<&str>, message: String) -> CapabilityError {
    match code {
        Some(
            "NoSuchBucket"
            | "NoSuchKey"
            | "NotFound"
            | "QueueDoesNotExist"
            | "AWS.SimpleQueueService.NonExistentQueue",
        ) => CapabilityError::NotFound(message),
        Some("AccessDenied" | "AccessDeniedException" | "Forbidden" | "AllAccessDisabled") => {
            CapabilityError::AccessDenied(message)
        }
        Some(
            "SlowDown"
            | "Throttling"
            | "ThrottlingException"
            | "RequestThrottled"
            | "RequestThrottledException"
            | "TooManyRequestsException",
        ) => CapabilityError::Throttled(message),
        _ => CapabilityError::Unavailable(message),
    }
}
