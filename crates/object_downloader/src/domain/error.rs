use common::domain::CapabilityError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("notification envelope is not valid JSON: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    #[error("notification envelope has no Message field")]
    MissingMessage,

    #[error("storage event is not valid JSON: {0}")]
    InvalidEvent(#[source] serde_json::Error),

    #[error("storage event has no Records sequence")]
    MissingRecords,

    #[error("record {index} is missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("record {index} has an undecodable object key: {key}")]
    InvalidObjectKey { index: usize, key: String },
}

#[derive(Debug, Error)]
#[error("notification rejected: {reason}")]
pub struct VerificationError {
    pub reason: String,
}

/// Step of a download that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    RegionLookup,
    Io,
    Fetch,
}

impl fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DownloadStage::RegionLookup => "region-lookup",
            DownloadStage::Io => "io",
            DownloadStage::Fetch => "fetch",
        })
    }
}

#[derive(Debug, Error)]
pub enum DownloadFailure {
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
#[error("download of s3://{bucket}/{key} failed during {stage}: {source}")]
pub struct DownloadError {
    pub stage: DownloadStage,
    pub bucket: String,
    pub key: String,
    #[source]
    pub source: DownloadFailure,
}

/// Why a single queue message could not be processed
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Rejected(#[from] VerificationError),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl ProcessError {
    /// Permanent failures will fail again on redelivery
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProcessError::Decode(_) | ProcessError::Rejected(_))
    }
}

/// Errors that stop the process before the consumer loop starts
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to resolve queue {queue}: {source}")]
    QueueResolution {
        queue: String,
        #[source]
        source: CapabilityError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_display_names_stage_and_object() {
        let err = DownloadError {
            stage: DownloadStage::RegionLookup,
            bucket: "bkt".to_string(),
            key: "a/b.txt".to_string(),
            source: CapabilityError::NotFound("NoSuchBucket".to_string()).into(),
        };

        assert_eq!(
            err.to_string(),
            "download of s3://bkt/a/b.txt failed during region-lookup: not found: NoSuchBucket"
        );
    }

    #[test]
    fn test_permanent_classification() {
        assert!(ProcessError::from(DecodeError::MissingRecords).is_permanent());
        assert!(ProcessError::from(VerificationError {
            reason: "topic".to_string()
        })
        .is_permanent());

        let download = DownloadError {
            stage: DownloadStage::Fetch,
            bucket: "b".to_string(),
            key: "k".to_string(),
            source: CapabilityError::Throttled("slow".to_string()).into(),
        };
        assert!(!ProcessError::from(download).is_permanent());
    }
}
