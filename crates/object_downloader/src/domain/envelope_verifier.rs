use crate::domain::{NotificationEnvelope, VerificationError};
use std::collections::HashSet;

/// Hook deciding whether a decoded envelope may be acted upon
///
/// Implementations may check signatures, topics or anything else carried by
/// the envelope. A rejection is treated like an undecodable message.
#[cfg_attr(test, mockall::automock)]
pub trait EnvelopeVerifier: Send + Sync {
    fn verify(&self, envelope: &NotificationEnvelope) -> Result<(), VerificationError>;

    /// Whether this verifier establishes provenance at all
    fn authenticates(&self) -> bool {
        true
    }
}

/// Accepts every envelope. Provenance is NOT verified.
#[derive(Debug, Default, Clone)]
pub struct NoopVerifier;

impl EnvelopeVerifier for NoopVerifier {
    fn verify(&self, _envelope: &NotificationEnvelope) -> Result<(), VerificationError> {
        Ok(())
    }

    fn authenticates(&self) -> bool {
        false
    }
}

/// Accepts only envelopes published to one of the allowed topics
///
/// This filters on the claimed `TopicArn`; it does not check signatures.
#[derive(Debug, Clone)]
pub struct TopicAllowlistVerifier {
    allowed: HashSet<String>,
}

impl TopicAllowlistVerifier {
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: topics.into_iter().map(Into::into).collect(),
        }
    }
}

impl EnvelopeVerifier for TopicAllowlistVerifier {
    fn verify(&self, envelope: &NotificationEnvelope) -> Result<(), VerificationError> {
        match envelope.topic_arn.as_deref() {
            Some(topic) if self.allowed.contains(topic) => Ok(()),
            Some(topic) => Err(VerificationError {
                reason: format!("topic {} is not allowed", topic),
            }),
            None => Err(VerificationError {
                reason: "envelope has no TopicArn".to_string(),
            }),
        }
    }

    fn authenticates(&self) -> bool {
        false
    }
}
