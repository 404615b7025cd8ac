use thiserror::Error;

/// Failure reported by a queue or object store capability.
///
/// The variants classify the failure so callers can tell a missing resource
/// from a throttled or unreachable provider; the payload is the provider's
/// message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("transfer interrupted: {0}")]
    Interrupted(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl CapabilityError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CapabilityError::Throttled(_)
                | CapabilityError::Interrupted(_)
                | CapabilityError::Unavailable(_)
        )
    }
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CapabilityError::Throttled("slow down".into()).is_transient());
        assert!(CapabilityError::Unavailable("dns".into()).is_transient());
        assert!(CapabilityError::Interrupted("reset".into()).is_transient());
        assert!(!CapabilityError::NotFound("bucket".into()).is_transient());
        assert!(!CapabilityError::AccessDenied("bucket".into()).is_transient());
    }
}
