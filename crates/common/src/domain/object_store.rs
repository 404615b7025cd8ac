use crate::domain::error::CapabilityResult;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Storage region a bucket lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region(String);

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object store capability consumed by the downloader
///
/// Implementations should:
/// - Report the region a bucket lives in
/// - Fetch an object through an endpoint scoped to that region
/// - Write the object bytes to `dest`, truncating anything already there
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolve the region of a bucket
    async fn region_of(&self, bucket: &str) -> CapabilityResult<Region>;

    /// Fetch `bucket/key` from `region` into `dest`, returning the number of bytes written
    async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        region: &Region,
        dest: &Path,
    ) -> CapabilityResult<u64>;
}
