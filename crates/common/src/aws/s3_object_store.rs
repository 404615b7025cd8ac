use crate::aws::classify_sdk_error;
use crate::domain::{CapabilityError, CapabilityResult, ObjectStore, Region};
use async_trait::async_trait;
use aws_config::SdkConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Region S3 reports for buckets without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

/// ObjectStore backed by S3
///
/// Bucket regions and per-region clients are cached for the lifetime of the
/// store, so each bucket is located once and every fetch goes to the
/// bucket's own regional endpoint.
pub struct S3ObjectStore {
    sdk_config: SdkConfig,
    force_path_style: bool,
    locator: aws_sdk_s3::Client,
    bucket_regions: Mutex<HashMap<String, Region>>,
    regional_clients: Mutex<HashMap<Region, aws_sdk_s3::Client>>,
}

impl S3ObjectStore {
    pub fn new(sdk_config: SdkConfig, force_path_style: bool) -> Self {
        let locator_region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let locator = build_client(&sdk_config, &Region::new(locator_region), force_path_style);

        Self {
            sdk_config,
            force_path_style,
            locator,
            bucket_regions: Mutex::new(HashMap::new()),
            regional_clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, region: &Region) -> aws_sdk_s3::Client {
        let mut clients = self
            .regional_clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        clients
            .entry(region.clone())
            .or_insert_with(|| {
                debug!(region = %region, "creating regional S3 client");
                build_client(&self.sdk_config, region, self.force_path_style)
            })
            .clone()
    }

    fn cached_region(&self, bucket: &str) -> Option<Region> {
        self.bucket_regions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(bucket)
            .cloned()
    }
}

fn build_client(sdk_config: &SdkConfig, region: &Region, force_path_style: bool) -> aws_sdk_s3::Client {
    let config = aws_sdk_s3::config::Builder::from(sdk_config)
        .region(aws_sdk_s3::config::Region::new(region.as_str().to_string()))
        .force_path_style(force_path_style)
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

/// Translate a GetBucketLocation constraint into a region name
///
/// S3 returns no constraint for us-east-1 and the legacy `EU` alias for eu-west-1.
pub fn region_from_location_constraint(constraint: Option<&str>) -> Region {
    match constraint {
        None | Some("") => Region::new(DEFAULT_REGION),
        Some("EU") => Region::new("eu-west-1"),
        Some(region) => Region::new(region),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn region_of(&self, bucket: &str) -> CapabilityResult<Region> {
        if let Some(region) = self.cached_region(bucket) {
            return Ok(region);
        }

        let output = self
            .locator
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify_sdk_error("failed to get bucket location", e))?;

        let region =
            region_from_location_constraint(output.location_constraint().map(|c| c.as_str()));
        debug!(bucket = %bucket, region = %region, "resolved bucket region");

        self.bucket_regions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(bucket.to_string(), region.clone());

        Ok(region)
    }

    async fn fetch(
        &self,
        bucket: &str,
        key: &str,
        region: &Region,
        dest: &Path,
    ) -> CapabilityResult<u64> {
        let output = self
            .client_for(region)
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error("failed to get object", e))?;

        let write_error = |e: std::io::Error| {
            CapabilityError::Interrupted(format!("failed to write {}: {}", dest.display(), e))
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(write_error)?;
        let mut body = output.body;
        let mut written: u64 = 0;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| CapabilityError::Interrupted(format!("failed to read object body: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;

        debug!(bucket = %bucket, key = %key, bytes = written, "fetched object");
        Ok(written)
    }
}
