use config::{Config, ConfigError, Environment};
use object_downloader::ObjectDownloaderConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level used when not running verbose (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (text, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Directory objects are written under
    #[serde(default = "default_download_root")]
    pub download_root: String,

    // Queue consumption
    /// Maximum messages per receive
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Long-poll wait in seconds
    #[serde(default = "default_receive_wait_secs")]
    pub receive_wait_secs: u64,

    /// Pause after a failed receive in milliseconds
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Concurrent downloads within a single message
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,

    /// Queue receiving messages that can never be processed
    #[serde(default)]
    pub dead_letter_queue: Option<String>,

    // Notification handling
    /// Comma-separated topic ARNs accepted as notification sources
    #[serde(default)]
    pub allowed_topic_arns: String,

    /// URL-decode object keys from event records
    #[serde(default = "default_decode_object_keys")]
    pub decode_object_keys: bool,

    // AWS SDK
    /// Total attempts per SDK call, including the first
    #[serde(default = "default_aws_max_attempts")]
    pub aws_max_attempts: u32,

    /// Endpoint override for S3 and SQS
    #[serde(default)]
    pub aws_endpoint_url: Option<String>,

    /// Grace period for in-flight work on shutdown, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("S3DRAIN"))
            .build()?
            .try_deserialize()
    }

    pub fn allowed_topics(&self) -> Vec<String> {
        self.allowed_topic_arns
            .split(',')
            .map(str::trim)
            .filter(|arn| !arn.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Downloader settings for `queue_name`, combined with the command line flags
    pub fn downloader_config(&self, queue_name: &str, keep_messages: bool) -> ObjectDownloaderConfig {
        ObjectDownloaderConfig {
            queue_name: queue_name.to_string(),
            dead_letter_queue: self
                .dead_letter_queue
                .clone()
                .filter(|name| !name.trim().is_empty()),
            download_root: PathBuf::from(&self.download_root),
            batch_size: self.batch_size,
            receive_wait: Duration::from_secs(self.receive_wait_secs),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
            keep_messages,
            download_concurrency: self.download_concurrency,
            decode_object_keys: self.decode_object_keys,
        }
    }
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_download_root() -> String {
    "objects".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_receive_wait_secs() -> u64 {
    2
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_download_concurrency() -> usize {
    1
}

fn default_decode_object_keys() -> bool {
    true
}

fn default_aws_max_attempts() -> u32 {
    3
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}
