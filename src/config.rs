use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::discovery::DiscoverySettings;
use crate::resolver::{Identity, RetryPolicy};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[value(alias = "compact", alias = "text")]
    Pretty,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "elasticache-sd",
    version,
    about = "Generates Prometheus file_sd targets for AWS ElastiCache cache nodes"
)]
pub struct Config {
    /// Output file for file_sd compatible targets
    #[arg(long, env = "OUTPUT_FILE", default_value = "elasticache_sd.json")]
    pub output_file: PathBuf,

    /// Refresh interval in seconds to re-read the cache cluster inventory
    #[arg(
        long,
        env = "REFRESH_INTERVAL",
        default_value = "120",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub refresh_interval: u64,

    /// Region used when instance metadata is unreachable
    #[arg(long, env = "AWS_REGION")]
    pub fallback_region: Option<String>,

    /// Initial delay in seconds between region lookup attempts
    #[arg(long, env = "REGION_RETRY_DELAY", default_value = "5")]
    pub region_retry_delay: u64,

    /// Upper bound in seconds for the region lookup backoff
    #[arg(long, env = "REGION_RETRY_MAX_DELAY", default_value = "60")]
    pub region_retry_max_delay: u64,

    /// Maximum region lookup attempts (0 retries until shutdown)
    #[arg(long, env = "REGION_RETRY_MAX_ATTEMPTS", default_value = "0")]
    pub region_retry_max_attempts: u32,

    /// Health check server port (0 disables the server)
    #[arg(long, env = "HEALTH_PORT", default_value = "8080")]
    pub health_port: u16,

    /// Log format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json", ignore_case = true)]
    pub log_format: LogFormat,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn region_retry_policy(&self) -> RetryPolicy {
        let initial_delay = Duration::from_secs(self.region_retry_delay);
        RetryPolicy {
            initial_delay,
            max_delay: Duration::from_secs(self.region_retry_max_delay).max(initial_delay),
            max_attempts: (self.region_retry_max_attempts > 0)
                .then_some(self.region_retry_max_attempts),
        }
    }

    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            refresh_interval: self.refresh_interval(),
            fallback_region: self.fallback_region.clone(),
            region_retry: self.region_retry_policy(),
        }
    }

    pub fn display(&self, identity: &Identity) {
        let attempts = if self.region_retry_max_attempts == 0 {
            "unlimited".to_string()
        } else {
            self.region_retry_max_attempts.to_string()
        };

        tracing::info!(
            account_id = %identity.account_id,
            region = %identity.region,
            output_file = %self.output_file.display(),
            refresh_interval_seconds = self.refresh_interval,
            fallback_region = self.fallback_region.as_deref().unwrap_or("none"),
            region_retry_max_attempts = %attempts,
            health_port = self.health_port,
            log_format = ?self.log_format,
            log_level = %self.log_level,
            "Configuration initialized"
        );

        if self.health_port == 0 {
            tracing::warn!("Health check server disabled");
        }
    }
}
