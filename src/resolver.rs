use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DiscoveryError, ProviderError};
use crate::provider::CloudProvider;

/// Region used when neither instance metadata nor the environment provide one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Account and region the discovery service operates in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: String,
    pub region: String,
}

/// Capped exponential backoff between region lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries until cancelled.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }
}

/// Resolves the caller account and operating region once at startup.
///
/// Account lookup failures are fatal. Region lookup falls back to
/// `fallback_region` (then [`DEFAULT_REGION`]) when instance metadata is
/// unreachable, and retries any other failure according to `policy`.
pub async fn resolve<P: CloudProvider>(
    provider: &P,
    fallback_region: Option<&str>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Identity, DiscoveryError> {
    let account_id = provider
        .caller_account_id()
        .await
        .map_err(DiscoveryError::Identity)?;

    debug!(account_id = %account_id, "Resolved caller account");

    let region = resolve_region(provider, fallback_region, policy, cancel).await?;

    info!(
        account_id = %account_id,
        region = %region,
        "Resolved discovery identity"
    );

    Ok(Identity { account_id, region })
}

async fn resolve_region<P: CloudProvider>(
    provider: &P,
    fallback_region: Option<&str>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, DiscoveryError> {
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }
        attempt += 1;

        match provider.instance_region().await {
            Ok(region) if !region.is_empty() => return Ok(region),
            Ok(_) => {
                warn!(attempt = attempt, "Instance metadata returned an empty region");
            }
            Err(ProviderError::MetadataUnavailable(reason)) => {
                let region = fallback(fallback_region);
                warn!(
                    reason = %reason,
                    region = %region,
                    "Instance metadata unreachable, using fallback region"
                );
                return Ok(region);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    attempt = attempt,
                    "Could not get region"
                );
            }
        }

        if policy.exhausted(attempt) {
            return Err(DiscoveryError::RegionUnresolved { attempts: attempt });
        }

        let delay = policy.delay_for(attempt);
        debug!(
            attempt = attempt,
            retry_in_ms = delay.as_millis() as u64,
            "Retrying region lookup"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn fallback(fallback_region: Option<&str>) -> String {
    fallback_region
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REGION)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_capped() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(20));
        assert_eq!(policy.delay_for(4), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_unlimited_policy_is_never_exhausted() {
        let policy = RetryPolicy::default();
        assert!(!policy.exhausted(1));
        assert!(!policy.exhausted(u32::MAX));
    }

    #[test]
    fn test_bounded_policy_exhausts_at_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }

    #[test]
    fn test_fallback_prefers_environment_region() {
        assert_eq!(fallback(Some("ap-northeast-2")), "ap-northeast-2");
        assert_eq!(fallback(Some("  ")), DEFAULT_REGION);
        assert_eq!(fallback(None), DEFAULT_REGION);
    }
}
