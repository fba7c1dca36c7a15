use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ProviderError;
use crate::provider::Inventory;
use crate::resolver::Identity;

/// Rewrites `name` into a valid Prometheus label name.
///
/// Every character outside `[a-zA-Z0-9_]` becomes `_`. Names are always
/// used after the `__meta_elasticache_tag_` prefix, so a leading digit stays.
pub fn sanitize_label_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// AWS partition a region belongs to.
pub fn partition_for_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else {
        "aws"
    }
}

/// Fetches cluster tags and turns them into label-safe key/value pairs.
#[derive(Debug, Clone)]
pub struct TagEnricher {
    identity: Identity,
}

impl TagEnricher {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    /// ARN of the cache cluster, used as the tag lookup resource name.
    pub fn cluster_arn(&self, cluster_id: &str) -> String {
        format!(
            "arn:{}:elasticache:{}:{}:cluster:{}",
            partition_for_region(&self.identity.region),
            self.identity.region,
            self.identity.account_id,
            cluster_id
        )
    }

    /// Returns the cluster's tags keyed by sanitized tag key.
    ///
    /// Tags missing a key or a value are dropped.
    pub async fn fetch_tags<I: Inventory + ?Sized>(
        &self,
        inventory: &I,
        cluster_id: &str,
    ) -> Result<BTreeMap<String, String>, ProviderError> {
        let arn = self.cluster_arn(cluster_id);
        let tags = inventory.list_tags(&arn).await?;

        let mut sanitized = BTreeMap::new();
        let mut skipped = 0usize;

        for tag in tags {
            match (tag.key, tag.value) {
                (Some(key), Some(value)) => {
                    sanitized.insert(sanitize_label_name(&key), value);
                }
                _ => skipped += 1,
            }
        }

        debug!(
            cluster_id = %cluster_id,
            resource_name = %arn,
            tag_count = sanitized.len(),
            skipped_tags = skipped,
            "Fetched cluster tags"
        );

        Ok(sanitized)
    }
}
