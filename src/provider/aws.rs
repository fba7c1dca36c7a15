use async_trait::async_trait;
use aws_config::imds::client::error::ImdsError;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_elasticache::Client as ElastiCacheClient;
use aws_sdk_elasticache::types as ec_types;
use aws_sdk_sts::Client as StsClient;
use aws_smithy_types::error::display::DisplayErrorContext;
use tracing::{debug, info};

use super::{
    CacheCluster, CacheNode, CloudProvider, Endpoint, Inventory, InventoryPage, ResourceTag,
};
use crate::error::ProviderError;
use crate::resolver::DEFAULT_REGION;

const IMDS_REGION_PATH: &str = "/latest/meta-data/placement/region";

/// [`CloudProvider`] backed by STS, IMDS and the ElastiCache API.
pub struct AwsProvider {
    sts: StsClient,
    imds: aws_config::imds::Client,
}

impl AwsProvider {
    /// Loads the default AWS configuration chain.
    ///
    /// STS needs a region even though the identity call is global, so
    /// `fallback_region` (or the built-in default) is used when the chain
    /// resolves none.
    pub async fn load(fallback_region: Option<&str>) -> Self {
        debug!("Initializing AWS SDK configuration");

        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let sts_region = config
            .region()
            .cloned()
            .unwrap_or_else(|| {
                Region::new(fallback_region.unwrap_or(DEFAULT_REGION).to_string())
            });

        let sts_config = aws_sdk_sts::config::Builder::from(&config)
            .region(sts_region.clone())
            .build();

        info!(
            sts_region = %sts_region,
            "AWS SDK configuration loaded"
        );

        Self {
            sts: StsClient::from_conf(sts_config),
            imds: aws_config::imds::Client::builder().build(),
        }
    }

    async fn load_region_config(region: &str) -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    type Inventory = AwsInventory;

    async fn caller_account_id(&self) -> Result<String, ProviderError> {
        let response = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| {
                ProviderError::api("GetCallerIdentity", DisplayErrorContext(&e).to_string())
            })?;

        response
            .account()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::api("GetCallerIdentity", "response carried no account"))
    }

    async fn instance_region(&self) -> Result<String, ProviderError> {
        imds_region(&self.imds).await
    }

    async fn inventory(&self, region: &str) -> Result<AwsInventory, ProviderError> {
        let config = Self::load_region_config(region).await;

        if config.credentials_provider().is_none() {
            return Err(ProviderError::Config(format!(
                "no credentials provider available for region {}",
                region
            )));
        }

        Ok(AwsInventory {
            client: ElastiCacheClient::new(&config),
        })
    }
}

async fn imds_region(imds: &aws_config::imds::Client) -> Result<String, ProviderError> {
    let region = imds
        .get(IMDS_REGION_PATH)
        .await
        .map_err(classify_imds_error)?;

    Ok(region.as_ref().trim().to_string())
}

/// Only a metadata service that cannot be reached at all maps to
/// [`ProviderError::MetadataUnavailable`]. Anything that produced an HTTP
/// response is an API failure and gets retried.
fn classify_imds_error(error: ImdsError) -> ProviderError {
    let message = DisplayErrorContext(&error).to_string();

    match &error {
        ImdsError::FailedToLoadToken(token) if token.is_dispatch_failure() => {
            ProviderError::MetadataUnavailable(message)
        }
        ImdsError::IoError(_) => ProviderError::MetadataUnavailable(message),
        _ => ProviderError::api("GetInstanceRegion", message),
    }
}

/// ElastiCache client bound to one region.
pub struct AwsInventory {
    client: ElastiCacheClient,
}

#[async_trait]
impl Inventory for AwsInventory {
    async fn describe_cache_clusters(
        &self,
        marker: Option<String>,
    ) -> Result<InventoryPage, ProviderError> {
        let output = self
            .client
            .describe_cache_clusters()
            .show_cache_node_info(true)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| {
                ProviderError::api("DescribeCacheClusters", DisplayErrorContext(&e).to_string())
            })?;

        Ok(InventoryPage {
            clusters: output.cache_clusters().iter().map(convert_cluster).collect(),
            next_marker: output.marker().map(str::to_string),
        })
    }

    async fn list_tags(&self, resource_name: &str) -> Result<Vec<ResourceTag>, ProviderError> {
        let output = self
            .client
            .list_tags_for_resource()
            .resource_name(resource_name)
            .send()
            .await
            .map_err(|e| {
                ProviderError::api("ListTagsForResource", DisplayErrorContext(&e).to_string())
            })?;

        Ok(output
            .tag_list()
            .iter()
            .map(|tag| ResourceTag {
                key: tag.key().map(str::to_string),
                value: tag.value().map(str::to_string),
            })
            .collect())
    }
}

fn convert_cluster(cluster: &ec_types::CacheCluster) -> CacheCluster {
    CacheCluster {
        cache_cluster_id: cluster.cache_cluster_id().map(str::to_string),
        cache_node_type: cluster.cache_node_type().map(str::to_string),
        engine: cluster.engine().map(str::to_string),
        engine_version: cluster.engine_version().map(str::to_string),
        cache_nodes: cluster.cache_nodes().iter().map(convert_node).collect(),
    }
}

fn convert_node(node: &ec_types::CacheNode) -> CacheNode {
    CacheNode {
        cache_node_id: node.cache_node_id().map(str::to_string),
        customer_availability_zone: node.customer_availability_zone().map(str::to_string),
        cache_node_status: node.cache_node_status().map(str::to_string),
        endpoint: node.endpoint().map(|e| Endpoint {
            address: e.address().map(str::to_string),
            port: e.port(),
        }),
    }
}
