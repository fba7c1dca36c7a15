//! Provider-neutral view of the managed-cache inventory.
//!
//! The discovery loop only talks to these traits. `aws` holds the adapter
//! backed by the AWS SDK; tests supply in-memory fakes.

pub mod aws;

use async_trait::async_trait;

use crate::error::ProviderError;

/// Network endpoint of a cache node. Absent until the node is provisioned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub address: Option<String>,
    pub port: Option<i32>,
}

/// One addressable node of a cache cluster, as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheNode {
    pub cache_node_id: Option<String>,
    pub customer_availability_zone: Option<String>,
    pub cache_node_status: Option<String>,
    pub endpoint: Option<Endpoint>,
}

impl CacheNode {
    /// Resolved endpoint address, if the node is ready to be scraped.
    pub fn address(&self) -> Option<&str> {
        self.endpoint.as_ref().and_then(|e| e.address.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheCluster {
    pub cache_cluster_id: Option<String>,
    pub cache_node_type: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub cache_nodes: Vec<CacheNode>,
}

impl CacheCluster {
    pub fn has_ready_nodes(&self) -> bool {
        self.cache_nodes.iter().any(|n| n.address().is_some())
    }
}

/// A single page of the cluster listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryPage {
    pub clusters: Vec<CacheCluster>,
    pub next_marker: Option<String>,
}

impl InventoryPage {
    /// Marker for the following page, or `None` on the last page.
    pub fn next_marker(&self) -> Option<&str> {
        self.next_marker.as_deref().filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTag {
    pub key: Option<String>,
    pub value: Option<String>,
}

impl ResourceTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
        }
    }
}

/// Read-only inventory calls, bound to one region for the duration of a tick.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Lists cache clusters with node details. `marker` is `None` for the first page.
    async fn describe_cache_clusters(
        &self,
        marker: Option<String>,
    ) -> Result<InventoryPage, ProviderError>;

    /// Lists the tags attached to the resource with the given ARN.
    async fn list_tags(&self, resource_name: &str) -> Result<Vec<ResourceTag>, ProviderError>;
}

/// Account, region and per-tick client construction.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    type Inventory: Inventory;

    async fn caller_account_id(&self) -> Result<String, ProviderError>;

    /// Region of the host, from instance metadata.
    ///
    /// Returns [`ProviderError::MetadataUnavailable`] when the metadata
    /// service cannot be reached at all.
    async fn instance_region(&self) -> Result<String, ProviderError>;

    /// Loads client configuration for `region`. Called once per tick.
    async fn inventory(&self, region: &str) -> Result<Self::Inventory, ProviderError>;
}
