#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use elasticache_sd::discovery::DiscoverySettings;
use elasticache_sd::error::ProviderError;
use elasticache_sd::provider::{
    CacheCluster, CacheNode, CloudProvider, Endpoint, Inventory, InventoryPage, ResourceTag,
};
use elasticache_sd::resolver::RetryPolicy;

pub const ACCOUNT_ID: &str = "123456789012";
pub const REGION: &str = "ap-northeast-2";

/// In-memory provider. Clones share state so tests can inspect calls.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<FakeState>,
}

#[derive(Default)]
struct FakeState {
    account_error: Mutex<Option<ProviderError>>,
    regions: Mutex<VecDeque<Result<String, ProviderError>>>,
    region_calls: Mutex<u32>,
    pages: Mutex<Vec<Vec<CacheCluster>>>,
    inventory_failures: Mutex<u32>,
    listing_failures: Mutex<u32>,
    blocked_page: Mutex<Option<usize>>,
    page_entered: Notify,
    listing_starts: Mutex<Vec<Instant>>,
    tags: Mutex<HashMap<String, Vec<ResourceTag>>>,
    failing_tags: Mutex<HashSet<String>>,
    tag_requests: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<Vec<CacheCluster>>) -> Self {
        let provider = Self::new();
        *provider.state.pages.lock().unwrap() = pages;
        provider
    }

    pub fn fail_account(&self, error: ProviderError) {
        *self.state.account_error.lock().unwrap() = Some(error);
    }

    /// Queues region lookup results. Once drained, lookups return [`REGION`].
    pub fn queue_region(&self, result: Result<String, ProviderError>) {
        self.state.regions.lock().unwrap().push_back(result);
    }

    pub fn region_calls(&self) -> u32 {
        *self.state.region_calls.lock().unwrap()
    }

    /// The next `count` inventory client requests fail with a config error.
    pub fn fail_inventory(&self, count: u32) {
        *self.state.inventory_failures.lock().unwrap() = count;
    }

    /// The next `count` listings of the first page fail.
    pub fn fail_listings(&self, count: u32) {
        *self.state.listing_failures.lock().unwrap() = count;
    }

    /// Listing the given page never completes.
    pub fn block_page(&self, page: usize) {
        *self.state.blocked_page.lock().unwrap() = Some(page);
    }

    pub async fn wait_for_blocked_page(&self) {
        self.state.page_entered.notified().await;
    }

    pub fn listing_starts(&self) -> Vec<Instant> {
        self.state.listing_starts.lock().unwrap().clone()
    }

    pub fn set_tags(&self, cluster_id: &str, tags: Vec<ResourceTag>) {
        self.state
            .tags
            .lock()
            .unwrap()
            .insert(cluster_id.to_string(), tags);
    }

    pub fn fail_tags(&self, cluster_id: &str) {
        self.state
            .failing_tags
            .lock()
            .unwrap()
            .insert(cluster_id.to_string());
    }

    pub fn tag_requests(&self) -> Vec<String> {
        self.state.tag_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    type Inventory = FakeProvider;

    async fn caller_account_id(&self) -> Result<String, ProviderError> {
        match self.state.account_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(ACCOUNT_ID.to_string()),
        }
    }

    async fn instance_region(&self) -> Result<String, ProviderError> {
        *self.state.region_calls.lock().unwrap() += 1;
        self.state
            .regions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(REGION.to_string()))
    }

    async fn inventory(&self, region: &str) -> Result<FakeProvider, ProviderError> {
        assert_eq!(region, REGION, "Inventory requested for unexpected region");

        let mut failures = self.state.inventory_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ProviderError::Config("no credentials provider".to_string()));
        }
        Ok(self.clone())
    }
}

#[async_trait]
impl Inventory for FakeProvider {
    async fn describe_cache_clusters(
        &self,
        marker: Option<String>,
    ) -> Result<InventoryPage, ProviderError> {
        let index: usize = marker.as_deref().map_or(0, |m| m.parse().unwrap());

        if index == 0 {
            self.state.listing_starts.lock().unwrap().push(Instant::now());

            let mut failures = self.state.listing_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ProviderError::api("DescribeCacheClusters", "throttled"));
            }
        }

        let blocked = *self.state.blocked_page.lock().unwrap() == Some(index);
        if blocked {
            self.state.page_entered.notify_one();
            std::future::pending::<()>().await;
        }

        let pages = self.state.pages.lock().unwrap();
        let clusters = pages.get(index).cloned().unwrap_or_default();
        let next_marker = (index + 1 < pages.len()).then(|| (index + 1).to_string());

        Ok(InventoryPage {
            clusters,
            next_marker,
        })
    }

    async fn list_tags(&self, resource_name: &str) -> Result<Vec<ResourceTag>, ProviderError> {
        self.state
            .tag_requests
            .lock()
            .unwrap()
            .push(resource_name.to_string());

        let cluster_id = resource_name
            .rsplit_once(":cluster:")
            .map(|(_, id)| id.to_string())
            .unwrap_or_default();

        if self.state.failing_tags.lock().unwrap().contains(&cluster_id) {
            return Err(ProviderError::api("ListTagsForResource", "access denied"));
        }

        Ok(self
            .state
            .tags
            .lock()
            .unwrap()
            .get(&cluster_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn ready_node(cluster_id: &str, node_id: &str, port: i32) -> CacheNode {
    CacheNode {
        cache_node_id: Some(node_id.to_string()),
        customer_availability_zone: Some(format!("{}a", REGION)),
        cache_node_status: Some("available".to_string()),
        endpoint: Some(Endpoint {
            address: Some(format!(
                "{}.{}.abc123.apn2.cache.amazonaws.com",
                cluster_id, node_id
            )),
            port: Some(port),
        }),
    }
}

pub fn unready_node(node_id: &str) -> CacheNode {
    CacheNode {
        cache_node_id: Some(node_id.to_string()),
        customer_availability_zone: Some(format!("{}c", REGION)),
        cache_node_status: Some("creating".to_string()),
        endpoint: None,
    }
}

pub fn cluster(cluster_id: &str, engine: &str, nodes: Vec<CacheNode>) -> CacheCluster {
    CacheCluster {
        cache_cluster_id: Some(cluster_id.to_string()),
        cache_node_type: Some("cache.t4g.medium".to_string()),
        engine: Some(engine.to_string()),
        engine_version: Some("7.1.0".to_string()),
        cache_nodes: nodes,
    }
}

pub fn settings(refresh_interval: Duration) -> DiscoverySettings {
    DiscoverySettings {
        refresh_interval,
        fallback_region: None,
        region_retry: RetryPolicy {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        },
    }
}
