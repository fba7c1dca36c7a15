use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DiscoveryError;
use crate::labels::{TargetGroup, build_target_group};
use crate::provider::{CacheCluster, CloudProvider, Inventory};
use crate::resolver::{self, Identity, RetryPolicy};
use crate::tags::TagEnricher;

/// Every target group discovered in one refresh, in inventory order.
pub type Snapshot = Vec<TargetGroup>;

/// Library-level settings for [`Discovery`].
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub refresh_interval: Duration,
    pub fallback_region: Option<String>,
    pub region_retry: RetryPolicy,
}

/// Periodically lists the cache inventory and publishes full snapshots.
pub struct Discovery<P: CloudProvider> {
    provider: P,
    identity: Identity,
    enricher: TagEnricher,
    refresh_interval: Duration,
}

impl<P: CloudProvider> Discovery<P> {
    /// Resolves account and region, then returns a service ready to [`run`](Self::run).
    pub async fn new(
        provider: P,
        settings: DiscoverySettings,
        cancel: &CancellationToken,
    ) -> Result<Self, DiscoveryError> {
        let identity = resolver::resolve(
            &provider,
            settings.fallback_region.as_deref(),
            &settings.region_retry,
            cancel,
        )
        .await?;

        Ok(Self {
            provider,
            enricher: TagEnricher::new(identity.clone()),
            identity,
            refresh_interval: settings.refresh_interval,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Runs until `cancel` fires or the snapshot receiver is dropped.
    ///
    /// A failed refresh publishes nothing; the whole refresh is retried one
    /// interval later.
    pub async fn run(self, tx: mpsc::Sender<Snapshot>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            account_id = %self.identity.account_id,
            region = %self.identity.region,
            refresh_interval_seconds = self.refresh_interval.as_secs(),
            "Starting discovery loop"
        );

        let mut tick_count = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tick_count += 1;
            debug!(tick = tick_count, "Starting discovery refresh");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.refresh() => result,
            };

            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!(
                        error = %e,
                        tick = tick_count,
                        retry_in_seconds = self.refresh_interval.as_secs(),
                        "Discovery refresh failed, no snapshot published"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.refresh_interval) => {}
                    }
                    ticker.reset_immediately();
                    continue;
                }
            };

            let target_count = snapshot.len();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(snapshot) => {
                    if sent.is_err() {
                        warn!("Snapshot receiver closed, stopping discovery loop");
                        return;
                    }
                }
            }

            debug!(
                tick = tick_count,
                target_groups = target_count,
                "Published snapshot"
            );
        }

        info!(ticks = tick_count, "Discovery loop cancelled");
    }

    /// Walks every inventory page and builds one snapshot.
    pub async fn refresh(&self) -> Result<Snapshot, DiscoveryError> {
        let started = Instant::now();

        let inventory = self
            .provider
            .inventory(&self.identity.region)
            .await
            .map_err(DiscoveryError::InventoryClient)?;

        let mut snapshot = Snapshot::new();
        let mut marker = None;
        let mut pages = 0usize;
        let mut clusters = 0usize;

        loop {
            let page = inventory
                .describe_cache_clusters(marker.take())
                .await
                .map_err(DiscoveryError::Inventory)?;
            pages += 1;
            clusters += page.clusters.len();

            for cluster in &page.clusters {
                self.collect_cluster(&inventory, cluster, &mut snapshot)
                    .await?;
            }

            match page.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        info!(
            region = %self.identity.region,
            pages = pages,
            clusters = clusters,
            target_groups = snapshot.len(),
            scan_duration_seconds = format!("{:.2}", started.elapsed().as_secs_f64()),
            "Completed ElastiCache inventory scan"
        );

        Ok(snapshot)
    }

    async fn collect_cluster(
        &self,
        inventory: &P::Inventory,
        cluster: &CacheCluster,
        snapshot: &mut Snapshot,
    ) -> Result<(), DiscoveryError> {
        if !cluster.has_ready_nodes() {
            debug!(
                cluster_id = cluster.cache_cluster_id.as_deref().unwrap_or("unknown"),
                "Cluster has no ready nodes, skipping"
            );
            return Ok(());
        }

        let tags = self.cluster_tags(inventory, cluster).await;

        for node in &cluster.cache_nodes {
            match build_target_group(cluster, node, &tags)? {
                Some(group) => snapshot.push(group),
                None => debug!(
                    cluster_id = cluster.cache_cluster_id.as_deref().unwrap_or("unknown"),
                    node_id = node.cache_node_id.as_deref().unwrap_or("unknown"),
                    "Cache node has no endpoint yet, skipping"
                ),
            }
        }

        Ok(())
    }

    /// Tag lookup failures leave the cluster unenriched instead of failing the refresh.
    async fn cluster_tags(
        &self,
        inventory: &P::Inventory,
        cluster: &CacheCluster,
    ) -> BTreeMap<String, String> {
        let Some(cluster_id) = cluster.cache_cluster_id.as_deref() else {
            return BTreeMap::new();
        };

        match self.enricher.fetch_tags(inventory, cluster_id).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(
                    cluster_id = %cluster_id,
                    error = %e,
                    "Could not list tags for ElastiCache cluster, continuing without tags"
                );
                BTreeMap::new()
            }
        }
    }
}
