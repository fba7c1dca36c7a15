//! Label model for discovered cache nodes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::DiscoveryError;
use crate::provider::{CacheCluster, CacheNode};

pub type LabelSet = BTreeMap<String, String>;

pub const ADDRESS_LABEL: &str = "__address__";

pub const LABEL_AVAILABILITY_ZONE: &str = "__meta_elasticache_availability_zone";
pub const LABEL_CLUSTER_ID: &str = "__meta_elasticache_cluster_id";
pub const LABEL_NODE_ID: &str = "__meta_elasticache_node_id";
pub const LABEL_INSTANCE_STATE: &str = "__meta_elasticache_instance_state";
pub const LABEL_INSTANCE_TYPE: &str = "__meta_elasticache_instance_type";
pub const LABEL_ENGINE: &str = "__meta_elasticache_engine";
pub const LABEL_ENGINE_VERSION: &str = "__meta_elasticache_engine_version";
pub const LABEL_ENDPOINT_ADDRESS: &str = "__meta_elasticache_endpoint_address";
pub const LABEL_ENDPOINT_PORT: &str = "__meta_elasticache_endpoint_port";
pub const LABEL_TAG_PREFIX: &str = "__meta_elasticache_tag_";

/// One discovered cache node and its labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroup {
    pub source: String,
    pub targets: Vec<LabelSet>,
    pub labels: LabelSet,
}

/// Joins host and port, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: i32) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn required<'a>(
    value: Option<&'a str>,
    field: &'static str,
    cluster_id: &str,
) -> Result<&'a str, DiscoveryError> {
    value.ok_or_else(|| DiscoveryError::MissingField {
        field,
        cluster_id: cluster_id.to_string(),
    })
}

/// Builds the label set for `node`.
///
/// Returns `Ok(None)` while the node has no endpoint address yet. Any other
/// missing field is a [`DiscoveryError::MissingField`].
pub fn build_labels(
    cluster: &CacheCluster,
    node: &CacheNode,
) -> Result<Option<LabelSet>, DiscoveryError> {
    let Some(address) = node.address() else {
        return Ok(None);
    };

    let cluster_id = required(cluster.cache_cluster_id.as_deref(), "CacheClusterId", "<unknown>")?;
    let node_id = required(node.cache_node_id.as_deref(), "CacheNodeId", cluster_id)?;
    let az = required(
        node.customer_availability_zone.as_deref(),
        "CustomerAvailabilityZone",
        cluster_id,
    )?;
    let status = required(node.cache_node_status.as_deref(), "CacheNodeStatus", cluster_id)?;
    let node_type = required(cluster.cache_node_type.as_deref(), "CacheNodeType", cluster_id)?;
    let engine = required(cluster.engine.as_deref(), "Engine", cluster_id)?;
    let engine_version = required(cluster.engine_version.as_deref(), "EngineVersion", cluster_id)?;
    let port = node
        .endpoint
        .as_ref()
        .and_then(|e| e.port)
        .ok_or_else(|| DiscoveryError::MissingField {
            field: "Endpoint.Port",
            cluster_id: cluster_id.to_string(),
        })?;

    let labels = LabelSet::from([
        (LABEL_CLUSTER_ID.to_string(), cluster_id.to_string()),
        (LABEL_NODE_ID.to_string(), node_id.to_string()),
        (LABEL_AVAILABILITY_ZONE.to_string(), az.to_string()),
        (LABEL_INSTANCE_STATE.to_string(), status.to_string()),
        (LABEL_INSTANCE_TYPE.to_string(), node_type.to_string()),
        (LABEL_ENGINE.to_string(), engine.to_string()),
        (LABEL_ENGINE_VERSION.to_string(), engine_version.to_string()),
        (ADDRESS_LABEL.to_string(), join_host_port(address, port)),
        (LABEL_ENDPOINT_ADDRESS.to_string(), address.to_string()),
        (LABEL_ENDPOINT_PORT.to_string(), port.to_string()),
    ]);

    Ok(Some(labels))
}

/// Builds the target group for `node`, merging the cluster's sanitized tags.
pub fn build_target_group(
    cluster: &CacheCluster,
    node: &CacheNode,
    tags: &BTreeMap<String, String>,
) -> Result<Option<TargetGroup>, DiscoveryError> {
    let Some(mut labels) = build_labels(cluster, node)? else {
        return Ok(None);
    };

    for (name, value) in tags {
        labels.insert(format!("{}{}", LABEL_TAG_PREFIX, name), value.clone());
    }

    let address = labels[ADDRESS_LABEL].clone();
    let source = format!("{}{}", labels[LABEL_CLUSTER_ID], labels[LABEL_NODE_ID]);

    Ok(Some(TargetGroup {
        source,
        targets: vec![LabelSet::from([(ADDRESS_LABEL.to_string(), address)])],
        labels,
    }))
}
