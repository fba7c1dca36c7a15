use thiserror::Error;

/// Failures reported by a cloud provider adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    #[error("Instance metadata service unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Failed to load provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to resolve caller account identity: {0}")]
    Identity(#[source] ProviderError),

    #[error("Region could not be resolved after {attempts} attempts")]
    RegionUnresolved { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed to prepare cache inventory client: {0}")]
    InventoryClient(#[source] ProviderError),

    #[error("Failed to list cache cluster inventory: {0}")]
    Inventory(#[source] ProviderError),

    #[error("Cache cluster {cluster_id} is missing required field {field}")]
    MissingField {
        field: &'static str,
        cluster_id: String,
    },
}
