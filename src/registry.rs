//! Client registry
//!
//! Process-wide map from correlation id to provider client instance.
//! Backed by a Moka cache so entries expire after sitting idle and the
//! instance count stays bounded, instead of growing for the process
//! lifetime. The factory is injected, which keeps the registry usable
//! with scripted clients in tests.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::auth::CorrelationId;
use crate::config::RegistryConfig;
use crate::error::{AppError, Result};
use crate::provider::{ClientFactory, ProviderClient};

/// Concurrent store of live client instances keyed by correlation id
pub struct ClientRegistry {
    clients: Cache<CorrelationId, Arc<dyn ProviderClient>>,
    factory: Arc<dyn ClientFactory>,
}

impl ClientRegistry {
    /// Create a registry with the configured capacity and idle TTL
    pub fn new(settings: &RegistryConfig, factory: Arc<dyn ClientFactory>) -> Self {
        let clients = Cache::builder()
            .max_capacity(settings.max_clients)
            .time_to_idle(Duration::from_secs(settings.client_ttl))
            .build();

        Self { clients, factory }
    }

    /// Return the instance for `id`, creating one on first use
    ///
    /// Initialization is atomic per key: concurrent requests for the
    /// same correlation id all observe a single instance.
    pub async fn get_or_create(&self, id: &CorrelationId) -> Arc<dyn ProviderClient> {
        let entry = self
            .clients
            .entry(id.clone())
            .or_insert_with(async { self.factory.create() })
            .await;

        use crate::metrics::{REGISTRY_CLIENTS, REGISTRY_HITS_TOTAL, REGISTRY_MISSES_TOTAL};
        if entry.is_fresh() {
            REGISTRY_MISSES_TOTAL
                .with_label_values(&["get_or_create"])
                .inc();
            tracing::debug!(correlation_id = %id, "Created client instance");
        } else {
            REGISTRY_HITS_TOTAL
                .with_label_values(&["get_or_create"])
                .inc();
        }
        REGISTRY_CLIENTS.set(self.clients.entry_count() as i64);

        entry.into_value()
    }

    /// Return the existing instance for `id`
    ///
    /// Used by the callback path, which must never create an instance:
    /// an unknown or expired id is surfaced as a NotFound-style error.
    pub async fn get(&self, id: &CorrelationId) -> Result<Arc<dyn ProviderClient>> {
        use crate::metrics::{REGISTRY_HITS_TOTAL, REGISTRY_MISSES_TOTAL};

        match self.clients.get(id).await {
            Some(client) => {
                REGISTRY_HITS_TOTAL.with_label_values(&["get"]).inc();
                Ok(client)
            }
            None => {
                REGISTRY_MISSES_TOTAL.with_label_values(&["get"]).inc();
                Err(AppError::UnknownCorrelation)
            }
        }
    }

    /// Current number of live instances (approximate until pending
    /// cache maintenance runs)
    pub fn len(&self) -> u64 {
        self.clients.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
