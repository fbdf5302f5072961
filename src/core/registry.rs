use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::core::backend::{Backend, BackendKind, Endpoint};
use crate::core::backends::{MemcacheBackend, MemcachedBackend, RedisBackend};
use crate::error::KvError;

/// At-most-one live backend connection per endpoint. The registry is a
/// plain value owned by the application and handed to each adapter, not a
/// process-wide static.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Endpoint, Arc<dyn Backend>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing handle for the config's endpoint, or construct,
    /// register and return a new one. Connect failures surface as
    /// `ConnectionFailed`; there is no retry.
    pub async fn acquire(&self, config: &StoreConfig) -> Result<Arc<dyn Backend>, KvError> {
        let kind = BackendKind::parse(&config.adapter)?;
        let endpoint = Endpoint::new(kind, &config.host, config.port);

        if let Some(existing) = self.connections.get(&endpoint) {
            debug!("Reusing connection to {}", endpoint);
            return Ok(Arc::clone(&existing));
        }

        let backend: Arc<dyn Backend> = match kind {
            BackendKind::Memcache => Arc::new(MemcacheBackend::connect(config).await?),
            BackendKind::Memcached => Arc::new(MemcachedBackend::connect(config).await?),
            BackendKind::Redis => Arc::new(RedisBackend::connect(config).await?),
        };

        // Two racing first acquires may both construct; the entry keeps
        // exactly one and the loser drops.
        let shared = Arc::clone(
            self.connections
                .entry(endpoint)
                .or_insert(backend)
                .value(),
        );
        Ok(shared)
    }

    /// Install a ready-made backend (custom implementations, tests) under
    /// its own endpoint identity.
    pub fn register(&self, backend: Arc<dyn Backend>) {
        self.connections
            .insert(backend.endpoint().clone(), backend);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close every connection and forget it. The only teardown point; no
    /// per-call release exists.
    pub async fn close_all(&self) {
        let handles: Vec<Arc<dyn Backend>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.connections.clear();

        for backend in handles {
            if let Err(e) = backend.close().await {
                info!("Error closing {}: {}", backend.endpoint(), e);
            }
        }
    }
}
