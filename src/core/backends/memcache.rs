use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{StoreConfig, WireProtocol};
use crate::core::backend::{
    Backend, BackendKind, Capabilities, CounterHit, Endpoint, RawEntry,
};
use crate::core::backends::blocking;
use crate::core::metrics::{AtomicStoreMetrics, StoreMetrics};
use crate::error::KvError;

/// Plain memcache adapter over the ASCII protocol. No CAS, no compression;
/// counters are left to the read-modify-write emulation, so increments on
/// this adapter go through the documented integer-coercion path.
pub struct MemcacheBackend {
    endpoint: Endpoint,
    client: ::memcache::Client,
    metrics: Arc<AtomicStoreMetrics>,
}

impl std::fmt::Debug for MemcacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheBackend")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl MemcacheBackend {
    pub async fn connect(config: &StoreConfig) -> Result<Self, KvError> {
        let endpoint = Endpoint::new(BackendKind::Memcache, &config.host, config.port);
        let metrics = Arc::new(AtomicStoreMetrics::new(endpoint.to_string()));
        metrics.record_connection_attempt();

        // ASCII unless explicitly overridden.
        let protocol = match config.protocol {
            Some(WireProtocol::Binary) => "binary",
            _ => "ascii",
        };
        let url = format!(
            "memcache://{}:{}?timeout={}&protocol={}",
            config.host, config.port, config.timeout, protocol
        );
        if config.persistent {
            debug!("'persistent' requested for {}; connections are persistent by default", endpoint);
        }

        let timeout = Duration::from_secs(config.timeout);
        let client = tokio::task::spawn_blocking(move || {
            let client = ::memcache::Client::connect(url.as_str())?;
            client.set_read_timeout(Some(timeout))?;
            client.set_write_timeout(Some(timeout))?;
            Ok::<_, ::memcache::MemcacheError>(client)
        })
        .await
        .map_err(|e| KvError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: format!("blocking task failed: {}", e),
        })?
        .map_err(|e| {
            metrics.record_connection_failure();
            KvError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!("Connected to {}", endpoint);
        Ok(Self {
            endpoint,
            client,
            metrics,
        })
    }
}

#[async_trait]
impl Backend for MemcacheBackend {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn metrics(&self) -> Arc<AtomicStoreMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn read(&self, key: &str) -> Result<Option<RawEntry>, KvError> {
        let client = self.client.clone();
        let key = key.to_string();
        let payload =
            blocking(&self.endpoint, move || client.get::<Vec<u8>>(&key)).await?;
        match payload {
            Some(payload) => {
                self.metrics.record_hit();
                Ok(Some(RawEntry {
                    payload,
                    cas_token: None,
                }))
            }
            None => {
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &str, payload: Vec<u8>, expiration: u32) -> Result<bool, KvError> {
        let client = self.client.clone();
        let key = key.to_string();
        blocking(&self.endpoint, move || {
            client.set(&key, payload.as_slice(), expiration)
        })
        .await?;
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _payload: Vec<u8>,
        _expiration: u32,
        _token: u64,
    ) -> Result<bool, KvError> {
        Err(KvError::Unsupported {
            operation: "replace",
            adapter: "memcache",
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let client = self.client.clone();
        let key = key.to_string();
        blocking(&self.endpoint, move || client.delete(&key)).await
    }

    async fn counter(&self, _key: &str, _delta: i64) -> Result<CounterHit, KvError> {
        Err(KvError::Unsupported {
            operation: "counter",
            adapter: "memcache",
        })
    }

    async fn list_push(&self, _key: &str, _payload: Vec<u8>) -> Result<bool, KvError> {
        Err(KvError::Unsupported {
            operation: "list push",
            adapter: "memcache",
        })
    }

    async fn list_pop(&self, _key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Err(KvError::Unsupported {
            operation: "list pop",
            adapter: "memcache",
        })
    }

    async fn close(&self) -> Result<(), KvError> {
        debug!("Releasing {}", self.endpoint);
        Ok(())
    }
}
