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

/// Memcached adapter over the binary protocol: CAS tokens on every read,
/// native counters with not-found auto-initialization handled upstream, and
/// the compression capability.
pub struct MemcachedBackend {
    endpoint: Endpoint,
    client: ::memcache::Client,
    metrics: Arc<AtomicStoreMetrics>,
}

impl std::fmt::Debug for MemcachedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedBackend")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl MemcachedBackend {
    pub async fn connect(config: &StoreConfig) -> Result<Self, KvError> {
        let endpoint = Endpoint::new(BackendKind::Memcached, &config.host, config.port);
        let metrics = Arc::new(AtomicStoreMetrics::new(endpoint.to_string()));
        metrics.record_connection_attempt();

        // Binary unless explicitly overridden; auth rides the URL userinfo
        // and requires the binary protocol.
        let protocol = match config.protocol {
            Some(WireProtocol::Ascii) => "ascii",
            _ => "binary",
        };
        let auth = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            _ => String::new(),
        };
        let url = format!(
            "memcache://{}{}:{}?timeout={}&protocol={}",
            auth, config.host, config.port, config.timeout, protocol
        );

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
impl Backend for MemcachedBackend {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_list_push: false,
            native_list_pop: false,
            native_counter: true,
            cas: true,
            compression: true,
        }
    }

    fn metrics(&self) -> Arc<AtomicStoreMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn read(&self, key: &str) -> Result<Option<RawEntry>, KvError> {
        let client = self.client.clone();
        let owned_key = key.to_string();
        // `gets` so every read refreshes the CAS token for `replace`.
        let mut values = blocking(&self.endpoint, move || {
            client.gets::<(Vec<u8>, u32, Option<u64>)>(&[owned_key.as_str()])
        })
        .await?;

        match values.remove(key) {
            Some((payload, _flags, cas_token)) => {
                self.metrics.record_hit();
                Ok(Some(RawEntry { payload, cas_token }))
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
        key: &str,
        payload: Vec<u8>,
        expiration: u32,
        token: u64,
    ) -> Result<bool, KvError> {
        let client = self.client.clone();
        let owned_key = key.to_string();
        let result = tokio::task::spawn_blocking(move || {
            client.cas(&owned_key, payload.as_slice(), expiration, token)
        })
        .await
        .map_err(|e| KvError::Backend {
            endpoint: self.endpoint.to_string(),
            reason: format!("blocking task failed: {}", e),
        })?;

        match result {
            Ok(swapped) => Ok(swapped),
            // The entry changed since the token was read, or vanished.
            Err(::memcache::MemcacheError::CommandError(
                ::memcache::CommandError::KeyExists | ::memcache::CommandError::KeyNotFound,
            )) => Ok(false),
            Err(e) => Err(KvError::Backend {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let client = self.client.clone();
        let key = key.to_string();
        blocking(&self.endpoint, move || client.delete(&key)).await
    }

    async fn counter(&self, key: &str, delta: i64) -> Result<CounterHit, KvError> {
        let client = self.client.clone();
        let owned_key = key.to_string();
        let result = tokio::task::spawn_blocking(move || {
            if delta >= 0 {
                client.increment(&owned_key, delta as u64)
            } else {
                // The native decrement floors at zero; that refusal is the
                // backend's own semantics and is kept.
                client.decrement(&owned_key, delta.unsigned_abs())
            }
        })
        .await
        .map_err(|e| KvError::Backend {
            endpoint: self.endpoint.to_string(),
            reason: format!("blocking task failed: {}", e),
        })?;

        match result {
            Ok(value) => Ok(CounterHit::Applied(value as i64)),
            Err(::memcache::MemcacheError::CommandError(
                ::memcache::CommandError::KeyNotFound,
            )) => Ok(CounterHit::Missing),
            Err(e) => Err(KvError::Backend {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list_push(&self, _key: &str, _payload: Vec<u8>) -> Result<bool, KvError> {
        Err(KvError::Unsupported {
            operation: "list push",
            adapter: "memcached",
        })
    }

    async fn list_pop(&self, _key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Err(KvError::Unsupported {
            operation: "list pop",
            adapter: "memcached",
        })
    }

    async fn close(&self) -> Result<(), KvError> {
        debug!("Releasing {}", self.endpoint);
        Ok(())
    }
}
