#![allow(dead_code)] // each test binary uses a different slice of the mock

use async_trait::async_trait;
use kvbridge::core::{
    AtomicStoreMetrics, Backend, BackendKind, Capabilities, CounterHit, Endpoint, RawEntry,
};
use kvbridge::error::KvError;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Upcast a concrete mock into the trait-object handle the adapters hold.
pub fn backend_handle(backend: &Arc<MockBackend>) -> Arc<dyn Backend> {
    let handle: Arc<dyn Backend> = backend.clone();
    handle
}

/// In-memory backend with togglable capability flags. Records every
/// primitive call so tests can assert which path the emulator took and
/// which composed keys reached the backend.
#[derive(Debug)]
pub struct MockBackend {
    endpoint: Endpoint,
    capabilities: Capabilities,
    metrics: Arc<AtomicStoreMetrics>,
    entries: Mutex<HashMap<String, Vec<u8>>>,
    cas_versions: Mutex<HashMap<String, u64>>,
    native_lists: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    fn with_capabilities(kind: BackendKind, capabilities: Capabilities) -> Self {
        let endpoint = Endpoint::new(kind, "127.0.0.1", 11211);
        let metrics = Arc::new(AtomicStoreMetrics::new(endpoint.to_string()));
        Self {
            endpoint,
            capabilities,
            metrics,
            entries: Mutex::new(HashMap::new()),
            cas_versions: Mutex::new(HashMap::new()),
            native_lists: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// No native anything: every composite operation must be emulated.
    pub fn plain() -> Self {
        Self::with_capabilities(BackendKind::Memcache, Capabilities::default())
    }

    /// Memcached-shaped: CAS tokens, native counters that report missing
    /// keys, compression capability.
    pub fn with_cas() -> Self {
        Self::with_capabilities(
            BackendKind::Memcached,
            Capabilities {
                native_counter: true,
                cas: true,
                compression: true,
                ..Capabilities::default()
            },
        )
    }

    /// Redis-shaped: native lists and counters, no CAS.
    pub fn with_native_lists() -> Self {
        Self::with_capabilities(
            BackendKind::Redis,
            Capabilities {
                native_list_push: true,
                native_list_pop: true,
                native_counter: true,
                ..Capabilities::default()
            },
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn has_native_list(&self, key: &str) -> bool {
        self.native_lists.lock().unwrap().contains_key(key)
    }

    fn record(&self, op: &str, key: &str) {
        self.calls.lock().unwrap().push(format!("{op} {key}"));
    }

    fn bump_version(&self, key: &str) -> u64 {
        let mut versions = self.cas_versions.lock().unwrap();
        let version = versions.entry(key.to_string()).or_insert(0);
        *version += 1;
        *version
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn metrics(&self) -> Arc<AtomicStoreMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn read(&self, key: &str) -> Result<Option<RawEntry>, KvError> {
        self.record("read", key);
        // A native list shadows the plain entry space, as it does on redis.
        if let Some(elements) = self.native_lists.lock().unwrap().get(key) {
            let container: kvbridge::core::Container = elements
                .iter()
                .map(|raw| {
                    serde_json::from_slice(raw)
                        .unwrap_or_else(|_| Json::String(String::from_utf8_lossy(raw).into_owned()))
                })
                .collect();
            return Ok(Some(RawEntry {
                payload: serde_json::to_vec(&container).unwrap(),
                cas_token: None,
            }));
        }

        let payload = self.entries.lock().unwrap().get(key).cloned();
        Ok(payload.map(|payload| {
            let cas_token = if self.capabilities.cas {
                self.cas_versions.lock().unwrap().get(key).copied()
            } else {
                None
            };
            RawEntry { payload, cas_token }
        }))
    }

    async fn write(&self, key: &str, payload: Vec<u8>, _expiration: u32) -> Result<bool, KvError> {
        self.record("write", key);
        // Writing a plain payload replaces any native list, like SET does.
        self.native_lists.lock().unwrap().remove(key);
        self.entries.lock().unwrap().insert(key.to_string(), payload);
        self.bump_version(key);
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        payload: Vec<u8>,
        _expiration: u32,
        token: u64,
    ) -> Result<bool, KvError> {
        self.record("cas", key);
        if !self.capabilities.cas {
            return Err(KvError::Unsupported {
                operation: "replace",
                adapter: "mock",
            });
        }
        let current = self.cas_versions.lock().unwrap().get(key).copied();
        if current != Some(token) {
            return Ok(false);
        }
        self.entries.lock().unwrap().insert(key.to_string(), payload);
        self.bump_version(key);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.record("delete", key);
        let had_entry = self.entries.lock().unwrap().remove(key).is_some();
        let had_list = self.native_lists.lock().unwrap().remove(key).is_some();
        self.cas_versions.lock().unwrap().remove(key);
        Ok(had_entry || had_list)
    }

    async fn counter(&self, key: &str, delta: i64) -> Result<CounterHit, KvError> {
        self.record("counter", key);
        if !self.capabilities.native_counter {
            return Err(KvError::Unsupported {
                operation: "counter",
                adapter: "mock",
            });
        }
        let current = match self.entries.lock().unwrap().get(key) {
            Some(payload) => serde_json::from_slice::<Json>(payload)
                .ok()
                .and_then(|json| json.as_i64())
                .ok_or_else(|| KvError::Backend {
                    endpoint: self.endpoint.to_string(),
                    reason: format!("value at '{key}' is not a counter"),
                })?,
            None => return Ok(CounterHit::Missing),
        };
        let next = current + delta;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), next.to_string().into_bytes());
        self.bump_version(key);
        Ok(CounterHit::Applied(next))
    }

    async fn list_push(&self, key: &str, payload: Vec<u8>) -> Result<bool, KvError> {
        self.record("list_push", key);
        if !self.capabilities.native_list_push {
            return Err(KvError::Unsupported {
                operation: "list push",
                adapter: "mock",
            });
        }
        // A plain payload under the key refuses the push, like WRONGTYPE.
        if self.entries.lock().unwrap().contains_key(key) {
            return Ok(false);
        }
        self.native_lists
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(payload);
        Ok(true)
    }

    async fn list_pop(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.record("list_pop", key);
        if !self.capabilities.native_list_pop {
            return Err(KvError::Unsupported {
                operation: "list pop",
                adapter: "mock",
            });
        }
        let mut lists = self.native_lists.lock().unwrap();
        let Some(elements) = lists.get_mut(key) else {
            return Ok(None);
        };
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(elements.remove(0)))
    }

    async fn close(&self) -> Result<(), KvError> {
        self.record("close", "-");
        Ok(())
    }
}
