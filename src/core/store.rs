use serde_json::Value as Json;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::config::StoreConfig;
use crate::core::backend::{Backend, CounterHit};
use crate::core::namespace::{KeyCase, KeyNamespace};
use crate::core::operation::{ResolvedArgs, Response, Verb};
use crate::core::registry::ConnectionRegistry;
use crate::core::value::{coerce_i64, Container, Value};
use crate::error::KvError;

/// The adapter front: routes verb + key-name calls onto the backend,
/// composes storage keys, and emulates the composite operations where the
/// backend has no native equivalent.
pub struct KeyValueStore {
    backend: Arc<dyn Backend>,
    namespace: KeyNamespace,
    key_case: KeyCase,
    allowed_keys: HashSet<String>,
    append_counter_suffix: Option<String>,
    compress: bool,
    /// Last CAS token read per composed key; overwritten by each get,
    /// cleared by drop, required by replace.
    cas_tokens: Mutex<HashMap<String, u64>>,
    compression_warned: AtomicBool,
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("endpoint", &self.backend.endpoint())
            .field("namespace", &self.namespace)
            .field("key_case", &self.key_case)
            .field("allowed_keys", &self.allowed_keys)
            .field("append_counter_suffix", &self.append_counter_suffix)
            .field("compress", &self.compress)
            .field("cas_tokens", &self.cas_tokens)
            .field("compression_warned", &self.compression_warned)
            .finish()
    }
}

impl KeyValueStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            namespace: KeyNamespace::new(),
            key_case: KeyCase::Preserve,
            allowed_keys: HashSet::new(),
            append_counter_suffix: None,
            compress: false,
            cas_tokens: Mutex::new(HashMap::new()),
            compression_warned: AtomicBool::new(false),
        }
    }

    pub fn from_config(backend: Arc<dyn Backend>, config: &StoreConfig) -> Self {
        let mut store = Self::new(backend);
        store.namespace = config.namespace.clone();
        store.key_case = config.key_case;
        store.allowed_keys = config.allowed_keys.iter().cloned().collect();
        store.append_counter_suffix = config.append_counter_suffix.clone();
        store.compress = config.compress;
        store
    }

    /// Resolve the configured adapter, acquire the shared connection for
    /// its endpoint and build the adapter around it.
    pub async fn factory(
        registry: &ConnectionRegistry,
        config: &StoreConfig,
    ) -> Result<Self, KvError> {
        let backend = registry.acquire(config).await?;
        Ok(Self::from_config(backend, config))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut KeyNamespace {
        &mut self.namespace
    }

    pub fn allow_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.allowed_keys.insert(key.into());
        self
    }

    pub fn set_allowed_keys(&mut self, keys: impl IntoIterator<Item = String>) -> &mut Self {
        self.allowed_keys = keys.into_iter().collect();
        self
    }

    pub fn set_key_case(&mut self, case: KeyCase) -> &mut Self {
        self.key_case = case;
        self
    }

    pub fn set_compress(&mut self, compress: bool) -> &mut Self {
        self.compress = compress;
        self
    }

    pub fn set_append_counter_suffix(&mut self, suffix: Option<String>) -> &mut Self {
        self.append_counter_suffix = suffix;
        self
    }

    /// Dynamic entry point: `call("setCart", args)` routes exactly like the
    /// typed methods below.
    pub async fn call(&self, method: &str, args: Vec<Json>) -> Result<Response, KvError> {
        let (verb, key_name) = Verb::split_method(method)?;
        let args = ResolvedArgs::convert(verb, args);
        let key = self.resolve_key(key_name)?;
        let metrics = self.backend.metrics();
        metrics.measure(self.dispatch(verb, &key, args)).await
    }

    /// Case folding, then the allow-list, then composition.
    fn resolve_key(&self, name: &str) -> Result<String, KvError> {
        let folded = self.key_case.apply(name);
        if !self.allowed_keys.is_empty() && !self.allowed_keys.contains(&folded) {
            return Err(KvError::KeyNotAllowed { key: folded });
        }
        Ok(self.namespace.compose(&folded))
    }

    async fn dispatch(
        &self,
        verb: Verb,
        key: &str,
        args: ResolvedArgs,
    ) -> Result<Response, KvError> {
        match verb {
            Verb::Set => {
                let value = Value::from_json(args.value(verb)?);
                self.set_base(key, &value, args.expiration())
                    .await
                    .map(Response::Stored)
            }
            Verb::Get => match args.optional_index() {
                None => self.get_base(key).await.map(Response::Value),
                Some(index) => self.get_element(key, index).await.map(Response::Element),
            },
            Verb::Append => {
                let element = args.value(verb)?;
                self.append_base(key, element, args.expiration())
                    .await
                    .map(Response::Stored)
            }
            Verb::Remove => self
                .remove_base(key, args.index(verb)?)
                .await
                .map(Response::Stored),
            Verb::Pull => self
                .pull_base(key, args.index(verb)?)
                .await
                .map(Response::Element),
            Verb::Replace => {
                let value = Value::from_json(args.value(verb)?);
                self.replace_base(key, &value, args.expiration())
                    .await
                    .map(Response::Stored)
            }
            Verb::Fetch => self
                .fetch_base(key, args.count(verb)?, args.offset_or(0))
                .await
                .map(Response::Slice),
            Verb::FetchAll => self.get_base(key).await.map(Response::Value),
            Verb::Increment => self
                .counter_base(key, args.offset_or(1))
                .await
                .map(Response::Counter),
            Verb::Decrement => self
                .counter_base(key, args.offset_or(1).wrapping_neg())
                .await
                .map(Response::Counter),
            Verb::Drop => self.drop_base(key).await.map(Response::Dropped),
        }
    }

    // ---- typed surface -------------------------------------------------

    pub async fn set(
        &self,
        name: &str,
        value: impl Into<Value>,
        expiration: u32,
    ) -> Result<bool, KvError> {
        let key = self.resolve_key(name)?;
        let value = value.into();
        self.measured(self.set_base(&key, &value, expiration)).await
    }

    pub async fn get(&self, name: &str) -> Result<Value, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.get_base(&key)).await
    }

    /// Get a single element out of a container value.
    pub async fn get_index(&self, name: &str, index: u64) -> Result<Json, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.get_element(&key, index)).await
    }

    pub async fn append(
        &self,
        name: &str,
        element: Json,
        expiration: u32,
    ) -> Result<bool, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.append_base(&key, element, expiration))
            .await
    }

    pub async fn remove(&self, name: &str, index: u64) -> Result<bool, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.remove_base(&key, index)).await
    }

    pub async fn pull(&self, name: &str, index: u64) -> Result<Json, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.pull_base(&key, index)).await
    }

    pub async fn replace(
        &self,
        name: &str,
        value: impl Into<Value>,
        expiration: u32,
    ) -> Result<bool, KvError> {
        let key = self.resolve_key(name)?;
        let value = value.into();
        self.measured(self.replace_base(&key, &value, expiration))
            .await
    }

    pub async fn fetch(&self, name: &str, count: i64, offset: i64) -> Result<Container, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.fetch_base(&key, count, offset)).await
    }

    pub async fn fetch_all(&self, name: &str) -> Result<Value, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.get_base(&key)).await
    }

    pub async fn increment(&self, name: &str, offset: i64) -> Result<i64, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.counter_base(&key, offset)).await
    }

    pub async fn decrement(&self, name: &str, offset: i64) -> Result<i64, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.counter_base(&key, offset.wrapping_neg()))
            .await
    }

    pub async fn drop_key(&self, name: &str) -> Result<bool, KvError> {
        let key = self.resolve_key(name)?;
        self.measured(self.drop_base(&key)).await
    }

    async fn measured<T>(
        &self,
        operation: impl std::future::Future<Output = Result<T, KvError>>,
    ) -> Result<T, KvError> {
        let metrics = self.backend.metrics();
        metrics.measure(operation).await
    }

    // ---- base operations on composed keys ------------------------------

    async fn set_base(&self, key: &str, value: &Value, expiration: u32) -> Result<bool, KvError> {
        let payload = self.encode(value);
        self.backend.write(key, payload, expiration).await
    }

    async fn get_base(&self, key: &str) -> Result<Value, KvError> {
        let entry = self
            .backend
            .read(key)
            .await?
            .ok_or_else(|| KvError::KeyNotFound {
                key: key.to_string(),
            })?;
        if let Some(token) = entry.cas_token {
            if let Ok(mut tokens) = self.cas_tokens.lock() {
                tokens.insert(key.to_string(), token);
            }
        }
        self.decode(key, &entry.payload)
    }

    async fn get_element(&self, key: &str, index: u64) -> Result<Json, KvError> {
        let value = self.get_base(key).await?;
        let container = value
            .as_container()
            .ok_or_else(|| KvError::TypeMismatch {
                key: key.to_string(),
            })?;
        container
            .get(index)
            .cloned()
            .ok_or_else(|| KvError::IndexNotFound {
                key: key.to_string(),
                index,
            })
    }

    async fn append_base(
        &self,
        key: &str,
        element: Json,
        expiration: u32,
    ) -> Result<bool, KvError> {
        if self.backend.capabilities().native_list_push {
            let payload = serde_json::to_vec(&element).unwrap_or_default();
            if self.backend.list_push(key, payload).await? {
                return Ok(true);
            }
            // Refused (the key holds a plain payload); emulate below.
        }

        let current = match self.get_base(key).await {
            Ok(value) => value,
            Err(KvError::KeyNotFound { .. }) => Value::Container(Container::new()),
            Err(e) => return Err(e),
        };
        let mut container = self.require_container(key, current)?;

        let index = match &self.append_counter_suffix {
            Some(suffix) => {
                let counter_key = format!("{}{}", key, suffix);
                let assigned = self.counter_base(&counter_key, 1).await?;
                u64::try_from(assigned).map_err(|_| KvError::AppendKeyFailed {
                    key: key.to_string(),
                })?
            }
            None => container.next_index(),
        };

        container.insert(index, element);
        self.set_base(key, &Value::Container(container), expiration)
            .await
    }

    async fn remove_base(&self, key: &str, index: u64) -> Result<bool, KvError> {
        let value = self.get_base(key).await?;
        let mut container = self.require_container(key, value)?;
        if container.remove(index).is_none() {
            return Err(KvError::IndexNotFound {
                key: key.to_string(),
                index,
            });
        }
        // Write-back carries no expiration.
        self.set_base(key, &Value::Container(container), 0).await
    }

    async fn pull_base(&self, key: &str, index: u64) -> Result<Json, KvError> {
        // Native pop removes the head, so it only serves a pull of the
        // head position; any other index goes through the emulation.
        if self.backend.capabilities().native_list_pop && index == 0 {
            if let Some(raw) = self.backend.list_pop(key).await? {
                return Ok(serde_json::from_slice(&raw)
                    .unwrap_or_else(|_| Json::String(String::from_utf8_lossy(&raw).into_owned())));
            }
        }

        let value = self.get_base(key).await?;
        let mut container = self.require_container(key, value)?;
        let element = container
            .remove(index)
            .ok_or_else(|| KvError::IndexNotFound {
                key: key.to_string(),
                index,
            })?;
        if !self
            .set_base(key, &Value::Container(container), 0)
            .await?
        {
            return Err(KvError::SetFailed {
                key: key.to_string(),
            });
        }
        Ok(element)
    }

    async fn fetch_base(&self, key: &str, count: i64, offset: i64) -> Result<Container, KvError> {
        let count = if count < 0 { 1 } else { count } as usize;
        let offset = offset.max(0) as usize;
        let value = self.get_base(key).await?;
        let container = self.require_container(key, value)?;
        Ok(container.slice(offset, count))
    }

    async fn counter_base(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        if self.backend.capabilities().native_counter {
            return match self.backend.counter(key, delta).await? {
                CounterHit::Applied(value) => Ok(value),
                CounterHit::Missing => {
                    // Auto-initialize to the signed offset, no expiration.
                    let value = Value::Scalar(Json::from(delta));
                    self.backend.write(key, value.to_payload(), 0).await?;
                    Ok(delta)
                }
            };
        }

        // Read-modify-write fallback. The i64 coercion can wrap or invert
        // sign on overflow; preserved behavior, see coerce_i64.
        let current = match self.get_base(key).await {
            Ok(value) => coerce_i64(&value),
            Err(KvError::KeyNotFound { .. }) => 0,
            Err(e) => return Err(e),
        };
        let next = current.wrapping_add(delta);
        let value = Value::Scalar(Json::from(next));
        self.backend.write(key, value.to_payload(), 0).await?;
        Ok(next)
    }

    async fn replace_base(
        &self,
        key: &str,
        value: &Value,
        expiration: u32,
    ) -> Result<bool, KvError> {
        if !self.backend.capabilities().cas {
            return Err(KvError::Unsupported {
                operation: "replace",
                adapter: self.backend.endpoint().kind.scheme(),
            });
        }
        let token = self
            .cas_tokens
            .lock()
            .ok()
            .and_then(|tokens| tokens.get(key).copied())
            .ok_or_else(|| KvError::ReplaceWithoutRead {
                key: key.to_string(),
            })?;
        let payload = self.encode(value);
        self.backend
            .compare_and_swap(key, payload, expiration, token)
            .await
    }

    async fn drop_base(&self, key: &str) -> Result<bool, KvError> {
        let removed = self.backend.delete(key).await?;
        if let Ok(mut tokens) = self.cas_tokens.lock() {
            tokens.remove(key);
        }
        Ok(removed)
    }

    fn require_container(&self, key: &str, value: Value) -> Result<Container, KvError> {
        match value {
            Value::Container(container) => Ok(container),
            Value::Scalar(Json::Null) => Ok(Container::new()),
            Value::Scalar(_) => Err(KvError::TypeMismatch {
                key: key.to_string(),
            }),
        }
    }

    // ---- payload codec -------------------------------------------------

    fn encode(&self, value: &Value) -> Vec<u8> {
        let payload = value.to_payload();
        if !self.compress {
            return payload;
        }
        if !self.backend.capabilities().compression {
            self.warn_compression_skipped("the backend does not offer compression");
            return payload;
        }
        #[cfg(feature = "compression")]
        return deflate(&payload);
        #[cfg(not(feature = "compression"))]
        {
            self.warn_compression_skipped("the 'compression' feature is not compiled in");
            payload
        }
    }

    fn decode(&self, key: &str, payload: &[u8]) -> Result<Value, KvError> {
        let raw = maybe_inflate(payload);
        Value::from_payload(&raw).map_err(|e| KvError::Backend {
            endpoint: self.backend.endpoint().to_string(),
            reason: format!("undecodable payload for key '{}': {}", key, e),
        })
    }

    fn warn_compression_skipped(&self, reason: &str) {
        if !self.compression_warned.swap(true, Ordering::Relaxed) {
            warn!(
                "Compression requested for {} but skipped: {}",
                self.backend.endpoint(),
                reason
            );
        }
    }
}

/// zlib streams start with 0x78; no JSON document can, so the marker alone
/// decides whether a stored payload needs inflating.
fn maybe_inflate(payload: &[u8]) -> Cow<'_, [u8]> {
    #[cfg(feature = "compression")]
    if payload.first() == Some(&0x78) {
        if let Some(inflated) = inflate(payload) {
            return Cow::Owned(inflated);
        }
    }
    Cow::Borrowed(payload)
}

#[cfg(feature = "compression")]
fn deflate(payload: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(payload).is_err() {
        return payload.to_vec();
    }
    encoder.finish().unwrap_or_else(|_| payload.to_vec())
}

#[cfg(feature = "compression")]
fn inflate(payload: &[u8]) -> Option<Vec<u8>> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut decoder = ZlibDecoder::new(payload);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated).ok()?;
    Some(inflated)
}
