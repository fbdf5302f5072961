use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::core::metrics::AtomicStoreMetrics;
use crate::error::KvError;

/// The adapters this crate knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Memcache,
    Memcached,
    Redis,
}

impl BackendKind {
    /// Adapter names are matched case-insensitively, as the factory always
    /// did.
    pub fn parse(name: &str) -> Result<Self, KvError> {
        match name.to_lowercase().as_str() {
            "memcache" => Ok(BackendKind::Memcache),
            "memcached" => Ok(BackendKind::Memcached),
            "redis" => Ok(BackendKind::Redis),
            _ => Err(KvError::AdapterNotFound(name.to_string())),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            BackendKind::Memcache => "memcache",
            BackendKind::Memcached => "memcached",
            BackendKind::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Connection identity: one live backend handle exists per endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(kind: BackendKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.kind.scheme(), self.host, self.port)
    }
}

/// What each backend can do natively. Declared at construction; the
/// emulator consults these instead of probing the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub native_list_push: bool,
    pub native_list_pop: bool,
    pub native_counter: bool,
    pub cas: bool,
    pub compression: bool,
}

/// A raw read result: payload bytes plus the CAS token, when the backend
/// hands one out.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub payload: Vec<u8>,
    pub cas_token: Option<u64>,
}

/// Outcome of a native counter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterHit {
    Applied(i64),
    /// The native primitive reported the key as missing; the caller decides
    /// whether to auto-initialize.
    Missing,
}

/// Primitive surface every concrete adapter binds to its client library.
/// Keys arriving here are already composed; payloads are opaque bytes.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    fn endpoint(&self) -> &Endpoint;

    fn capabilities(&self) -> Capabilities;

    fn metrics(&self) -> Arc<AtomicStoreMetrics>;

    /// `Ok(None)` means the backend reported the key as absent, which is
    /// distinct from every error.
    async fn read(&self, key: &str) -> Result<Option<RawEntry>, KvError>;

    async fn write(&self, key: &str, payload: Vec<u8>, expiration: u32) -> Result<bool, KvError>;

    async fn compare_and_swap(
        &self,
        key: &str,
        payload: Vec<u8>,
        expiration: u32,
        token: u64,
    ) -> Result<bool, KvError>;

    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Native atomic counter; `delta` is signed.
    async fn counter(&self, key: &str, delta: i64) -> Result<CounterHit, KvError>;

    /// Native list push. `Ok(false)` is a refusal (e.g. the key holds a
    /// non-list value) and tells the emulator to take over.
    async fn list_push(&self, key: &str, payload: Vec<u8>) -> Result<bool, KvError>;

    /// Native head pop. `Ok(None)` when the list is empty or the key does
    /// not hold a native list.
    async fn list_pop(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    async fn close(&self) -> Result<(), KvError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!(BackendKind::parse("Redis").unwrap(), BackendKind::Redis);
        assert_eq!(
            BackendKind::parse("MEMCACHED").unwrap(),
            BackendKind::Memcached
        );
        let err = BackendKind::parse("kyototycoon").unwrap_err();
        assert_eq!(err.code(), "adapter-not-found");
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new(BackendKind::Redis, "127.0.0.1", 6379);
        assert_eq!(endpoint.to_string(), "redis://127.0.0.1:6379");
    }
}
