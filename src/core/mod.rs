pub mod backend;
pub mod backends;
pub mod metrics;
pub mod namespace;
pub mod operation;
pub mod registry;
pub mod store;
pub mod value;

// Re-export core types
pub use backend::{Backend, BackendKind, Capabilities, CounterHit, Endpoint, RawEntry};
pub use backends::{MemcacheBackend, MemcachedBackend, RedisBackend};
pub use metrics::{AtomicStoreMetrics, MetricsSnapshot, StoreMetrics};
pub use namespace::{KeyCase, KeyNamespace};
pub use operation::{ResolvedArgs, Response, Verb};
pub use registry::ConnectionRegistry;
pub use store::KeyValueStore;
pub use value::{Container, Value};
