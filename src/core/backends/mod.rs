pub mod memcache;
pub mod memcached;
pub mod redis;

pub use self::memcache::MemcacheBackend;
pub use self::memcached::MemcachedBackend;
pub use self::redis::RedisBackend;

use crate::core::backend::Endpoint;
use crate::error::KvError;

/// Run a synchronous memcache-client call on the blocking pool, folding
/// both the join failure and the client error into the backend error
/// surface.
pub(crate) async fn blocking<T, F>(endpoint: &Endpoint, task: F) -> Result<T, KvError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ::memcache::MemcacheError> + Send + 'static,
{
    let endpoint = endpoint.to_string();
    match tokio::task::spawn_blocking(task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(KvError::Backend {
            endpoint,
            reason: e.to_string(),
        }),
        Err(e) => Err(KvError::Backend {
            endpoint,
            reason: format!("blocking task failed: {}", e),
        }),
    }
}
