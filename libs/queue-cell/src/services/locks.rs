// libs/queue-cell/src/services/locks.rs
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Keyed async mutexes. Holders of the same key run one at a time; distinct
/// keys never block each other.
pub struct ScopeLocks<K> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for ScopeLocks<K> {
    fn default() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }
}

impl<K> ScopeLocks<K>
where
    K: Eq + Hash + Clone + std::fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(key.clone()).or_default().clone()
        };

        debug!("Acquiring scheduling lock {}", key);
        mutex.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
