//! In-memory upload locks: serialize mutations of one upload's buffer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;

/// Manages asynchronous mutexes keyed by upload id. Chunk append and
/// finalization for one id run under its lock; distinct ids do not contend.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for `upload_id`, giving up after `timeout`.
    pub async fn lock_upload_with_timeout(
        &self,
        upload_id: &str,
        timeout: Duration,
    ) -> Result<tokio::sync::OwnedMutexGuard<()>, ()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(upload_id.trim().to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_id_contends_and_times_out() {
        let manager = LockManager::new();
        let _held = manager
            .lock_upload_with_timeout("up1", Duration::from_secs(1))
            .await
            .expect("first lock");

        let second = manager
            .lock_upload_with_timeout("up1", Duration::from_millis(20))
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn distinct_ids_do_not_contend() {
        let manager = LockManager::new();
        let _held = manager
            .lock_upload_with_timeout("up1", Duration::from_secs(1))
            .await
            .expect("first lock");

        let other = manager
            .lock_upload_with_timeout("up2", Duration::from_millis(20))
            .await;
        assert!(other.is_ok());
    }
}
