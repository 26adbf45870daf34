//! Per-file serialisation
//!
//! Uploads, deletes and repairs of the same file must not interleave.
//! Different files never contend. Entries are pruned once no guard or
//! waiter references them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Held while a file is being mutated. Releases on drop.
pub struct FileGuard {
    file_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl FileGuard {
    pub fn file_id(&self) -> Uuid {
        self.file_id
    }
}

/// Table of async mutexes keyed by file id
#[derive(Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, file_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        // Only the table itself references an idle entry
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(file_id).or_default().clone()
    }

    /// Wait until the file is free, then hold it.
    pub async fn lock(&self, file_id: Uuid) -> FileGuard {
        let guard = self.slot(file_id).lock_owned().await;
        FileGuard {
            file_id,
            _guard: guard,
        }
    }

    /// Hold the file if nobody else does.
    pub fn try_lock(&self, file_id: Uuid) -> Option<FileGuard> {
        let guard = self.slot(file_id).try_lock_owned().ok()?;
        Some(FileGuard {
            file_id,
            _guard: guard,
        })
    }

    /// Number of tracked files (idle entries included until the next prune)
    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_try_lock_contends_per_file() {
        let locks = FileLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let held = locks.lock(a).await;
        assert_eq!(held.file_id(), a);
        assert!(locks.try_lock(a).is_none());
        assert!(locks.try_lock(b).is_some());

        drop(held);
        assert!(locks.try_lock(a).is_some());
    }

    #[tokio::test]
    async fn test_lock_waits_for_release() {
        let locks = Arc::new(FileLocks::new());
        let file = Uuid::new_v4();
        let held = locks.lock(file).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(file).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = FileLocks::new();
        for _ in 0..10 {
            let _guard = locks.lock(Uuid::new_v4()).await;
        }
        // The next acquisition prunes every released entry
        let _guard = locks.lock(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 1);
    }
}
