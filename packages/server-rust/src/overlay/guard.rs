use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Coordinates bulk status writers with composite visibility readers.
///
/// Built once at startup and shared. Every global status write takes the
/// write side, since it may seed the axis bitmap first. A multi-key read
/// such as building the index page takes the read side so it never
/// observes half of a bulk update.
#[derive(Debug, Default)]
pub struct StatusGuard {
    lock: RwLock<()>,
}

impl StatusGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }
}
