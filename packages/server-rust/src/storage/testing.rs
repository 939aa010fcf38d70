//! Fault-injecting cache wrapper shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::engine::{CacheEngine, CacheError};
use super::engines::HashMapCache;
use super::record::Bitmap;

/// Delegates to a [`HashMapCache`] but can be told to fail bit reads,
/// bitmap or integer writes, takes past a count, or every call.
#[derive(Default)]
pub(crate) struct FlakyCache {
    pub inner: HashMapCache,
    pub fail_bit_reads: AtomicBool,
    pub fail_bitmap_writes: AtomicBool,
    pub unavailable: AtomicBool,
    pub bitmap_writes: AtomicUsize,
    /// With `fail_takes` set, `take_int` fails once this many takes passed.
    pub fail_takes: AtomicBool,
    pub fail_takes_after: AtomicUsize,
    pub takes: AtomicUsize,
    pub fail_int_writes: AtomicBool,
    pub int_write_attempts: AtomicUsize,
}

impl FlakyCache {
    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheEngine for FlakyCache {
    async fn get_text(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        self.inner.get_text(key).await
    }

    async fn set_text(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.check()?;
        self.inner.set_text(key, value, ttl).await
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, CacheError> {
        self.check()?;
        self.inner.get_int(key).await
    }

    async fn set_int_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.check()?;
        self.int_write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_int_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected write failure".to_string()));
        }
        self.inner.set_int_if_absent(key, value, ttl).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.check()?;
        self.inner.incr_by(key, delta).await
    }

    async fn take_int(&self, key: &str) -> Result<Option<i64>, CacheError> {
        self.check()?;
        let seen = self.takes.fetch_add(1, Ordering::SeqCst);
        if self.fail_takes.load(Ordering::SeqCst)
            && seen >= self.fail_takes_after.load(Ordering::SeqCst)
        {
            return Err(CacheError::Unavailable("injected take failure".to_string()));
        }
        self.inner.take_int(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn get_bit(&self, key: &str, offset: u32) -> Result<Option<bool>, CacheError> {
        self.check()?;
        if self.fail_bit_reads.load(Ordering::SeqCst) {
            return Err(CacheError::WrongType {
                key: key.to_string(),
            });
        }
        self.inner.get_bit(key, offset).await
    }

    async fn set_bit(&self, key: &str, offset: u32, on: bool) -> Result<bool, CacheError> {
        self.check()?;
        self.inner.set_bit(key, offset, on).await
    }

    async fn set_bit_if_present(
        &self,
        key: &str,
        offset: u32,
        on: bool,
    ) -> Result<Option<bool>, CacheError> {
        self.check()?;
        self.inner.set_bit_if_present(key, offset, on).await
    }

    async fn put_bitmap(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.check()?;
        self.bitmap_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_bitmap_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected write failure".to_string()));
        }
        self.inner.put_bitmap(key, bitmap, ttl).await
    }

    async fn put_bitmap_if_absent(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.check()?;
        self.bitmap_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_bitmap_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("injected write failure".to_string()));
        }
        self.inner.put_bitmap_if_absent(key, bitmap, ttl).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check()
    }
}
