//! In-memory [`CacheEngine`] implementation backed by [`DashMap`].
//!
//! Every operation runs under the shard lock of the key it touches, which
//! gives the single-key atomicity the trait promises. Expired records are
//! treated as absent and dropped lazily on the next access, or in bulk by
//! [`HashMapCache::purge_expired`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canteen_core::{ClockSource, SystemClock};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::storage::engine::{CacheEngine, CacheError};
use crate::storage::record::{Bitmap, CacheRecord, CacheValue};

/// In-memory cache backed by [`DashMap`].
pub struct HashMapCache {
    entries: DashMap<String, CacheRecord>,
    clock: Arc<dyn ClockSource>,
}

impl HashMapCache {
    /// Creates an empty cache reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache that reads expiry time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of stored records, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, record| !record.metadata.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Stores a raw value, bypassing type checks.
    pub fn insert_value(&self, key: &str, value: CacheValue, ttl: Option<Duration>) {
        let now = self.clock.now();
        self.entries
            .insert(key.to_string(), CacheRecord::new(value, now, deadline(now, ttl)));
    }

    /// Runs `f` against the live record at `key` while holding its shard lock.
    ///
    /// An expired record is presented as `None`. Whatever `f` leaves in the
    /// slot is written back; leaving `None` removes the key.
    fn mutate<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Option<CacheRecord>, u64) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let now = self.clock.now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occ) => {
                let current = std::mem::replace(
                    occ.get_mut(),
                    CacheRecord::new(CacheValue::Int(0), now, None),
                );
                let mut slot = (!current.metadata.is_expired(now)).then_some(current);
                let result = f(&mut slot, now);
                match slot {
                    Some(record) => *occ.get_mut() = record,
                    None => {
                        occ.remove();
                    }
                }
                result
            }
            Entry::Vacant(vac) => {
                let mut slot = None;
                let result = f(&mut slot, now);
                if let Some(record) = slot {
                    vac.insert(record);
                }
                result
            }
        }
    }

    /// Reads the live record at `key`, recording the access.
    fn read<T>(
        &self,
        key: &str,
        f: impl FnOnce(&CacheValue) -> Result<T, CacheError>,
    ) -> Result<Option<T>, CacheError> {
        self.mutate(key, |slot, now| match slot {
            Some(record) => {
                record.metadata.on_access(now);
                f(&record.value).map(Some)
            }
            None => Ok(None),
        })
    }
}

impl Default for HashMapCache {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline(now: u64, ttl: Option<Duration>) -> Option<u64> {
    ttl.map(|t| now.saturating_add(u64::try_from(t.as_millis()).unwrap_or(u64::MAX)))
}

fn int_of(key: &str, value: &CacheValue) -> Result<i64, CacheError> {
    match value {
        CacheValue::Int(n) => Ok(*n),
        CacheValue::Text(s) => s.trim().parse().map_err(|_| CacheError::Corrupt {
            key: key.to_string(),
            reason: format!("not an integer: {s:?}"),
        }),
        CacheValue::Bits(_) => Err(CacheError::WrongType {
            key: key.to_string(),
        }),
    }
}

fn bits_of<'a>(key: &str, value: &'a mut CacheValue) -> Result<&'a mut Bitmap, CacheError> {
    match value {
        CacheValue::Bits(bits) => Ok(bits),
        _ => Err(CacheError::WrongType {
            key: key.to_string(),
        }),
    }
}

#[async_trait]
impl CacheEngine for HashMapCache {
    async fn get_text(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.read(key, |value| match value {
            CacheValue::Text(s) => Ok(s.clone()),
            CacheValue::Int(n) => Ok(n.to_string()),
            CacheValue::Bits(_) => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        })
    }

    async fn set_text(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.mutate(key, |slot, now| {
            *slot = Some(CacheRecord::new(
                CacheValue::Text(value.to_string()),
                now,
                deadline(now, ttl),
            ));
            Ok(())
        })
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, CacheError> {
        self.read(key, |value| int_of(key, value))
    }

    async fn set_int_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.mutate(key, |slot, now| {
            if slot.is_some() {
                return Ok(false);
            }
            *slot = Some(CacheRecord::new(
                CacheValue::Int(value),
                now,
                deadline(now, ttl),
            ));
            Ok(true)
        })
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.mutate(key, |slot, now| match slot {
            Some(record) => {
                let current = int_of(key, &record.value)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::Corrupt {
                        key: key.to_string(),
                        reason: "increment overflows i64".to_string(),
                    })?;
                record.value = CacheValue::Int(next);
                record.metadata.on_update(now);
                Ok(next)
            }
            None => {
                *slot = Some(CacheRecord::new(CacheValue::Int(delta), now, None));
                Ok(delta)
            }
        })
    }

    async fn take_int(&self, key: &str) -> Result<Option<i64>, CacheError> {
        self.mutate(key, |slot, _| {
            let Some(record) = slot.as_ref() else {
                return Ok(None);
            };
            // The key is removed even when its value is unreadable.
            let value = int_of(key, &record.value);
            *slot = None;
            value.map(Some)
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.read(key, |_| Ok(()))?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.mutate(key, |slot, _| Ok(slot.take().is_some()))
    }

    async fn get_bit(&self, key: &str, offset: u32) -> Result<Option<bool>, CacheError> {
        self.read(key, |value| match value {
            CacheValue::Bits(bits) => Ok(bits.get(offset)),
            _ => Err(CacheError::WrongType {
                key: key.to_string(),
            }),
        })
    }

    async fn set_bit(&self, key: &str, offset: u32, on: bool) -> Result<bool, CacheError> {
        self.mutate(key, |slot, now| {
            let record =
                slot.get_or_insert_with(|| CacheRecord::new(CacheValue::Bits(Bitmap::new()), now, None));
            let previous = bits_of(key, &mut record.value)?.set(offset, on);
            record.metadata.on_update(now);
            Ok(previous)
        })
    }

    async fn set_bit_if_present(
        &self,
        key: &str,
        offset: u32,
        on: bool,
    ) -> Result<Option<bool>, CacheError> {
        self.mutate(key, |slot, now| {
            let Some(record) = slot.as_mut() else {
                return Ok(None);
            };
            let previous = bits_of(key, &mut record.value)?.set(offset, on);
            record.metadata.on_update(now);
            Ok(Some(previous))
        })
    }

    async fn put_bitmap(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.mutate(key, |slot, now| {
            *slot = Some(CacheRecord::new(
                CacheValue::Bits(bitmap.clone()),
                now,
                deadline(now, ttl),
            ));
            Ok(())
        })
    }

    async fn put_bitmap_if_absent(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.mutate(key, |slot, now| {
            if slot.is_some() {
                return Ok(false);
            }
            *slot = Some(CacheRecord::new(
                CacheValue::Bits(bitmap.clone()),
                now,
                deadline(now, ttl),
            ));
            Ok(true)
        })
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use canteen_core::ManualClock;

    use super::*;

    fn cache_at(start: u64) -> (HashMapCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (HashMapCache::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn text_expires_after_ttl() {
        let (cache, clock) = cache_at(1_000);
        cache
            .set_text("k", "v", Some(Duration::from_secs(2)))
            .await
            .unwrap();
        clock.advance(1_999);
        assert_eq!(cache.get_text("k").await.unwrap().as_deref(), Some("v"));
        clock.advance(1);
        assert_eq!(cache.get_text("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
        // Lazy purge removed the record.
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn zero_ttl_is_never_observable() {
        let (cache, _clock) = cache_at(1_000);
        cache
            .set_text("k", "v", Some(Duration::ZERO))
            .await
            .unwrap();
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn set_if_absent_writes_once_until_expiry() {
        let (cache, clock) = cache_at(0);
        let ttl = Some(Duration::from_millis(100));
        assert!(cache.set_int_if_absent("c", 1, ttl).await.unwrap());
        assert!(!cache.set_int_if_absent("c", 2, ttl).await.unwrap());
        assert_eq!(cache.get_int("c").await.unwrap(), Some(1));

        clock.advance(100);
        assert!(cache.set_int_if_absent("c", 3, ttl).await.unwrap());
        assert_eq!(cache.get_int("c").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn incr_and_take_clear_atomically() {
        let cache = HashMapCache::new();
        assert_eq!(cache.incr_by("n", 2).await.unwrap(), 2);
        assert_eq!(cache.incr_by("n", -5).await.unwrap(), -3);
        assert_eq!(cache.take_int("n").await.unwrap(), Some(-3));
        assert_eq!(cache.take_int("n").await.unwrap(), None);
        assert_eq!(cache.get_int("n").await.unwrap(), None);
    }

    #[tokio::test]
    async fn text_integers_are_readable_as_ints() {
        let cache = HashMapCache::new();
        cache.set_text("n", " 41 ", None).await.unwrap();
        assert_eq!(cache.incr_by("n", 1).await.unwrap(), 42);

        cache.set_text("bad", "forty", None).await.unwrap();
        let err = cache.get_int("bad").await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
        // A failed take still clears the key, so counting can resume.
        assert!(cache.take_int("bad").await.is_err());
        assert!(!cache.exists("bad").await.unwrap());
        assert_eq!(cache.incr_by("bad", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bits_distinguish_absent_from_cleared() {
        let cache = HashMapCache::new();
        assert_eq!(cache.get_bit("b", 3).await.unwrap(), None);
        assert!(!cache.set_bit("b", 3, true).await.unwrap());
        assert_eq!(cache.get_bit("b", 3).await.unwrap(), Some(true));
        assert_eq!(cache.get_bit("b", 4).await.unwrap(), Some(false));
        assert!(cache.set_bit("b", 3, false).await.unwrap());
        assert_eq!(cache.get_bit("b", 3).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn put_bitmap_if_absent_never_replaces() {
        let cache = HashMapCache::new();
        let seeded = Bitmap::from_offsets([0, 1, 2], 3);
        assert!(cache.put_bitmap_if_absent("b", &seeded, None).await.unwrap());
        cache.set_bit("b", 1, false).await.unwrap();

        assert!(!cache.put_bitmap_if_absent("b", &seeded, None).await.unwrap());
        assert_eq!(cache.get_bit("b", 1).await.unwrap(), Some(false));
        assert_eq!(cache.get_bit("b", 2).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn set_bit_if_present_leaves_absent_keys_alone() {
        let cache = HashMapCache::new();
        assert_eq!(cache.set_bit_if_present("b", 1, true).await.unwrap(), None);
        assert!(!cache.exists("b").await.unwrap());

        cache
            .put_bitmap("b", &Bitmap::from_offsets([2], 8), None)
            .await
            .unwrap();
        assert_eq!(
            cache.set_bit_if_present("b", 1, true).await.unwrap(),
            Some(false)
        );
        assert_eq!(cache.get_bit("b", 1).await.unwrap(), Some(true));
        assert_eq!(cache.get_bit("b", 2).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn bit_ops_on_scalars_are_wrong_type() {
        let cache = HashMapCache::new();
        cache.insert_value("s", CacheValue::Text("x".into()), None);
        assert_eq!(
            cache.get_bit("s", 0).await.unwrap_err(),
            CacheError::WrongType { key: "s".into() }
        );
        assert!(cache.set_bit("s", 0, true).await.is_err());
        // The original value survives the failed write.
        assert_eq!(cache.get_text("s").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn purge_drops_only_expired_records() {
        let (cache, clock) = cache_at(0);
        cache
            .set_text("short", "1", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        cache.set_text("long", "2", None).await.unwrap();
        clock.advance(10);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let cache = Arc::new(HashMapCache::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    cache.incr_by("hits", 1).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(cache.get_int("hits").await.unwrap(), Some(320));
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let cache = HashMapCache::new();
        cache.set_text("k", "v", None).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        cache.ping().await.unwrap();
    }
}
