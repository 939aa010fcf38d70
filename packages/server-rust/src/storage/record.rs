//! Record types for the cache layer.
//!
//! Defines [`CacheRecord`], [`CacheValue`], [`RecordMetadata`] and the
//! [`Bitmap`] used for status flags.

/// Metadata tracked for every cached record.
///
/// Tracks version, access statistics and expiry for the in-memory engine.
#[derive(Debug, Clone, Default)]
pub struct RecordMetadata {
    /// Record version, incremented on every update.
    pub version: u32,
    /// Wall-clock time (millis since epoch) when this record was created.
    pub creation_time: u64,
    /// Wall-clock time of the last read access.
    pub last_access_time: u64,
    /// Wall-clock time of the last write.
    pub last_update_time: u64,
    /// Absolute expiry time in millis. `None` = lives until deleted.
    pub expires_at: Option<u64>,
    /// Number of read accesses.
    pub hits: u32,
}

impl RecordMetadata {
    /// Creates new metadata stamped at `now`, expiring at `expires_at`.
    ///
    /// Version starts at 1 and hits at 0.
    #[must_use]
    pub fn new(now: u64, expires_at: Option<u64>) -> Self {
        Self {
            version: 1,
            creation_time: now,
            last_access_time: now,
            last_update_time: now,
            expires_at,
            hits: 0,
        }
    }

    /// Records a read access: increments `hits` and updates `last_access_time`.
    pub fn on_access(&mut self, now: u64) {
        self.hits = self.hits.saturating_add(1);
        self.last_access_time = now;
    }

    /// Records a write: increments `version` and updates `last_update_time`.
    pub fn on_update(&mut self, now: u64) {
        self.version = self.version.saturating_add(1);
        self.last_update_time = now;
    }

    /// Returns `true` once `now` has reached the expiry time.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// The value portion of a cached record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Text(String),
    Int(i64),
    Bits(Bitmap),
}

impl CacheValue {
    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            CacheValue::Text(_) => "text",
            CacheValue::Int(_) => "int",
            CacheValue::Bits(_) => "bitmap",
        }
    }
}

/// A complete record: value plus engine-internal metadata.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub value: CacheValue,
    pub metadata: RecordMetadata,
}

impl CacheRecord {
    #[must_use]
    pub fn new(value: CacheValue, now: u64, expires_at: Option<u64>) -> Self {
        Self {
            value,
            metadata: RecordMetadata::new(now, expires_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Bitmap
// ---------------------------------------------------------------------------

/// Growable bit array addressed by entity id.
///
/// Bit `n` lives in byte `n / 8` at mask `0x80 >> (n % 8)`, the same layout
/// Redis uses for `SETBIT`/`GETBIT`, so the raw bytes can be stored in either
/// engine unchanged. Reads past the end are `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Vec<u8>,
}

impl Bitmap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Builds a bitmap with exactly the given offsets set, sized to cover
    /// at least `len_bits` bits.
    #[must_use]
    pub fn from_offsets(offsets: impl IntoIterator<Item = u32>, len_bits: u32) -> Self {
        let mut bitmap = Self {
            bytes: vec![0; byte_len(len_bits)],
        };
        for offset in offsets {
            bitmap.set(offset, true);
        }
        bitmap
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn get(&self, offset: u32) -> bool {
        let (index, mask) = locate(offset);
        self.bytes.get(index).is_some_and(|b| b & mask != 0)
    }

    /// Sets or clears a bit, growing the bitmap as needed. Returns the
    /// previous value.
    pub fn set(&mut self, offset: u32, on: bool) -> bool {
        let (index, mask) = locate(offset);
        if index >= self.bytes.len() {
            if !on {
                return false;
            }
            self.bytes.resize(index + 1, 0);
        }
        let byte = &mut self.bytes[index];
        let previous = *byte & mask != 0;
        if on {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        previous
    }

    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }
}

fn locate(offset: u32) -> (usize, u8) {
    ((offset / 8) as usize, 0x80 >> (offset % 8))
}

fn byte_len(bits: u32) -> usize {
    bits.div_ceil(8) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_tracks_access_and_update() {
        let mut meta = RecordMetadata::new(100, Some(200));
        assert_eq!(meta.version, 1);
        meta.on_access(150);
        meta.on_update(160);
        assert_eq!(meta.hits, 1);
        assert_eq!(meta.last_access_time, 150);
        assert_eq!(meta.version, 2);
        assert_eq!(meta.last_update_time, 160);
    }

    #[test]
    fn expiry_is_inclusive_of_deadline() {
        let meta = RecordMetadata::new(0, Some(1_000));
        assert!(!meta.is_expired(999));
        assert!(meta.is_expired(1_000));
        assert!(!RecordMetadata::new(0, None).is_expired(u64::MAX));
    }

    #[test]
    fn bitmap_uses_msb_first_layout() {
        let mut bits = Bitmap::new();
        assert!(!bits.set(0, true));
        assert!(!bits.set(9, true));
        assert_eq!(bits.as_bytes(), &[0b1000_0000, 0b0100_0000]);
        assert!(bits.get(0));
        assert!(bits.get(9));
        assert!(!bits.get(1));
        assert!(!bits.get(10_000));
    }

    #[test]
    fn set_returns_previous_and_clearing_past_end_does_not_grow() {
        let mut bits = Bitmap::new();
        assert!(!bits.set(500, false));
        assert!(bits.as_bytes().is_empty());
        bits.set(3, true);
        assert!(bits.set(3, false));
        assert!(!bits.get(3));
    }

    #[test]
    fn from_offsets_covers_requested_length() {
        let bits = Bitmap::from_offsets([1, 100_002], 100_010);
        assert_eq!(bits.as_bytes().len(), 12_502);
        assert!(bits.get(1));
        assert!(bits.get(100_002));
        assert_eq!(bits.count_ones(), 2);
    }
}
