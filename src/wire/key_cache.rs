// Key decode cache.
//
// Object keys repeat heavily across messages.  Short keys are memoized by
// their raw bytes, bucketed by length, so a hit costs one slice comparison
// per slot instead of UTF-8 validation plus an allocation for the bytes.
// Full buckets evict a random slot.

use std::str::Utf8Error;

use rand::Rng;

/// Longest key (in bytes) eligible for caching.
pub const MAX_CACHED_KEY_LEN: usize = 16;

/// Slots per length bucket.
pub const SLOTS_PER_LEN: usize = 16;

#[derive(Debug, Clone)]
struct Slot {
    bytes: Box<[u8]>,
    key: String,
}

/// Bounded byte-string → key cache.  One per decoding stream.
#[derive(Debug, Clone)]
pub struct KeyCache {
    buckets: Vec<Vec<Slot>>,
    hits: u64,
    misses: u64,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyCache {
    pub fn new() -> Self {
        Self {
            buckets: (0..MAX_CACHED_KEY_LEN)
                .map(|_| Vec::with_capacity(SLOTS_PER_LEN))
                .collect(),
            hits: 0,
            misses: 0,
        }
    }

    /// True for byte lengths the cache stores (1 through 16).
    #[inline]
    pub fn can_be_cached(len: usize) -> bool {
        (1..=MAX_CACHED_KEY_LEN).contains(&len)
    }

    /// Decode `bytes` as a key, consulting the cache for short keys.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String, Utf8Error> {
        if !Self::can_be_cached(bytes.len()) {
            return std::str::from_utf8(bytes).map(str::to_owned);
        }

        let bucket = &mut self.buckets[bytes.len() - 1];
        if let Some(slot) = bucket.iter().find(|s| *s.bytes == *bytes) {
            self.hits += 1;
            return Ok(slot.key.clone());
        }

        let key = std::str::from_utf8(bytes)?.to_owned();
        self.misses += 1;
        let slot = Slot {
            bytes: bytes.into(),
            key: key.clone(),
        };
        if bucket.len() < SLOTS_PER_LEN {
            bucket.push(slot);
        } else {
            let victim = rand::rng().random_range(0..SLOTS_PER_LEN);
            bucket[victim] = slot;
        }
        Ok(key)
    }

    /// Number of cached keys across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
