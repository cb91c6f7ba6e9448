//! Content-addressed object cache.
//!
//! Slots are keyed by text. Short keys are used verbatim; longer keys are
//! reduced to a SHA-256 digest. Two lookups with the same key return the same
//! slot for as long as the cache holds it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::envelope::{Envelope, Object, ObjectKind, downcast};

/// Keys shorter than this many bytes are stored inline.
pub const INLINE_KEY_LIMIT: usize = 31;

/// Identity of a cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Inline(String),
    Digest([u8; 32]),
}

impl CacheKey {
    pub fn from_text(text: &str) -> Self {
        if text.len() < INLINE_KEY_LIMIT {
            Self::Inline(text.to_owned())
        } else {
            Self::Digest(sha256(text.as_bytes()))
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(text) => f.write_str(text),
            Self::Digest(bytes) => f.write_str(&to_hex(bytes)),
        }
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A keyed holder for at most one shared entity.
pub struct CacheSlot {
    envelope: Envelope,
    key: CacheKey,
    entry: RwLock<Option<Arc<dyn Object>>>,
}

impl CacheSlot {
    fn new(key: CacheKey) -> Self {
        Self {
            envelope: Envelope::new(ObjectKind::CacheSlot),
            key,
            entry: RwLock::new(None),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.entry.read().is_none()
    }

    /// Store an entity. Copyable entities are copied so the slot owns an
    /// independent instance; others are shared.
    pub fn set(&self, entity: &Arc<dyn Object>) {
        let stored = entity.copy_object().unwrap_or_else(|| Arc::clone(entity));
        tracing::trace!(key = %self.key, kind = %stored.kind(), "cache slot filled");
        *self.entry.write() = Some(stored);
    }

    /// The stored entity, if it is of `expected` kind and concrete type `T`.
    pub fn get<T: Object>(&self, expected: ObjectKind) -> Option<Arc<T>> {
        let entry = self.entry()?;
        if entry.kind() != expected {
            tracing::debug!(
                key = %self.key,
                expected = %expected,
                found = %entry.kind(),
                "cache slot holds a different kind"
            );
            return None;
        }
        downcast::<T>(entry)
    }

    /// The stored entity regardless of kind.
    pub fn entry(&self) -> Option<Arc<dyn Object>> {
        self.entry.read().clone()
    }

    fn clear(&self) -> Option<Arc<dyn Object>> {
        self.entry.write().take()
    }
}

impl fmt::Debug for CacheSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSlot")
            .field("key", &self.key)
            .field("filled", &!self.is_empty())
            .finish()
    }
}

impl Object for CacheSlot {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Map from key to slot, owned by a [`crate::Context`].
#[derive(Debug, Default)]
pub struct ObjectCache {
    slots: HashMap<CacheKey, Arc<CacheSlot>>,
    stats: CacheStats,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the slot for `text`, creating an empty one on first use.
    pub fn get_or_create(&mut self, text: &str) -> Arc<CacheSlot> {
        let key = CacheKey::from_text(text);
        if let Some(slot) = self.slots.get(&key) {
            self.stats.hits += 1;
            return Arc::clone(slot);
        }
        self.stats.misses += 1;
        let slot = Arc::new(CacheSlot::new(key.clone()));
        self.slots.insert(key, Arc::clone(&slot));
        slot
    }

    pub fn set(&self, slot: &CacheSlot, entity: &Arc<dyn Object>) {
        slot.set(entity);
    }

    pub fn get<T: Object>(&self, slot: &CacheSlot, expected: ObjectKind) -> Option<Arc<T>> {
        slot.get(expected)
    }

    /// Give back a slot handle. The slot and its entry are dropped once only
    /// the cache refers to the slot. Returns whether the slot was evicted.
    pub fn release(&mut self, slot: Arc<CacheSlot>) -> bool {
        let key = slot.key().clone();
        match self.slots.get(&key) {
            Some(stored) if Arc::ptr_eq(stored, &slot) => {}
            _ => {
                tracing::debug!(key = %key, "release of a slot this cache does not hold");
                return false;
            }
        }
        // The map and `slot` are the last two holders.
        if Arc::strong_count(&slot) > 2 {
            return false;
        }
        slot.clear();
        self.slots.remove(&key);
        true
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
