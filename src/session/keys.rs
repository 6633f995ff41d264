//! Captured credential store
//!
//! Sector keys the reader disclosed while authenticating against the
//! emulated card, deduplicated by the six key bytes alone. The same key
//! offered for a different sector or key role is not recorded twice; the
//! attribution of the first sighting wins.

use log::warn;

use crate::mfc::{KeyKind, MfKey};

/// Maximum number of distinct keys retained per session.
pub const KEY_CAPACITY: usize = 16;

/// A credential the reader disclosed, attributed to the sector and key
/// role of the first authentication attempt that carried it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedKey {
    pub sector: u8,
    pub kind: KeyKind,
    pub key: MfKey,
}

/// Bounded, order-preserving store of captured keys.
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: Vec<CapturedKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self {
            keys: Vec::with_capacity(KEY_CAPACITY),
        }
    }

    /// Record a key offered by the reader.
    ///
    /// Linear scan comparing key bytes only. Returns true when a new entry
    /// was stored; false for a duplicate or when the store is at capacity.
    /// At capacity further distinct keys are dropped, never evicted.
    pub fn record(&mut self, sector: u8, kind: KeyKind, key: MfKey) -> bool {
        if self.keys.iter().any(|k| k.key == key) {
            return false;
        }
        if self.keys.len() >= KEY_CAPACITY {
            return false;
        }

        self.keys.push(CapturedKey { sector, kind, key });
        warn!(
            "new key captured (#{}): S{} Key{} {}",
            self.keys.len(),
            sector,
            kind.label(),
            key.hex()
        );
        true
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Captured keys in first-seen order.
    pub fn keys(&self) -> &[CapturedKey] {
        &self.keys
    }

    /// Discard all captured keys (operator session reset).
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
