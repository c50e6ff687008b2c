//! Keyed in-flight operation registry
//!
//! A concurrent set of exclusivity keys with an atomic check-and-insert.
//! The per-shard lock is held only across that step, never across an
//! operation body, so admission stays cheap under contention while distinct
//! keys never block each other.

use crate::executor::operation::{OperationKey, OperationKind};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// What the registry remembers about an in-flight operation
#[derive(Debug, Clone, Copy)]
pub struct InFlightMarker {
    pub kind: OperationKind,
    pub started_at: Instant,
}

/// Concurrency-safe set of in-flight exclusivity keys
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    keys: Arc<DashMap<OperationKey, InFlightMarker>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically register the key if absent. Returns false when an
    /// operation already holds the key, in which case the caller must drop
    /// its submission.
    pub fn try_insert(&self, key: OperationKey, kind: OperationKind) -> bool {
        match self.keys.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(InFlightMarker {
                    kind,
                    started_at: Instant::now(),
                });
                true
            }
        }
    }

    /// Release a key on operation completion
    pub fn remove(&self, key: &OperationKey) {
        self.keys.remove(key);
    }

    /// Marker of the operation currently holding the key, if any
    pub fn marker(&self, key: &OperationKey) -> Option<InFlightMarker> {
        self.keys.get(key).map(|entry| *entry.value())
    }

    pub fn contains(&self, key: &OperationKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
