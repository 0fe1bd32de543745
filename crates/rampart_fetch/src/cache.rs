//! Shared one-shot memoization for fetch functions.
//!
//! The cache maps string keys to slots. A slot's loader runs exactly
//! once while the slot persists, however many callers race on it;
//! [`store`](FetchCache::store) replaces the slot wholesale, which
//! also re-arms the one-shot guard. The map is guarded by a
//! readers-writer lock; loader invocation is serialized per key by the
//! slot's own guard so the map lock is never held across a load.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde_json::Value as Json;
use tokio::sync::Mutex;

use crate::error::FetchError;

struct Slot {
    loaded: Mutex<bool>,
    state: RwLock<Option<Result<Json, FetchError>>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            loaded: Mutex::new(false),
            state: RwLock::new(None),
        }
    }

    fn with_value(value: Json) -> Self {
        Self {
            loaded: Mutex::new(false),
            state: RwLock::new(Some(Ok(value))),
        }
    }

    fn current(&self) -> Option<Result<Json, FetchError>> {
        self.state.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

/// Keyed one-shot cache shared by every fetch function in a cycle.
#[derive(Default)]
pub struct FetchCache {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl FetchCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Slot::empty())),
        )
    }

    /// The slot's current `(result, error)` state, without loading.
    ///
    /// Returns `None` when the slot has never been populated.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Result<Json, FetchError>> {
        self.slot(key).current()
    }

    /// Run `loader` exactly once for this slot and return the slot's
    /// state afterwards.
    ///
    /// Concurrent callers coalesce into a single loader run and all
    /// observe the same outcome. Once the slot has loaded, subsequent
    /// calls return the memoized state without invoking `loader`.
    ///
    /// # Errors
    ///
    /// Returns the error memoized in the slot, whether produced by
    /// this call's loader or an earlier one.
    pub async fn get_or_load<F, Fut>(&self, key: &str, loader: F) -> Result<Json, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Json, FetchError>>,
    {
        let slot = self.slot(key);

        let mut loaded = slot.loaded.lock().await;
        if !*loaded {
            let result = loader().await;
            *slot
                .state
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(result);
            *loaded = true;
        }
        drop(loaded);

        slot.current().unwrap_or(Ok(Json::Null))
    }

    /// Replace the slot for `key` with a fresh slot already holding
    /// `value` and no error.
    ///
    /// This re-arms the one-shot: the next
    /// [`get_or_load`](Self::get_or_load) on `key` runs its loader
    /// again.
    pub fn store(&self, key: &str, value: Json) {
        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        slots.insert(key.to_string(), Arc::new(Slot::with_value(value)));
    }

    /// Drop every slot.
    pub fn reset(&self) {
        self.slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}
