//! Memoization keyed by step profile.
//!
//! Results are cached per [`StepProfileKey`]. Nothing is evicted behind the
//! caller's back: whoever retires a profile calls [`ProfileCache::invalidate`],
//! or clears the whole cache.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{ForklineError, ForklineResult};
use crate::step::StepProfileKey;

fn lock_err(context: &'static str) -> ForklineError {
    ForklineError::LockPoisoned { context }
}

/// Thread-safe cache holding at most one value per profile key.
#[derive(Debug)]
pub struct ProfileCache<V> {
    entries: RwLock<HashMap<StepProfileKey, V>>,
}

impl<V> Default for ProfileCache<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone> ProfileCache<V> {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with(&self, key: StepProfileKey, compute: impl FnOnce() -> V) -> ForklineResult<V> {
        if let Some(value) = self.get(&key)? {
            return Ok(value);
        }

        let mut entries = self.entries.write().map_err(|_| lock_err("profile_cache.insert"))?;
        // Another caller may have filled the slot between the two locks.
        Ok(entries.entry(key).or_insert_with(compute).clone())
    }

    /// Returns the cached value for `key`, if any.
    pub fn get(&self, key: &StepProfileKey) -> ForklineResult<Option<V>> {
        let entries = self.entries.read().map_err(|_| lock_err("profile_cache.get"))?;
        Ok(entries.get(key).cloned())
    }

    /// Removes the entry for `key`, returning it.
    pub fn invalidate(&self, key: &StepProfileKey) -> ForklineResult<Option<V>> {
        let mut entries = self.entries.write().map_err(|_| lock_err("profile_cache.invalidate"))?;
        Ok(entries.remove(key))
    }

    /// Removes every entry.
    pub fn clear(&self) -> ForklineResult<()> {
        self.entries.write().map_err(|_| lock_err("profile_cache.clear"))?.clear();
        Ok(())
    }

    /// Number of cached entries.
    pub fn len(&self) -> ForklineResult<usize> {
        Ok(self.entries.read().map_err(|_| lock_err("profile_cache.len"))?.len())
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> ForklineResult<bool> {
        Ok(self.len()? == 0)
    }
}
