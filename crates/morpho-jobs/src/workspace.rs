//! Shared scratch storage for intermediate job results.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;

type Slot = Box<dyn Any + Send + Sync>;

/// Keyed store through which job items hand results to later items.
///
/// Values are stored either whole (`set`/`get`) or per specimen index
/// (`set_indexed`/`get_indexed`), the latter so that items of a parallel
/// stage can each fill their own slot. Reading a key with the wrong type
/// behaves as if the key were absent.
#[derive(Default)]
pub struct JobWorkspace {
    entries: RwLock<HashMap<String, Slot>>,
}

impl JobWorkspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.entries.write().insert(key.into(), Box::new(value));
    }

    /// Stores `value` in slot `index` of the list under `key`.
    ///
    /// The list grows as needed; an entry of a different type is replaced
    /// by a fresh list.
    pub fn set_indexed<T: Any + Send + Sync>(&self, key: &str, index: usize, value: T) {
        let mut entries = self.entries.write();

        let has_list = entries
            .get(key)
            .is_some_and(|slot| slot.is::<Vec<Option<T>>>());
        if !has_list {
            entries.insert(key.to_string(), Box::new(Vec::<Option<T>>::new()));
        }

        let Some(list) = entries
            .get_mut(key)
            .and_then(|slot| slot.downcast_mut::<Vec<Option<T>>>())
        else {
            return;
        };

        if list.len() <= index {
            list.resize_with(index + 1, || None);
        }
        list[index] = Some(value);
    }

    /// Returns a clone of the value under `key`.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.with(key, T::clone)
    }

    /// Runs `f` against the value under `key` without cloning it.
    pub fn with<T: Any, R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let entries = self.entries.read();
        entries.get(key)?.downcast_ref::<T>().map(f)
    }

    /// Returns a clone of slot `index` of the list under `key`.
    pub fn get_indexed<T: Any + Clone>(&self, key: &str, index: usize) -> Option<T> {
        self.with_indexed(key, index, T::clone)
    }

    /// Runs `f` against slot `index` of the list under `key`.
    pub fn with_indexed<T: Any, R>(
        &self,
        key: &str,
        index: usize,
        f: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        let entries = self.entries.read();
        let list = entries.get(key)?.downcast_ref::<Vec<Option<T>>>()?;
        list.get(index)?.as_ref().map(f)
    }

    /// Number of filled slots in the list under `key`.
    pub fn indexed_count<T: Any>(&self, key: &str) -> usize {
        self.entries
            .read()
            .get(key)
            .and_then(|slot| slot.downcast_ref::<Vec<Option<T>>>())
            .map_or(0, |list| list.iter().filter(|v| v.is_some()).count())
    }

    /// Removes `key`. Returns true if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Returns true if anything is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Sorted list of keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the workspace holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl std::fmt::Debug for JobWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWorkspace")
            .field("keys", &self.keys())
            .finish()
    }
}
