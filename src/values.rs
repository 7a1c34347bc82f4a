//! Per-connection application state.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

// ============================================================================
// Types
// ============================================================================

type Slot = Arc<dyn Any + Send + Sync>;

// ============================================================================
// Values
// ============================================================================

/// Concurrency-safe keyed store attached to each connection.
///
/// Entries are typed on read: [`get`](Self::get) returns `None` when the key
/// is missing or holds a value of another type.
///
/// # Example
///
/// ```
/// use wsnet::Values;
///
/// let values = Values::new();
/// values.insert("user", String::from("ada"));
///
/// assert_eq!(values.get::<String>("user").as_deref().map(String::as_str), Some("ada"));
/// assert!(values.get::<u32>("user").is_none());
/// ```
#[derive(Default)]
pub struct Values {
    entries: RwLock<FxHashMap<String, Slot>>,
}

impl Values {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`. Returns `true` if a previous entry was replaced.
    pub fn insert<T>(&self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.entries
            .write()
            .insert(key.into(), Arc::new(value))
            .is_some()
    }

    /// Returns the value under `key` if it exists and is a `T`.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let slot = self.entries.read().get(key).cloned()?;
        slot.downcast::<T>().ok()
    }

    /// Returns the value under `key`, inserting the result of `init` first if absent.
    ///
    /// Returns `None` only if an existing entry has a different type.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let slot = {
            let mut entries = self.entries.write();
            Arc::clone(
                entries
                    .entry(key.to_string())
                    .or_insert_with(|| -> Slot { Arc::new(init()) }),
            )
        };
        slot.downcast::<T>().ok()
    }

    /// Removes `key`. Returns `true` if an entry existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Returns `true` if `key` is present, whatever its type.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl fmt::Debug for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut keys: Vec<_> = entries.keys().collect();
        keys.sort();
        f.debug_struct("Values").field("keys", &keys).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
