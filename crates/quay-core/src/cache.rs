//! Lazy insert-only caches.
//!
//! Every lookup in the resolution core is memoized for the lifetime of the
//! process: values are computed at most once per key, never evicted, and
//! failed loads are cached like successful ones.

use std::borrow::Borrow;
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;

/// A lazy map cache. The first completed load for a key wins; later loads
/// for the same key observe the memoized value.
#[derive(Debug)]
pub struct Cache<K, V> {
    map: RefCell<HashMap<K, V>>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            map: RefCell::new(HashMap::new()),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing it with `load` on a miss.
    ///
    /// The map is not borrowed while `load` runs, so loads may consult other
    /// caches (or this one under a different key).
    pub fn get_lazy<Q, F>(&self, key: &Q, load: F) -> V
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ToOwned<Owned = K> + ?Sized,
        F: FnOnce() -> V,
    {
        if let Some(value) = self.map.borrow().get(key) {
            return value.clone();
        }

        let value = load();
        self.map
            .borrow_mut()
            .entry(key.to_owned())
            .or_insert(value)
            .clone()
    }
}

/// A lazy cell for a single value, computed on first access.
#[derive(Debug, Default)]
pub struct CacheSingle<T> {
    cell: OnceCell<T>,
}

impl<T> CacheSingle<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_lazy<F: FnOnce() -> T>(&self, load: F) -> &T {
        self.cell.get_or_init(load)
    }
}
