//! Two-level table of pending state keyed by browser
//!
//! The outer key is the browser id, the inner key identifies one request
//! within that browser. Entries are owned by the table. Removing an entry
//! hands ownership back to the caller, who is responsible for whatever
//! cleanup the value needs (the table never detaches callbacks itself).

use std::collections::HashMap;
use std::hash::Hash;

use crate::process::BrowserId;

/// Result of a point lookup that may remove the entry
#[derive(Debug)]
pub enum Found<'a, V> {
    /// The entry stays in the table
    Retained(&'a mut V),
    /// The entry was removed and is now owned by the caller
    Removed(V),
}

impl<V> Found<'_, V> {
    pub fn is_removed(&self) -> bool {
        matches!(self, Found::Removed(_))
    }
}

impl<V> std::ops::Deref for Found<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        match self {
            Found::Retained(value) => value,
            Found::Removed(value) => value,
        }
    }
}

/// Pending entries grouped per browser
#[derive(Debug)]
pub struct BrowserInfoMap<K, V> {
    browsers: HashMap<BrowserId, HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V> BrowserInfoMap<K, V> {
    pub fn new() -> Self {
        Self {
            browsers: HashMap::new(),
        }
    }

    /// Insert an entry. Adding a key that is already present is a bug in the
    /// caller; in release builds the old value is replaced.
    pub fn add(&mut self, browser_id: BrowserId, key: K, value: V) {
        let previous = self.browsers.entry(browser_id).or_default().insert(key, value);
        debug_assert!(previous.is_none(), "duplicate key for browser {browser_id}");
    }

    /// Look up one entry and let `should_remove` decide whether it leaves
    /// the table
    pub fn find<F>(&mut self, browser_id: BrowserId, key: &K, should_remove: F) -> Option<Found<'_, V>>
    where
        F: FnOnce(&V) -> bool,
    {
        let remove = should_remove(self.browsers.get(&browser_id)?.get(key)?);
        if !remove {
            return self.browsers.get_mut(&browser_id)?.get_mut(key).map(Found::Retained);
        }

        let entries = self.browsers.get_mut(&browser_id)?;
        let value = entries.remove(key)?;
        if entries.is_empty() {
            self.browsers.remove(&browser_id);
        }
        Some(Found::Removed(value))
    }

    /// Remove a single entry
    pub fn remove(&mut self, browser_id: BrowserId, key: &K) -> Option<V> {
        match self.find(browser_id, key, |_| true)? {
            Found::Removed(value) => Some(value),
            Found::Retained(_) => None,
        }
    }

    /// Visit every entry for one browser, or for all browsers when
    /// `browser_id` is `None`
    pub fn find_all<F>(&self, browser_id: Option<BrowserId>, mut visitor: F)
    where
        F: FnMut(BrowserId, &K, &V),
    {
        for (id, entries) in &self.browsers {
            if browser_id.is_some_and(|wanted| wanted != *id) {
                continue;
            }
            for (key, value) in entries {
                visitor(*id, key, value);
            }
        }
    }

    /// Count the entries matching `predicate`
    pub fn count_where<F>(&self, browser_id: Option<BrowserId>, mut predicate: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut count = 0;
        self.find_all(browser_id, |_, key, value| {
            if predicate(key, value) {
                count += 1;
            }
        });
        count
    }

    /// Remove every entry matching `predicate` and return them. Matching keys
    /// are collected first and removed in a second pass.
    pub fn remove_where<F>(&mut self, browser_id: Option<BrowserId>, mut predicate: F) -> Vec<(BrowserId, K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut matches = Vec::new();
        self.find_all(browser_id, |id, key, value| {
            if predicate(key, value) {
                matches.push((id, key.clone()));
            }
        });

        matches
            .into_iter()
            .filter_map(|(id, key)| {
                let value = self.remove(id, &key)?;
                Some((id, key, value))
            })
            .collect()
    }

    /// Number of entries for one browser
    pub fn size_for(&self, browser_id: BrowserId) -> usize {
        self.browsers.get(&browser_id).map(HashMap::len).unwrap_or_default()
    }

    /// Number of entries across all browsers
    pub fn size(&self) -> usize {
        self.browsers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.browsers.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V> Default for BrowserInfoMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
