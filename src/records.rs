//! Order-preserving, deduplicated store of known URLs
//!
//! The store only grows. URLs are compared by exact string equality; no
//! normalization of case, scheme or trailing slash is attempted.

use std::collections::HashSet;

/// This node's known URLs in first-seen order
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    /// URLs in first-seen order
    urls: Vec<String>,
    /// Membership index over `urls`
    index: HashSet<String>,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `seed`, dropping repeats
    pub fn with_seed<I, S>(seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::new();
        for url in seed {
            store.insert(url.into());
        }
        store
    }

    /// Snapshot of all known URLs in first-seen order
    pub fn current(&self) -> Vec<String> {
        self.urls.clone()
    }

    /// Borrow the known URLs without copying
    pub fn as_slice(&self) -> &[String] {
        &self.urls
    }

    /// Append every URL of `incoming` not already present, keeping its order.
    ///
    /// Returns how many URLs were new.
    pub fn merge(&mut self, incoming: &[String]) -> usize {
        incoming
            .iter()
            .filter(|url| self.insert((*url).clone()))
            .count()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    fn insert(&mut self, url: String) -> bool {
        if self.index.contains(&url) {
            return false;
        }
        self.index.insert(url.clone());
        self.urls.push(url);
        true
    }
}
