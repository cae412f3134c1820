//! Join table from handles to their section within one batch

use std::collections::HashMap;

use crate::foundation::collections::{HandleKey, ProxyKey};

/// Maps each handle of a batch to its section index
#[derive(Debug, Clone, Default)]
pub struct ProxyInfo {
    sections: HashMap<HandleKey, usize>,
    owner: Option<ProxyKey>,
}

impl ProxyInfo {
    /// Empty table with room for `capacity` handles
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sections: HashMap::with_capacity(capacity),
            owner: None,
        }
    }

    /// Record `handle` at `section`
    pub fn insert(&mut self, handle: HandleKey, section: usize) {
        self.sections.insert(handle, section);
    }

    /// Section index of `handle`
    pub fn section_of(&self, handle: HandleKey) -> Option<usize> {
        self.sections.get(&handle).copied()
    }

    /// Proxy currently rendering this batch
    pub fn owner(&self) -> Option<ProxyKey> {
        self.owner
    }

    /// Set the proxy rendering this batch
    pub fn set_owner(&mut self, owner: Option<ProxyKey>) {
        self.owner = owner;
    }

    /// All (handle, section) pairs
    pub fn iter(&self) -> impl Iterator<Item = (HandleKey, usize)> + '_ {
        self.sections.iter().map(|(k, s)| (*k, *s))
    }

    /// Number of tracked handles
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether no handle is tracked
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Forget every handle and the owner
    pub fn clear(&mut self) {
        self.sections.clear();
        self.owner = None;
    }
}
