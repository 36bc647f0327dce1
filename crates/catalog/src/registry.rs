// Copyright The AgentSmith-Hub Authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

/// A simple keyed store. Exists as its own type so `Catalog`'s five live + five draft
/// registries share one implementation of get/insert/remove/iterate.
pub(crate) struct Registry<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub(crate) fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.entries.get_mut(id)
    }

    pub(crate) fn insert(&mut self, id: String, value: T) {
        let _ = self.entries.insert(id, value);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<T> {
        self.entries.remove(id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries.iter()
    }
}
