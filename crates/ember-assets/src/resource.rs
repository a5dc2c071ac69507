//! Source-file records.
//!
//! A resource is one source file: its path and cached metadata. Many
//! assets (same path, different params) can share one resource.
//! Resources are never removed; entries seeded from the metadata cache
//! start out unused and are marked used on first load.

use std::any::Any;

use ember_core::alloc::HashMap;

use crate::hash::hash_str;

pub(crate) struct Resource {
    /// Path the resource is addressed by.
    pub path: String,
    /// Path the bytes come from. Usually equal to `path`; the metadata
    /// cache can redirect it.
    pub real_path: String,
    pub type_index: usize,
    /// Whether any asset has actually loaded through this resource.
    pub used: bool,
    pub metadata: Option<Box<dyn Any + Send + Sync>>,
}

#[derive(Default)]
pub(crate) struct ResourceTable {
    entries: Vec<Resource>,
    by_path_hash: HashMap<u64, usize>,
}

impl ResourceTable {
    pub fn find(&self, path: &str) -> Option<usize> {
        self.by_path_hash.get(&hash_str(path)).copied()
    }

    /// Returns the resource for `path`, creating it if this is the
    /// first time the path is seen. Marks the entry used.
    pub fn resolve_or_create(&mut self, path: &str, type_index: usize) -> usize {
        if let Some(index) = self.find(path) {
            let entry = &mut self.entries[index];
            entry.used = true;
            return index;
        }
        let index = self.entries.len();
        self.entries.push(Resource {
            path: path.to_owned(),
            real_path: path.to_owned(),
            type_index,
            used: true,
            metadata: None,
        });
        self.by_path_hash.insert(hash_str(path), index);
        index
    }

    /// Inserts an entry seeded from the metadata cache. Existing
    /// entries for the same path win.
    pub fn insert_cached(&mut self, resource: Resource) {
        let key = hash_str(&resource.path);
        if self.by_path_hash.contains_key(&key) {
            return;
        }
        let index = self.entries.len();
        self.entries.push(resource);
        self.by_path_hash.insert(key, index);
    }

    pub fn get(&self, index: usize) -> &Resource {
        &self.entries[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Resource {
        &mut self.entries[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Resource)> {
        self.entries.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
