use indexmap::IndexMap;

use crate::resource::index_entry::ResourceIndexEntry;
use crate::resource::resource_key::ResourceKey;

/// The keyed collection of index entries owned by a package.
///
/// Keys are unique: inserting an entry whose key is already present replaces the previous
/// entry (last write wins). Deleted entries stay in the index as tombstones until
/// [PackageIndex::compact] is called, and are invisible to lookups and active iteration.
#[derive(Clone, Debug, Default)]
pub struct PackageIndex {
    entries: IndexMap<ResourceKey, ResourceIndexEntry>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_deleted).count()
    }

    /// Finds the live entry for `key`.
    pub fn lookup(&self, key: &ResourceKey) -> Option<&ResourceIndexEntry> {
        self.entries.get(key).filter(|entry| !entry.is_deleted)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Inserts `entry`, replacing any entry (live or tombstoned) with the same key.
    ///
    /// Returns the replaced entry.
    pub fn insert_or_replace(&mut self, entry: ResourceIndexEntry) -> Option<ResourceIndexEntry> {
        self.entries.insert(entry.key, entry)
    }

    /// Tombstones the entry for `key`. Returns false if there is no live entry for it.
    pub fn mark_deleted(&mut self, key: &ResourceKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if !entry.is_deleted => {
                entry.is_deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Iterates live entries in index order.
    pub fn iter_active(&self) -> impl Iterator<Item = &ResourceIndexEntry> + '_ {
        self.entries.values().filter(|entry| !entry.is_deleted)
    }

    /// Iterates every entry, tombstones included.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceIndexEntry> + '_ {
        self.entries.values()
    }

    /// Drops all tombstones. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_deleted);
        before - self.entries.len()
    }
}

impl FromIterator<ResourceIndexEntry> for PackageIndex {
    fn from_iter<T: IntoIterator<Item = ResourceIndexEntry>>(iter: T) -> Self {
        let mut index = PackageIndex::new();
        for entry in iter {
            index.insert_or_replace(entry);
        }
        index
    }
}
