//! Keyed entity stores.
//!
//! Consumers write through the [`EntityStore`] seam and never own the
//! storage. A store keeps single records by ID plus any number of cached
//! listings (ordered ID lists keyed by whatever query produced them).
//!
//! A created record invalidates every listing, since the store cannot know
//! which queries it belongs to. A deleted record is purged from every
//! listing in place.

use std::collections::{BTreeMap, HashMap};

use beacon_core::entities::Entity;
use parking_lot::RwLock;

/// Keyed record storage for one entity kind.
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Look up one record.
    fn get(&self, id: &E::Id) -> Option<E>;

    /// Insert or replace a full record.
    fn set(&self, record: E);

    /// Merge a partial update into an existing record. Returns `false`
    /// without inserting anything when the ID is unknown.
    fn merge(&self, id: &E::Id, patch: &E::Patch) -> bool;

    /// Remove a record and purge it from every cached listing.
    fn remove(&self, id: &E::Id) -> Option<E>;

    /// Every record, ordered by ID.
    fn list(&self) -> Vec<E>;

    /// Drop every cached listing.
    fn invalidate_listings(&self);

    /// Remember the result of a listing query.
    fn cache_listing(&self, key: &str, ids: Vec<E::Id>);

    /// Records of a cached listing, in cached order. `None` when the
    /// listing is not cached.
    fn listing(&self, key: &str) -> Option<Vec<E>>;
}

struct Records<E: Entity> {
    by_id: BTreeMap<E::Id, E>,
    listings: HashMap<String, Vec<E::Id>>,
}

/// [`EntityStore`] backed by an in-process map.
pub struct InMemoryStore<E: Entity> {
    records: RwLock<Records<E>>,
}

impl<E: Entity> InMemoryStore<E> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Records {
                by_id: BTreeMap::new(),
                listings: HashMap::new(),
            }),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().by_id.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().by_id.is_empty()
    }

    /// Number of cached listings.
    pub fn listing_count(&self) -> usize {
        self.records.read().listings.len()
    }
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityStore<E> for InMemoryStore<E> {
    fn get(&self, id: &E::Id) -> Option<E> {
        self.records.read().by_id.get(id).cloned()
    }

    fn set(&self, record: E) {
        let _ = self
            .records
            .write()
            .by_id
            .insert(record.id().clone(), record);
    }

    fn merge(&self, id: &E::Id, patch: &E::Patch) -> bool {
        match self.records.write().by_id.get_mut(id) {
            Some(record) => {
                record.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    fn remove(&self, id: &E::Id) -> Option<E> {
        let mut records = self.records.write();
        for ids in records.listings.values_mut() {
            ids.retain(|listed| listed != id);
        }
        records.by_id.remove(id)
    }

    fn list(&self) -> Vec<E> {
        self.records.read().by_id.values().cloned().collect()
    }

    fn invalidate_listings(&self) {
        self.records.write().listings.clear();
    }

    fn cache_listing(&self, key: &str, ids: Vec<E::Id>) {
        let _ = self.records.write().listings.insert(key.to_string(), ids);
    }

    fn listing(&self, key: &str) -> Option<Vec<E>> {
        let records = self.records.read();
        let ids = records.listings.get(key)?;
        Some(
            ids.iter()
                .filter_map(|id| records.by_id.get(id).cloned())
                .collect(),
        )
    }
}

impl<E: Entity> std::fmt::Debug for InMemoryStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records = self.records.read();
        f.debug_struct("InMemoryStore")
            .field("kind", &E::KIND)
            .field("records", &records.by_id.len())
            .field("listings", &records.listings.len())
            .finish()
    }
}
