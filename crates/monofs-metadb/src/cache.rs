//! Bounded write-back cache over inode attribute rows.
//!
//! Entries inserted through [`InodeCache::put`] are dirty until a flush
//! or an eviction writes them through the persist callback supplied at
//! construction. The callback is how the metadata db hands the cache a
//! path back into its attribute store without a reference cycle.

use parking_lot::Mutex;

use monofs_types::{FsError, InodeId, Result};
use monofs_utils::lru::{LruCache, Pushed};

use crate::inode::InodeAttributes;

/// Writes one attribute record to durable storage.
pub type PersistFn = Box<dyn Fn(InodeId, &InodeAttributes) -> Result<()> + Send + Sync>;

struct Slot {
    attrs: InodeAttributes,
    dirty: bool,
}

pub struct InodeCache {
    inner: Mutex<LruCache<InodeId, Slot>>,
    persist: PersistFn,
}

impl InodeCache {
    pub fn new(capacity: usize, persist: PersistFn) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            persist,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Cache lookup. A miss is `NotFound`, which is distinct from any
    /// IO failure of the layers below.
    pub fn get(&self, id: InodeId) -> Result<InodeAttributes> {
        match self.inner.lock().get(&id) {
            Some(slot) => Ok(slot.attrs.clone()),
            None => Err(FsError::NotFound),
        }
    }

    /// Insert a dirty entry. When the cache is full the least-recently
    /// used entry is evicted first; if it is dirty it is written through
    /// before this call returns.
    pub fn put(&self, id: InodeId, attrs: InodeAttributes) -> Result<()> {
        let evicted = {
            let mut inner = self.inner.lock();
            match inner.push(id, Slot { attrs, dirty: true }) {
                Pushed::Evicted(victim_id, slot) if slot.dirty => Some((victim_id, slot)),
                _ => None,
            }
        };
        if let Some((victim_id, slot)) = evicted {
            (self.persist)(victim_id, &slot.attrs)?;
        }
        Ok(())
    }

    /// Drop an entry without persisting it.
    pub fn delete(&self, id: InodeId) -> Option<InodeAttributes> {
        self.inner.lock().remove(&id).map(|slot| slot.attrs)
    }

    /// Write every dirty entry through and mark it clean. Entries stay
    /// resident; only their dirtiness changes.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let dirty_ids: Vec<InodeId> = inner
            .iter()
            .filter(|(_, slot)| slot.dirty)
            .map(|(id, _)| *id)
            .collect();
        for id in dirty_ids {
            if let Some(slot) = inner.peek_mut(&id) {
                (self.persist)(id, &slot.attrs)?;
                slot.dirty = false;
            }
        }
        Ok(())
    }
}
