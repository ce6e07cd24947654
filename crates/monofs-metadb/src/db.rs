//! [`MetaDb`]: the metadata database.
//!
//! Two KV stores live under the configured directory: `astore` keyed by
//! big-endian inode id holding attribute records, and `dstore` keyed by
//! `u64_be(parent) ∥ name` holding big-endian child ids. Attribute
//! writes go through a bounded write-back cache that a background task
//! drains periodically.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use monofs_kvstore::{KvStore, Store};
use monofs_types::coding::{get_u64_be, u64_be};
use monofs_types::{FsError, InodeId, Result, ROOT_INODE_ID};
use monofs_utils::PeriodicTask;

use crate::cache::InodeCache;
use crate::inode::{attr_key, dentry_key, dentry_prefix, unpack_dentry_key, Inode, InodeAttributes};

/// Maximum record size for both metadata stores.
pub const MAX_META_RECORD_SIZE: usize = 1024 * 1024;

/// One row of the parent→children secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub parent: InodeId,
    pub name: String,
    pub inode_id: InodeId,
}

#[derive(Debug, Clone)]
pub struct MetaDbOptions {
    /// Directory holding `astore` and `dstore`.
    pub path: PathBuf,
    /// Attribute-cache capacity.
    pub cache_size: usize,
    /// Interval of the background cache flush.
    pub flush_interval: Duration,
}

impl Default for MetaDbOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/monofs"),
            cache_size: 100,
            flush_interval: Duration::from_secs(1),
        }
    }
}

pub struct MetaDb {
    astore: Arc<KvStore>,
    dstore: KvStore,
    cache: InodeCache,
    next_inode_id: AtomicU64,
    flusher: Mutex<Option<PeriodicTask>>,
}

impl MetaDb {
    /// Open (or create) the metadata database under `options.path`.
    ///
    /// Rebuilds both store indexes, bootstraps the root inode when it is
    /// absent, seeds the id allocator from the largest stored id, and
    /// starts the periodic cache flusher.
    pub fn open(options: MetaDbOptions) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&options.path)?;
        let astore = Arc::new(KvStore::open(
            options.path.join("astore"),
            MAX_META_RECORD_SIZE,
        )?);
        astore.rebuild_index()?;
        let dstore = KvStore::open(options.path.join("dstore"), MAX_META_RECORD_SIZE)?;
        dstore.rebuild_index()?;

        let persist_store = astore.clone();
        let cache = InodeCache::new(
            options.cache_size.max(1),
            Box::new(move |id, attrs| persist_store.put(&attr_key(id), &attrs.pack()?)),
        );

        let max_id = astore
            .last_key()
            .and_then(|key| get_u64_be(&key))
            .unwrap_or(ROOT_INODE_ID);

        let db = Arc::new(Self {
            astore,
            dstore,
            cache,
            next_inode_id: AtomicU64::new(max_id + 1),
            flusher: Mutex::new(None),
        });

        db.bootstrap_root()?;

        let weak: Weak<MetaDb> = Arc::downgrade(&db);
        let flusher = PeriodicTask::spawn("monofs-metadb-flush", options.flush_interval, move || {
            if let Some(db) = weak.upgrade() {
                if let Err(e) = db.flush() {
                    tracing::warn!(error = %e, "periodic metadata flush failed");
                }
            }
        });
        *db.flusher.lock() = Some(flusher);

        Ok(db)
    }

    /// Create the root inode when this is a fresh database.
    fn bootstrap_root(&self) -> Result<()> {
        match self.get_inode_attributes(ROOT_INODE_ID) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
                let (uid, gid) = process_ids();
                let root =
                    Inode::new_directory(ROOT_INODE_ID, ROOT_INODE_ID, "/", 0o755, uid, gid, now_ns);
                self.astore.put(&root.attr_key(), &root.attrs.pack()?)?;
                tracing::info!(uid, gid, "created root inode");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Allocate a fresh inode id. Ids grow monotonically and never
    /// repeat for the life of the database.
    pub fn new_inode_id(&self) -> InodeId {
        self.next_inode_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Write an inode's attribute record and its directory entry.
    ///
    /// An existing `(parent, name)` entry is overwritten; the attribute
    /// row it pointed to is left behind. Callers that do not want
    /// resurrection semantics delete first.
    pub fn add_inode(&self, inode: &Inode, write_back: bool) -> Result<()> {
        self.put_inode_attributes(inode.id, inode.attrs.clone(), write_back)?;
        self.dstore
            .put(&inode.dentry_key(), &u64_be(inode.id))?;
        Ok(())
    }

    /// Resolve `(parent, name)` to a full inode.
    pub fn get_inode(&self, parent: InodeId, name: &str) -> Result<Inode> {
        let key = dentry_key(parent, name);
        let child = match self.dstore.get(&key) {
            Ok(value) => get_u64_be(&value).ok_or_else(|| {
                FsError::CorruptRecord("directory-entry value is not a u64".into())
            })?,
            Err(FsError::NotFound) => return Err(FsError::NoSuchInode),
            Err(e) => return Err(e),
        };
        let attrs = self.get_inode_attributes(child)?;
        Ok(Inode {
            id: child,
            parent,
            name: name.to_string(),
            attrs,
        })
    }

    /// Attribute lookup, cache first.
    pub fn get_inode_attributes(&self, id: InodeId) -> Result<InodeAttributes> {
        match self.cache.get(id) {
            Ok(attrs) => return Ok(attrs),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }
        match self.astore.get(&attr_key(id)) {
            Ok(value) => InodeAttributes::unpack(&value),
            Err(FsError::NotFound) => Err(FsError::NoSuchInode),
            Err(e) => Err(e),
        }
    }

    /// Write an attribute record, through the cache when `write_back`.
    pub fn put_inode_attributes(
        &self,
        id: InodeId,
        attrs: InodeAttributes,
        write_back: bool,
    ) -> Result<()> {
        if write_back {
            self.cache.put(id, attrs)
        } else {
            // Drop any cached copy so readers cannot resurrect the old
            // attributes after this direct write.
            self.cache.delete(id);
            self.astore.put(&attr_key(id), &attrs.pack()?)
        }
    }

    /// Remove an inode's directory entry and attribute record. Children
    /// are not cascaded; callers enforce directory emptiness.
    pub fn delete_inode(&self, inode: &Inode, _write_back: bool) -> Result<()> {
        self.cache.delete(inode.id);
        self.dstore.delete(&inode.dentry_key())?;
        self.astore.delete(&inode.attr_key())?;
        Ok(())
    }

    /// Remove only the `(parent, name)` directory entry, leaving the
    /// attribute row alone. Used when an inode keeps living under other
    /// names (extra hard links, rename sources).
    pub fn remove_dir_entry(&self, parent: InodeId, name: &str) -> Result<()> {
        self.dstore.delete(&dentry_key(parent, name))
    }

    /// All directory entries under `parent`, in name order.
    pub fn list_children(&self, parent: InodeId) -> Result<Vec<DirEntry>> {
        let prefix = dentry_prefix(parent);
        let records = self.dstore.search(&prefix, false)?;
        let mut entries = Vec::new();
        for record in records {
            if record.key.len() < 8 || record.key[..8] != prefix {
                break;
            }
            let (_, name) = unpack_dentry_key(&record.key)?;
            let inode_id = get_u64_be(&record.value).ok_or_else(|| {
                FsError::CorruptRecord("directory-entry value is not a u64".into())
            })?;
            entries.push(DirEntry {
                parent,
                name,
                inode_id,
            });
        }
        Ok(entries)
    }

    /// Drain the cache and force both stores to stable storage.
    pub fn flush(&self) -> Result<()> {
        self.cache.flush()?;
        self.astore.flush()?;
        self.dstore.flush()?;
        Ok(())
    }

    /// Stop the background flusher, drain everything, and sync.
    pub fn close(&self) -> Result<()> {
        if let Some(mut flusher) = self.flusher.lock().take() {
            flusher.stop();
        }
        self.flush()?;
        self.astore.close()?;
        self.dstore.close()?;
        Ok(())
    }

    /// Number of attribute records currently resident in the cache.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

fn process_ids() -> (u32, u32) {
    // SAFETY: getuid/getgid have no failure modes and touch no memory.
    unsafe { (libc::getuid(), libc::getgid()) }
}
