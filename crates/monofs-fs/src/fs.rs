//! The [`Monofs`] core: shared state and construction.
//!
//! Lock discipline, in acquisition order: parent stripe(s) first (both
//! parents for rename, ordered by stripe index), then the target
//! inode's attribute stripe. The handle table is its own concurrent
//! map and is never held across I/O.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use monofs_file::FsFile;
use monofs_metadb::db::MetaDbOptions;
use monofs_metadb::{FileKind, MetaDb};
use monofs_stat::StatService;
use monofs_types::{HandleId, InodeId, Result};
use monofs_utils::{rand_string, Shards};

use crate::config::Config;

/// Stripe counts for the parent and inode locks.
const LOCK_STRIPES: usize = 64;

/// One directory listing row as the adapter consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub inode_id: InodeId,
    pub name: String,
    pub kind: FileKind,
}

/// Filesystem-level statistics, as reported by the stat service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
}

pub struct Monofs {
    pub(crate) config: Config,
    /// Exported name, also the `fs` field of stat requests.
    pub(crate) name: String,
    /// Snapshot label suffixed onto new file hashes.
    pub(crate) current_snapshot: String,
    pub(crate) metadb: Arc<MetaDb>,
    pub(crate) stat: Arc<dyn StatService>,
    pub(crate) handles: DashMap<HandleId, Arc<FsFile>>,
    pub(crate) parent_locks: Shards<()>,
    pub(crate) inode_locks: Shards<()>,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
}

impl Monofs {
    pub fn new(config: Config, stat: Arc<dyn StatService>) -> Result<Self> {
        let (name, current_snapshot) = config.split_name();
        let metadb = MetaDb::open(MetaDbOptions {
            path: config.path.clone(),
            cache_size: config.cache_size,
            flush_interval: config.flush_interval,
        })?;
        // SAFETY: getuid/getgid have no failure modes and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        tracing::info!(
            name = %name,
            snapshot = %current_snapshot,
            path = %config.path.display(),
            "opened filesystem"
        );
        Ok(Self {
            config,
            name,
            current_snapshot,
            metadb,
            stat,
            handles: DashMap::new(),
            parent_locks: Shards::with_default(LOCK_STRIPES),
            inode_locks: Shards::with_default(LOCK_STRIPES),
            uid,
            gid,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_snapshot(&self) -> &str {
        &self.current_snapshot
    }

    pub fn metadb(&self) -> &MetaDb {
        &self.metadb
    }

    /// Number of open file handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Drain caches and sync every store.
    pub fn flush(&self) -> Result<()> {
        self.metadb.flush()?;
        for entry in self.handles.iter() {
            entry.value().sync()?;
        }
        Ok(())
    }

    /// Flush, release every handle, and close the metadata database.
    pub fn close(&self) -> Result<()> {
        let open: Vec<HandleId> = self.handles.iter().map(|e| *e.key()).collect();
        for handle in open {
            if let Some((_, file)) = self.handles.remove(&handle) {
                file.close()?;
            }
        }
        self.metadb.close()
    }

    pub(crate) fn now_ns() -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
    }

    /// Content address for a new file's data store:
    /// `hex(sha256(name ∥ now ∥ random32)) ∥ "." ∥ snapshot`.
    pub(crate) fn next_file_hash(&self, name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(chrono::Utc::now().to_rfc3339().as_bytes());
        hasher.update(rand_string(32).as_bytes());
        format!(
            "{}.{}",
            monofs_types::coding::hex_encode(&hasher.finalize()),
            self.current_snapshot
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monofs_stat::MockStatService;
    use tempfile::TempDir;

    fn open_fs(dir: &TempDir) -> Monofs {
        let config = Config {
            path: dir.path().to_path_buf(),
            ..Config::default()
        };
        Monofs::new(config, Arc::new(MockStatService::new())).unwrap()
    }

    #[test]
    fn test_name_and_snapshot_split() {
        let dir = TempDir::new().unwrap();
        let fs = open_fs(&dir);
        assert_eq!(fs.name(), "monofs");
        assert_eq!(fs.current_snapshot(), "head");
    }

    #[test]
    fn test_file_hash_shape() {
        let dir = TempDir::new().unwrap();
        let fs = open_fs(&dir);
        let hash = fs.next_file_hash("report.txt");
        let (digest, snapshot) = hash.split_once('.').unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(snapshot, "head");
        // Salted, so two hashes for one name differ.
        assert_ne!(hash, fs.next_file_hash("report.txt"));
    }
}
