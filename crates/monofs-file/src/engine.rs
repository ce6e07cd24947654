//! Block-addressed data engine for one file inode.
//!
//! Content lives in a per-file KV store named by the inode's hash under
//! the local data path, keyed by big-endian 4 KiB block index. The
//! engine reaches its store through the [`Store`] capability set, so a
//! remote-backed variant can slot in behind the same surface.

use std::collections::BTreeMap;
use std::path::Path;

use monofs_kvstore::{KvStore, Store};
use monofs_types::coding::u64_be;
use monofs_types::{FsError, InodeId, Result};

/// Fixed content block size.
pub const BLOCK_SIZE: u64 = 4096;

/// Maximum record size of a per-file store; one block plus headroom.
pub const MAX_BLOCK_RECORD_SIZE: usize = 8192;

pub struct FileEngine {
    inode: InodeId,
    hash: String,
    store: Box<dyn Store>,
}

impl FileEngine {
    /// Open the data store for `hash` under `base_path`, creating the
    /// directory and file on first use and recovering the block index
    /// from an existing log.
    pub fn new(inode: InodeId, base_path: &Path, hash: &str) -> Result<Self> {
        std::fs::create_dir_all(base_path)?;
        let store = KvStore::open(base_path.join(hash), MAX_BLOCK_RECORD_SIZE)?;
        store.rebuild_index()?;
        tracing::debug!(inode, hash, "opened file data store");
        Ok(Self {
            inode,
            hash: hash.to_string(),
            store: Box::new(store),
        })
    }

    pub fn inode(&self) -> InodeId {
        self.inode
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// The block indexes touched by `[offset, offset + data_len)`.
    pub fn pick_blocks(offset: u64, data_len: u64) -> Result<Vec<u64>> {
        if data_len == 0 {
            return Err(FsError::InvalidRange("zero-length block range".into()));
        }
        let end = offset
            .checked_add(data_len)
            .ok_or_else(|| FsError::InvalidRange("offset + data_len overflows u64".into()))?;
        let first = offset / BLOCK_SIZE;
        let last = (end - 1) / BLOCK_SIZE;
        Ok((first..=last).collect())
    }

    /// Fetch every touched block, substituting zero-filled buffers for
    /// blocks that were never written.
    pub fn allocate_blocks(&self, offset: u64, data_len: u64) -> Result<BTreeMap<u64, Vec<u8>>> {
        let blocks = Self::pick_blocks(offset, data_len)?;
        let mut out = BTreeMap::new();
        for block in blocks {
            out.insert(block, self.read_block_or_zeros(block)?);
        }
        Ok(out)
    }

    /// Read one block, zero-padded to [`BLOCK_SIZE`].
    pub fn read_block(&self, block: u64) -> Result<Vec<u8>> {
        let mut data = self.store.get(&u64_be(block))?;
        data.resize(BLOCK_SIZE as usize, 0);
        Ok(data)
    }

    /// Write one block.
    pub fn write_block(&self, block: u64, data: &[u8]) -> Result<()> {
        if data.len() as u64 > BLOCK_SIZE {
            return Err(FsError::InvalidRange(format!(
                "block of {} bytes exceeds block size {BLOCK_SIZE}",
                data.len()
            )));
        }
        self.store.put(&u64_be(block), data)
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    fn read_block_or_zeros(&self, block: u64) -> Result<Vec<u8>> {
        match self.read_block(block) {
            Ok(data) => Ok(data),
            Err(FsError::NotFound) => Ok(vec![0u8; BLOCK_SIZE as usize]),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> FileEngine {
        FileEngine::new(7, dir.path(), "cafe.head").unwrap()
    }

    #[test]
    fn test_pick_blocks_single() {
        assert_eq!(FileEngine::pick_blocks(0, 1).unwrap(), vec![0]);
        assert_eq!(FileEngine::pick_blocks(4095, 1).unwrap(), vec![0]);
        assert_eq!(FileEngine::pick_blocks(4096, 4096).unwrap(), vec![1]);
    }

    #[test]
    fn test_pick_blocks_spanning() {
        assert_eq!(FileEngine::pick_blocks(4095, 2).unwrap(), vec![0, 1]);
        assert_eq!(
            FileEngine::pick_blocks(0, 3 * 4096 + 1).unwrap(),
            vec![0, 1, 2, 3]
        );
        // Every block in the run is present, not just the endpoints.
        assert_eq!(FileEngine::pick_blocks(100, 5 * 4096).unwrap().len(), 6);
    }

    #[test]
    fn test_pick_blocks_invalid() {
        assert!(matches!(
            FileEngine::pick_blocks(0, 0),
            Err(FsError::InvalidRange(_))
        ));
        assert!(matches!(
            FileEngine::pick_blocks(u64::MAX, 2),
            Err(FsError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_write_read_block() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.write_block(3, b"short").unwrap();
        let data = engine.read_block(3).unwrap();
        assert_eq!(data.len(), BLOCK_SIZE as usize);
        assert_eq!(&data[..5], b"short");
        assert!(data[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocate_blocks_mixes_existing_and_zeros() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine.write_block(1, &[0xAA; 4096]).unwrap();
        let blocks = engine.allocate_blocks(0, 3 * 4096).unwrap();
        assert_eq!(blocks.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(blocks[&0].iter().all(|&b| b == 0));
        assert!(blocks[&1].iter().all(|&b| b == 0xAA));
        assert!(blocks[&2].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_oversized_block_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        assert!(matches!(
            engine.write_block(0, &[0u8; 4097]),
            Err(FsError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_blocks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let engine = engine(&dir);
            engine.write_block(0, b"persisted").unwrap();
            engine.close().unwrap();
        }
        let engine = engine(&dir);
        assert_eq!(&engine.read_block(0).unwrap()[..9], b"persisted");
    }
}
