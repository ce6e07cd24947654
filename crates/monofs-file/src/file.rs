//! An open file: block read-modify-write over a [`FileEngine`] with
//! in-memory size tracking.
//!
//! The size is seeded from the inode at open and extended by writes; it
//! is not written back into the inode here (metadata size updates are a
//! filesystem-layer concern).

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use monofs_types::{InodeId, Result};

use crate::engine::{FileEngine, BLOCK_SIZE};

pub struct FsFile {
    fs_name: String,
    inode: InodeId,
    hash: String,
    size: AtomicU64,
    engine: FileEngine,
}

impl FsFile {
    pub fn new(
        fs_name: &str,
        inode: InodeId,
        hash: &str,
        data_base_path: &Path,
        initial_size: u64,
    ) -> Result<Self> {
        let engine = FileEngine::new(inode, data_base_path, hash)?;
        Ok(Self {
            fs_name: fs_name.to_string(),
            inode,
            hash: hash.to_string(),
            size: AtomicU64::new(initial_size),
            engine,
        })
    }

    pub fn fs_name(&self) -> &str {
        &self.fs_name
    }

    pub fn inode(&self) -> InodeId {
        self.inode
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Current in-memory file size.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Read up to `size` bytes at `offset`. Short reads happen only at
    /// end of file; reads past it return an empty buffer.
    pub fn read_at(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let file_size = self.size();
        if size == 0 || offset >= file_size {
            return Ok(Vec::new());
        }
        let len = size.min(file_size - offset);
        let blocks = self.engine.allocate_blocks(offset, len)?;

        let mut out = vec![0u8; len as usize];
        for (block, data) in &blocks {
            copy_overlap(&mut out, offset, block * BLOCK_SIZE, data);
        }
        Ok(out)
    }

    /// Write `data` at `offset`, extending the in-memory size when the
    /// write reaches past the current end.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let len = data.len() as u64;
        let mut blocks = self.engine.allocate_blocks(offset, len)?;
        for (block, buf) in &mut blocks {
            copy_into_block(buf, block * BLOCK_SIZE, offset, data);
        }
        for (block, buf) in &blocks {
            self.engine.write_block(*block, buf)?;
        }
        self.size.fetch_max(offset + len, Ordering::AcqRel);
        Ok(data.len())
    }

    /// Force the data store to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.engine.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}

/// Copy the part of `block_data` (starting at absolute `block_start`)
/// that overlaps `out` (starting at absolute `out_start`).
fn copy_overlap(out: &mut [u8], out_start: u64, block_start: u64, block_data: &[u8]) {
    let out_end = out_start + out.len() as u64;
    let block_end = block_start + block_data.len() as u64;
    let lo = out_start.max(block_start);
    let hi = out_end.min(block_end);
    if lo >= hi {
        return;
    }
    let dst = (lo - out_start) as usize..(hi - out_start) as usize;
    let src = (lo - block_start) as usize..(hi - block_start) as usize;
    out[dst].copy_from_slice(&block_data[src]);
}

/// Copy the part of `data` (at absolute `data_start`) that lands inside
/// the block buffer starting at absolute `block_start`.
fn copy_into_block(block: &mut [u8], block_start: u64, data_start: u64, data: &[u8]) {
    let block_end = block_start + block.len() as u64;
    let data_end = data_start + data.len() as u64;
    let lo = block_start.max(data_start);
    let hi = block_end.min(data_end);
    if lo >= hi {
        return;
    }
    let dst = (lo - block_start) as usize..(hi - block_start) as usize;
    let src = (lo - data_start) as usize..(hi - data_start) as usize;
    block[dst].copy_from_slice(&data[src]);
}
