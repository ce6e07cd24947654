//! File operations: create, open, read, write, flush, release.

use std::sync::Arc;

use monofs_file::FsFile;
use monofs_metadb::Inode;
use monofs_types::{FsError, HandleId, InodeId, Result};

use crate::fs::Monofs;

impl Monofs {
    /// Create a file and install an open handle for it.
    ///
    /// When `(parent, name)` already exists the existing inode is
    /// returned and the handle opens it instead.
    pub fn create_file(
        &self,
        parent: InodeId,
        name: &str,
        mode: u32,
        handle: HandleId,
    ) -> Result<Inode> {
        let _parent_lock = self.parent_locks.lock(&parent);
        match self.metadb.get_inode(parent, name) {
            Ok(existing) => {
                if existing.attrs.is_directory() {
                    return Err(FsError::IsDirectory);
                }
                if !existing.attrs.is_file() {
                    return Err(FsError::AlreadyExists);
                }
                self.install_handle(&existing, handle)?;
                return Ok(existing);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let inode = Inode::new_file(
            self.metadb.new_inode_id(),
            parent,
            name,
            mode,
            self.uid,
            self.gid,
            self.next_file_hash(name),
            Self::now_ns(),
        );
        self.metadb.add_inode(&inode, true)?;
        self.install_handle(&inode, handle)?;
        tracing::debug!(parent, name, inode = inode.id, handle, "create file");
        Ok(inode)
    }

    /// Open an existing file inode under an adapter-assigned handle id.
    pub fn open_file(&self, inode_id: InodeId, handle: HandleId) -> Result<()> {
        let attrs = self.metadb.get_inode_attributes(inode_id)?;
        if attrs.is_directory() {
            return Err(FsError::IsDirectory);
        }
        if !attrs.is_file() {
            return Err(FsError::InvalidRange("open of a non-file inode".into()));
        }
        if attrs.hash.is_empty() {
            return Err(FsError::CorruptRecord(format!(
                "file inode {inode_id} has an empty hash"
            )));
        }
        let file = FsFile::new(
            &self.name,
            inode_id,
            &attrs.hash,
            &self.config.local_data_path(),
            attrs.size,
        )?;
        self.handles.insert(handle, Arc::new(file));
        tracing::debug!(inode = inode_id, handle, "open file");
        Ok(())
    }

    /// Read through an open handle.
    pub fn read_file(&self, handle: HandleId, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.handle(handle)?.read_at(offset, size)
    }

    /// Write through an open handle; extends the in-memory size.
    pub fn write_file(&self, handle: HandleId, offset: u64, data: &[u8]) -> Result<usize> {
        self.handle(handle)?.write_at(offset, data)
    }

    /// Force a handle's data store to stable storage.
    pub fn flush_file(&self, handle: HandleId) -> Result<()> {
        self.handle(handle)?.sync()
    }

    /// Same durability barrier as [`Monofs::flush_file`].
    pub fn sync_file(&self, handle: HandleId) -> Result<()> {
        self.handle(handle)?.sync()
    }

    /// Drop a handle from the table, syncing its store on the way out.
    pub fn release_handle(&self, handle: HandleId) -> Result<()> {
        match self.handles.remove(&handle) {
            Some((_, file)) => {
                file.close()?;
                tracing::debug!(inode = file.inode(), handle, "release handle");
                Ok(())
            }
            None => Err(FsError::InvalidHandle(handle)),
        }
    }

    fn install_handle(&self, inode: &Inode, handle: HandleId) -> Result<()> {
        let file = FsFile::new(
            &self.name,
            inode.id,
            &inode.attrs.hash,
            &self.config.local_data_path(),
            inode.attrs.size,
        )?;
        self.handles.insert(handle, Arc::new(file));
        Ok(())
    }

    fn handle(&self, handle: HandleId) -> Result<Arc<FsFile>> {
        self.handles
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or(FsError::InvalidHandle(handle))
    }
}
