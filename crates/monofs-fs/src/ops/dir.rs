//! Directory operations: lookup, mkdir, rmdir, and listing.

use monofs_metadb::Inode;
use monofs_types::{FsError, InodeId, Result};

use crate::fs::{Dirent, Monofs};

impl Monofs {
    /// Resolve `(parent, name)` to its inode.
    pub fn lookup(&self, parent: InodeId, name: &str) -> Result<Inode> {
        self.metadb.get_inode(parent, name)
    }

    /// Create a directory. Fails with `AlreadyExists` when the name is
    /// taken.
    pub fn mkdir(&self, parent: InodeId, name: &str, mode: u32) -> Result<Inode> {
        let _parent_lock = self.parent_locks.lock(&parent);
        match self.metadb.get_inode(parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let inode = Inode::new_directory(
            self.metadb.new_inode_id(),
            parent,
            name,
            mode,
            self.uid,
            self.gid,
            Self::now_ns(),
        );
        self.metadb.add_inode(&inode, true)?;
        tracing::debug!(parent, name, inode = inode.id, "mkdir");
        Ok(inode)
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, parent: InodeId, name: &str) -> Result<()> {
        let _parent_lock = self.parent_locks.lock(&parent);
        let inode = self.metadb.get_inode(parent, name)?;
        if !inode.attrs.is_directory() {
            return Err(FsError::NotDirectory);
        }
        if !self.metadb.list_children(inode.id)?.is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.metadb.delete_inode(&inode, false)?;
        tracing::debug!(parent, name, inode = inode.id, "rmdir");
        Ok(())
    }

    /// List a directory in name order.
    pub fn read_dir(&self, parent: InodeId) -> Result<Vec<Dirent>> {
        let _parent_lock = self.parent_locks.lock(&parent);
        let children = self.metadb.list_children(parent)?;
        let mut entries = Vec::with_capacity(children.len());
        for child in children {
            let attrs = match self.metadb.get_inode_attributes(child.inode_id) {
                Ok(attrs) => attrs,
                // The entry raced a removal on another parent's lock;
                // skip it rather than failing the whole listing.
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            entries.push(Dirent {
                inode_id: child.inode_id,
                name: child.name,
                kind: attrs.kind(),
            });
        }
        Ok(entries)
    }
}
