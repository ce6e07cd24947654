//! Symlinks, hard links, unlink, and rename.

use monofs_metadb::Inode;
use monofs_types::{FsError, InodeId, Result};

use crate::fs::Monofs;

impl Monofs {
    /// Create a symlink whose `hash` carries the target path.
    pub fn create_symlink(
        &self,
        parent: InodeId,
        name: &str,
        target: &str,
    ) -> Result<Inode> {
        let _parent_lock = self.parent_locks.lock(&parent);
        match self.metadb.get_inode(parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let inode = Inode::new_symlink(
            self.metadb.new_inode_id(),
            parent,
            name,
            target,
            self.uid,
            self.gid,
            Self::now_ns(),
        );
        self.metadb.add_inode(&inode, true)?;
        tracing::debug!(parent, name, target, inode = inode.id, "create symlink");
        Ok(inode)
    }

    /// Read a symlink's target.
    pub fn read_symlink(&self, inode_id: InodeId) -> Result<String> {
        let attrs = self.metadb.get_inode_attributes(inode_id)?;
        if !attrs.is_symlink() {
            return Err(FsError::InvalidRange(format!(
                "inode {inode_id} is not a symlink"
            )));
        }
        Ok(attrs.hash)
    }

    /// Create an additional directory entry for `target_id` and bump
    /// its link count.
    pub fn create_link(
        &self,
        parent: InodeId,
        name: &str,
        target_id: InodeId,
    ) -> Result<Inode> {
        let _parent_lock = self.parent_locks.lock(&parent);
        match self.metadb.get_inode(parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let _inode_lock = self.inode_locks.lock(&target_id);
        let mut attrs = self.metadb.get_inode_attributes(target_id)?;
        attrs.nlink += 1;
        attrs.ctime_ns = Self::now_ns();
        let inode = Inode {
            id: target_id,
            parent,
            name: name.to_string(),
            attrs,
        };
        // One attribute row per id: writing it applies the new nlink to
        // every entry pointing at this inode.
        self.metadb.add_inode(&inode, true)?;
        tracing::debug!(parent, name, target = target_id, "create link");
        Ok(inode)
    }

    /// Remove a non-directory entry.
    ///
    /// Files with more links only lose one; symlinks and last links are
    /// deleted outright. Data stores are not reclaimed here.
    pub fn unlink(&self, parent: InodeId, name: &str) -> Result<()> {
        let _parent_lock = self.parent_locks.lock(&parent);
        let inode = self.metadb.get_inode(parent, name)?;
        if inode.attrs.is_directory() {
            return Err(FsError::IsDirectory);
        }
        if !inode.attrs.is_symlink() && inode.attrs.nlink > 1 {
            let _inode_lock = self.inode_locks.lock(&inode.id);
            let mut attrs = inode.attrs.clone();
            attrs.nlink -= 1;
            attrs.ctime_ns = Self::now_ns();
            self.metadb
                .put_inode_attributes(inode.id, attrs, true)?;
            self.metadb.remove_dir_entry(parent, name)?;
        } else {
            self.metadb.delete_inode(&inode, false)?;
        }
        tracing::debug!(parent, name, inode = inode.id, "unlink");
        Ok(())
    }

    /// Move an entry between directories.
    ///
    /// Both parent stripes are held for the whole delete-and-re-add, so
    /// no observer ever finds the entry in neither directory. An
    /// existing destination is replaced with POSIX kind checks.
    pub fn rename(
        &self,
        old_parent: InodeId,
        old_name: &str,
        new_parent: InodeId,
        new_name: &str,
    ) -> Result<()> {
        let _parent_locks = self.parent_locks.lock_pair(&old_parent, &new_parent);

        let mut inode = self.metadb.get_inode(old_parent, old_name)?;

        match self.metadb.get_inode(new_parent, new_name) {
            // Renaming onto itself (or onto another link to the same
            // inode) succeeds without touching anything.
            Ok(dest) if dest.id == inode.id => return Ok(()),
            Ok(dest) => self.replace_rename_destination(&inode, &dest)?,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.metadb.remove_dir_entry(old_parent, old_name)?;
        inode.parent = new_parent;
        inode.name = new_name.to_string();
        inode.attrs.parent = new_parent;
        let now = Self::now_ns();
        inode.attrs.mtime_ns = now;
        inode.attrs.atime_ns = now;
        self.metadb.add_inode(&inode, true)?;
        tracing::debug!(
            old_parent,
            old_name,
            new_parent,
            new_name,
            inode = inode.id,
            "rename"
        );
        Ok(())
    }

    /// Remove whatever sits at the rename destination.
    fn replace_rename_destination(&self, src: &Inode, dest: &Inode) -> Result<()> {
        if dest.attrs.is_directory() && !src.attrs.is_directory() {
            return Err(FsError::IsDirectory);
        }
        if !dest.attrs.is_directory() && src.attrs.is_directory() {
            return Err(FsError::NotDirectory);
        }
        if dest.attrs.is_directory() {
            if !self.metadb.list_children(dest.id)?.is_empty() {
                return Err(FsError::NotEmpty);
            }
            self.metadb.delete_inode(dest, false)
        } else if !dest.attrs.is_symlink() && dest.attrs.nlink > 1 {
            let _inode_lock = self.inode_locks.lock(&dest.id);
            let mut attrs = dest.attrs.clone();
            attrs.nlink -= 1;
            attrs.ctime_ns = Self::now_ns();
            self.metadb.put_inode_attributes(dest.id, attrs, true)?;
            self.metadb.remove_dir_entry(dest.parent, &dest.name)
        } else {
            self.metadb.delete_inode(dest, false)
        }
    }
}
