//! Attribute operations and statfs.

use monofs_metadb::InodeAttributes;
use monofs_stat::{StatRequest, StatService};
use monofs_types::{InodeId, Result};

use crate::fs::{Monofs, StatFs};

/// A partial attribute update; unset fields keep their value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttrPatch {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime_ns: Option<i64>,
    pub mtime_ns: Option<i64>,
}

impl Monofs {
    /// Attribute lookup by inode id.
    pub fn get_inode_attributes(&self, inode_id: InodeId) -> Result<InodeAttributes> {
        self.metadb.get_inode_attributes(inode_id)
    }

    /// Apply an attribute patch under the inode's attribute lock.
    ///
    /// `ctime` always advances; a size change advances `mtime` too.
    pub fn set_inode_attributes(
        &self,
        inode_id: InodeId,
        patch: SetAttrPatch,
    ) -> Result<InodeAttributes> {
        let _inode_lock = self.inode_locks.lock(&inode_id);
        let mut attrs = self.metadb.get_inode_attributes(inode_id)?;
        let now = Self::now_ns();

        if let Some(mode) = patch.mode {
            // Permission bits only; the object kind is immutable.
            let kind_bits = attrs.mode & libc::S_IFMT as u32;
            attrs.mode = kind_bits | (mode & !(libc::S_IFMT as u32));
        }
        if let Some(uid) = patch.uid {
            attrs.uid = uid;
        }
        if let Some(gid) = patch.gid {
            attrs.gid = gid;
        }
        if let Some(size) = patch.size {
            if size != attrs.size {
                attrs.size = size;
                attrs.mtime_ns = now;
            }
        }
        if let Some(atime_ns) = patch.atime_ns {
            attrs.atime_ns = atime_ns;
        }
        if let Some(mtime_ns) = patch.mtime_ns {
            attrs.mtime_ns = mtime_ns;
        }
        attrs.ctime_ns = now;

        self.metadb
            .put_inode_attributes(inode_id, attrs.clone(), true)?;
        tracing::debug!(inode = inode_id, "set attributes");
        Ok(attrs)
    }

    /// Filesystem statistics, straight from the stat service.
    pub fn statfs(&self) -> Result<StatFs> {
        let rsp = self.stat.stat(&StatRequest {
            fs: self.name.clone(),
        })?;
        Ok(StatFs {
            block_size: rsp.block_size,
            blocks: rsp.blocks,
            blocks_free: rsp.blocks_free,
            blocks_available: rsp.blocks_available,
        })
    }
}
