//! The inode model and its KV key/value packing.
//!
//! Attribute rows are keyed by the big-endian inode id and hold a
//! serde_json [`InodeAttributes`]. Directory entries are keyed by
//! `u64_be(parent) ∥ name_utf8` and hold the big-endian child id, so a
//! prefix scan of one parent returns its children in name order.

use serde::{Deserialize, Serialize};

use monofs_types::coding::{get_u64_be, u64_be};
use monofs_types::{FsError, InodeId, Result};

/// What kind of filesystem object a mode describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl FileKind {
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFREG as u32 => FileKind::File,
            m if m == libc::S_IFDIR as u32 => FileKind::Directory,
            m if m == libc::S_IFLNK as u32 => FileKind::Symlink,
            _ => FileKind::Other,
        }
    }
}

/// The attribute record of one inode. This is exactly what an attribute
/// row serializes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InodeAttributes {
    pub parent: InodeId,
    pub size: u64,
    pub nlink: u32,
    pub mode: u32,
    pub rdev: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime_ns: i64,
    pub mtime_ns: i64,
    pub ctime_ns: i64,
    /// Content address naming the file's data store; the link target for
    /// symlinks; empty for directories.
    #[serde(default)]
    pub hash: String,
}

impl InodeAttributes {
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    pub fn is_file(&self) -> bool {
        self.kind() == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind() == FileKind::Symlink
    }

    /// Serialize for storage as an attribute-row value.
    pub fn pack(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn unpack(value: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(value)?)
    }
}

/// A materialized inode: identity plus its attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct Inode {
    pub id: InodeId,
    pub parent: InodeId,
    pub name: String,
    pub attrs: InodeAttributes,
}

impl Inode {
    pub fn new_file(
        id: InodeId,
        parent: InodeId,
        name: impl Into<String>,
        mode: u32,
        uid: u32,
        gid: u32,
        hash: String,
        now_ns: i64,
    ) -> Self {
        Self {
            id,
            parent,
            name: name.into(),
            attrs: InodeAttributes {
                parent,
                size: 0,
                nlink: 1,
                mode: (mode & !(libc::S_IFMT as u32)) | libc::S_IFREG as u32,
                rdev: 0,
                uid,
                gid,
                atime_ns: now_ns,
                mtime_ns: now_ns,
                ctime_ns: now_ns,
                hash,
            },
        }
    }

    pub fn new_directory(
        id: InodeId,
        parent: InodeId,
        name: impl Into<String>,
        mode: u32,
        uid: u32,
        gid: u32,
        now_ns: i64,
    ) -> Self {
        Self {
            id,
            parent,
            name: name.into(),
            attrs: InodeAttributes {
                parent,
                size: 0,
                nlink: 1,
                mode: (mode & !(libc::S_IFMT as u32)) | libc::S_IFDIR as u32,
                rdev: 0,
                uid,
                gid,
                atime_ns: now_ns,
                mtime_ns: now_ns,
                ctime_ns: now_ns,
                hash: String::new(),
            },
        }
    }

    pub fn new_symlink(
        id: InodeId,
        parent: InodeId,
        name: impl Into<String>,
        target: impl Into<String>,
        uid: u32,
        gid: u32,
        now_ns: i64,
    ) -> Self {
        Self {
            id,
            parent,
            name: name.into(),
            attrs: InodeAttributes {
                parent,
                size: 0,
                nlink: 1,
                mode: 0o777 | libc::S_IFLNK as u32,
                rdev: 0,
                uid,
                gid,
                atime_ns: now_ns,
                mtime_ns: now_ns,
                ctime_ns: now_ns,
                hash: target.into(),
            },
        }
    }

    /// Attribute-row key for this inode.
    pub fn attr_key(&self) -> [u8; 8] {
        attr_key(self.id)
    }

    /// Directory-entry key for this inode's `(parent, name)`.
    pub fn dentry_key(&self) -> Vec<u8> {
        dentry_key(self.parent, &self.name)
    }
}

/// Attribute-row key for an inode id.
pub fn attr_key(id: InodeId) -> [u8; 8] {
    u64_be(id)
}

/// Directory-entry key: `u64_be(parent) ∥ name`.
pub fn dentry_key(parent: InodeId, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + name.len());
    key.extend_from_slice(&u64_be(parent));
    key.extend_from_slice(name.as_bytes());
    key
}

/// Prefix matching every directory entry under `parent`.
pub fn dentry_prefix(parent: InodeId) -> [u8; 8] {
    u64_be(parent)
}

/// Split a directory-entry key back into `(parent, name)`.
pub fn unpack_dentry_key(key: &[u8]) -> Result<(InodeId, String)> {
    let parent = get_u64_be(key)
        .ok_or_else(|| FsError::CorruptRecord("directory-entry key shorter than prefix".into()))?;
    let name = std::str::from_utf8(&key[8..])
        .map_err(|_| FsError::CorruptRecord("directory-entry name is not valid UTF-8".into()))?
        .to_string();
    Ok((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_mode() {
        assert_eq!(FileKind::from_mode(0o644 | libc::S_IFREG as u32), FileKind::File);
        assert_eq!(
            FileKind::from_mode(0o755 | libc::S_IFDIR as u32),
            FileKind::Directory
        );
        assert_eq!(
            FileKind::from_mode(0o777 | libc::S_IFLNK as u32),
            FileKind::Symlink
        );
        assert_eq!(FileKind::from_mode(0o644), FileKind::Other);
    }

    #[test]
    fn test_constructors_set_kind() {
        let f = Inode::new_file(10, 1, "f", 0o644, 1000, 100, "abc.head".into(), 7);
        assert!(f.attrs.is_file());
        assert_eq!(f.attrs.nlink, 1);
        assert_eq!(f.attrs.hash, "abc.head");

        let d = Inode::new_directory(11, 1, "d", 0o755, 1000, 100, 7);
        assert!(d.attrs.is_directory());
        assert!(d.attrs.hash.is_empty());

        let s = Inode::new_symlink(12, 1, "s", "/target", 1000, 100, 7);
        assert!(s.attrs.is_symlink());
        assert_eq!(s.attrs.hash, "/target");
        assert_eq!(s.attrs.mode & 0o777, 0o777);
    }

    #[test]
    fn test_attrs_pack_roundtrip() {
        let inode = Inode::new_file(42, 1, "f", 0o600, 0, 0, "h.head".into(), 123);
        let packed = inode.attrs.pack().unwrap();
        let restored = InodeAttributes::unpack(&packed).unwrap();
        assert_eq!(restored, inode.attrs);
    }

    #[test]
    fn test_dentry_key_layout() {
        let key = dentry_key(42, "hello.txt");
        assert_eq!(&key[..8], &u64_be(42));
        assert_eq!(&key[8..], b"hello.txt");
        let (parent, name) = unpack_dentry_key(&key).unwrap();
        assert_eq!(parent, 42);
        assert_eq!(name, "hello.txt");
    }

    #[test]
    fn test_dentry_prefix_scan_order() {
        // Big-endian parent prefix keeps all children of one parent
        // contiguous and in lexicographic name order.
        let mut keys = vec![
            dentry_key(2, "b"),
            dentry_key(2, "a"),
            dentry_key(1, "z"),
            dentry_key(256, "a"),
        ];
        keys.sort();
        assert_eq!(keys[0], dentry_key(1, "z"));
        assert_eq!(keys[1], dentry_key(2, "a"));
        assert_eq!(keys[2], dentry_key(2, "b"));
        assert_eq!(keys[3], dentry_key(256, "a"));
    }

    #[test]
    fn test_unpack_dentry_key_short() {
        assert!(unpack_dentry_key(&[1, 2, 3]).is_err());
    }
}
