//! Shared types for monofs: the error taxonomy, id aliases, and the
//! fixed-width integer coding used by every on-disk key and record.

pub mod coding;
pub mod error;

pub use error::{FsError, Result};

/// Inode id type (u64). Id 1 is reserved for the filesystem root.
pub type InodeId = u64;

/// File-handle id type, assigned by the filesystem adapter.
pub type HandleId = u64;

/// The root inode id. Created at metadata-db open time when absent.
pub const ROOT_INODE_ID: InodeId = 1;
