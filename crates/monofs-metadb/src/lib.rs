//! The metadata database: inode attributes and directory entries, layered
//! over two append-log KV stores with a write-back attribute cache.
//!
//! - [`inode`] - the inode model and its key/value packing.
//! - [`cache`] - bounded write-back cache over attribute rows.
//! - [`db`] - [`MetaDb`], the public metadata surface.

pub mod cache;
pub mod db;
pub mod inode;

pub use cache::InodeCache;
pub use db::{DirEntry, MetaDb, MetaDbOptions};
pub use inode::{FileKind, Inode, InodeAttributes};
