//! The monofs filesystem core.
//!
//! [`Monofs`] connects the operation verbs the kernel adapter consumes
//! to the metadata database, the per-file data engines, and the stat
//! service. Directory mutations are serialized by a striped per-parent
//! lock; attribute writes to one inode by a striped per-inode lock.

pub mod config;
pub mod fs;
pub mod ops;

pub use config::Config;
pub use fs::{Dirent, Monofs, StatFs};
pub use ops::attr::SetAttrPatch;
