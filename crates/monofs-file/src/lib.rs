//! Per-file data storage: a block-addressed engine over an append-log
//! store, and the open-file handle that does block read-modify-write.

pub mod engine;
pub mod file;

pub use engine::{FileEngine, BLOCK_SIZE, MAX_BLOCK_RECORD_SIZE};
pub use file::FsFile;
