//! Append-only record-log key-value store.
//!
//! One store is a single on-disk file of CRC-framed records plus an
//! in-memory ordered key→offset index. Writes append; deletes append a
//! tombstone; the index always points at the latest live record for a
//! key and is rebuilt from the log after a crash.
//!
//! - [`record`] - the on-disk record codec.
//! - [`scanner`] - sequential parser over a record file.
//! - [`index`] - the in-memory ordered key→offset map.
//! - [`store`] - the [`KvStore`] itself and the [`Store`] capability set.

pub mod index;
pub mod record;
pub mod scanner;
pub mod store;

pub use index::OrderedIndex;
pub use record::{Record, FLAG_TOMBSTONE, HEADER_SIZE, META_SIZE};
pub use scanner::RecordScanner;
pub use store::{KvStore, Store};
