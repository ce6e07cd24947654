//! Small shared utilities: striped locks, an LRU cache, random strings,
//! and a periodic background task.

pub mod background;
pub mod lru;
pub mod rand_string;
pub mod shards;

pub use background::PeriodicTask;
pub use lru::LruCache;
pub use rand_string::rand_string;
pub use shards::Shards;
