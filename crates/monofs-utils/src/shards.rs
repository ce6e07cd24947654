use parking_lot::{Mutex, MutexGuard};
use std::hash::{Hash, Hasher};

/// Striped mutex set for reducing lock contention.
///
/// Keys hash to one of `num_shards` mutexes; operations on the same key
/// always contend on the same stripe.
pub struct Shards<T> {
    shards: Vec<Mutex<T>>,
}

impl<T> Shards<T> {
    pub fn new(num_shards: usize, init: impl Fn() -> T) -> Self {
        assert!(num_shards > 0, "Shards needs at least one stripe");
        let mut shards = Vec::with_capacity(num_shards);
        for _ in 0..num_shards {
            shards.push(Mutex::new(init()));
        }
        Self { shards }
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Lock the stripe owning `key`.
    pub fn lock<K: Hash>(&self, key: &K) -> MutexGuard<'_, T> {
        self.shards[self.shard_index(key)].lock()
    }

    /// Lock the stripes owning `a` and `b` without deadlocking.
    ///
    /// Stripes are acquired in index order, which is a global total order;
    /// raw key order is not enough since distinct keys can share a stripe.
    /// When both keys map to one stripe it is locked once and the second
    /// guard is `None`.
    pub fn lock_pair<K: Hash>(&self, a: &K, b: &K) -> (MutexGuard<'_, T>, Option<MutexGuard<'_, T>>) {
        let ia = self.shard_index(a);
        let ib = self.shard_index(b);
        if ia == ib {
            (self.shards[ia].lock(), None)
        } else {
            let (lo, hi) = if ia < ib { (ia, ib) } else { (ib, ia) };
            let first = self.shards[lo].lock();
            let second = self.shards[hi].lock();
            (first, Some(second))
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&mut T)) {
        for shard in &self.shards {
            f(&mut shard.lock());
        }
    }

    fn shard_index<K: Hash>(&self, key: &K) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as usize % self.shards.len()
    }
}

impl<T: Default> Shards<T> {
    pub fn with_default(num_shards: usize) -> Self {
        Self::new(num_shards, T::default)
    }
}
