//! The append-log KV store.
//!
//! A store is one file opened read/write plus an [`OrderedIndex`]. All
//! mutations append a record and then update the index under a single
//! write lock, so readers observe the previous offset for a key until
//! the new record is fully on disk. Reads use positioned I/O and never
//! move a shared cursor.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use monofs_types::coding::get_u32_le;
use monofs_types::{FsError, Result};

use crate::index::OrderedIndex;
use crate::record::{Record, HEADER_SIZE, META_SIZE};
use crate::scanner::RecordScanner;

/// Capability set of a record store.
///
/// [`KvStore`] is the local append-log variant. `send` and `retrieve`
/// are reserved for shipping a store file to a remote blob service and
/// fail as unsupported until that lands.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    /// List records starting at `from_key`, ascending or descending.
    /// Every returned record is a fresh read from disk.
    fn search(&self, from_key: &[u8], descending: bool) -> Result<Vec<Record>>;
    /// Rebuild the in-memory index by replaying the log from offset 0.
    fn rebuild_index(&self) -> Result<()>;
    fn flush(&self) -> Result<()>;
    fn close(&self) -> Result<()>;

    fn send(&self, store_version: &str) -> Result<()> {
        let _ = store_version;
        Err(FsError::Unsupported("store shipping"))
    }

    fn retrieve(&self, store_version: &str) -> Result<()> {
        let _ = store_version;
        Err(FsError::Unsupported("store retrieval"))
    }
}

struct StoreInner {
    file: File,
    index: OrderedIndex,
}

pub struct KvStore {
    path: PathBuf,
    max_record_size: usize,
    inner: RwLock<StoreInner>,
}

impl KvStore {
    /// Open or create the store file at `path`.
    ///
    /// The index starts empty; call [`Store::rebuild_index`] to recover
    /// state from an existing log.
    pub fn open(path: impl AsRef<Path>, max_record_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)
            .map_err(|e| {
                FsError::Io(std::io::Error::new(
                    e.kind(),
                    format!("could not open store file {}: {e}", path.display()),
                ))
            })?;
        Ok(Self {
            path,
            max_record_size,
            inner: RwLock::new(StoreInner {
                file,
                index: OrderedIndex::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().index.is_empty()
    }

    /// The largest live key, if any.
    pub fn last_key(&self) -> Option<Vec<u8>> {
        self.inner.read().index.last().map(|(key, _)| key.to_vec())
    }

    /// Append one record and update the index, in that order, under the
    /// write lock.
    fn set(&self, key: &[u8], value: &[u8], tombstoned: bool) -> Result<()> {
        if key.len() + value.len() > self.max_record_size {
            return Err(FsError::InvalidRange(format!(
                "record of {} bytes exceeds store maximum {}",
                key.len() + value.len(),
                self.max_record_size
            )));
        }
        let mut record = Record::new(key, value);
        if tombstoned {
            record.tombstone();
        }
        let encoded = record.encode();

        let mut inner = self.inner.write();
        let offset = inner.file.seek(SeekFrom::End(0))?;
        inner.file.write_all(&encoded)?;
        if tombstoned {
            inner.index.delete(key);
        } else {
            inner.index.set(key, offset);
        }
        Ok(())
    }

    /// Positioned read of the record at `offset`.
    fn record_at(inner: &StoreInner, offset: u64, max_record_size: usize) -> Result<Record> {
        let mut header = [0u8; HEADER_SIZE];
        read_exact_at(&inner.file, &mut header, offset)?;
        let key_len = get_u32_le(&header[1..5]).unwrap_or(0) as usize;
        let value_len = get_u32_le(&header[5..9]).unwrap_or(0) as usize;
        if key_len + value_len > max_record_size {
            return Err(FsError::CorruptRecord(format!(
                "record at offset {offset} claims {} bytes, store maximum is {max_record_size}",
                key_len + value_len
            )));
        }
        let mut buf = vec![0u8; META_SIZE + key_len + value_len];
        read_exact_at(&inner.file, &mut buf, offset)?;
        Record::decode(&buf)
    }
}

fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.read_exact_at(buf, offset).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            FsError::TruncatedRecord(offset)
        } else {
            FsError::Io(e)
        }
    })
}

impl Store for KvStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        let offset = inner.index.get(key).ok_or(FsError::NotFound)?;
        let record = Self::record_at(&inner, offset, self.max_record_size)?;
        Ok(record.value)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.set(key, value, false)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        // The tombstone must reach the log so a rebuild replays the
        // deletion; dropping the index entry alone is not durable.
        self.set(key, &[], true)
    }

    fn search(&self, from_key: &[u8], descending: bool) -> Result<Vec<Record>> {
        let inner = self.inner.read();
        let offsets: Vec<u64> = inner
            .range_offsets(from_key, descending);
        let mut records = Vec::with_capacity(offsets.len());
        for offset in offsets {
            records.push(Self::record_at(&inner, offset, self.max_record_size)?);
        }
        Ok(records)
    }

    fn rebuild_index(&self) -> Result<()> {
        let mut inner = self.inner.write();
        // Scan through an independent handle; the write lock keeps
        // appenders out for the duration.
        let file = File::open(&self.path)?;
        let scanner = RecordScanner::new(file, self.max_record_size);
        inner.index.clear();
        let mut offset: u64 = 0;
        let mut replayed: u64 = 0;
        for item in scanner {
            match item {
                Ok(record) => {
                    if record.is_tombstoned() {
                        inner.index.delete(&record.key);
                    } else {
                        inner.index.set(&record.key, offset);
                    }
                    offset += record.raw_size() as u64;
                    replayed += 1;
                }
                Err(FsError::CorruptRecord(reason)) => {
                    // A bad tail from an interrupted write; keep what
                    // replayed and let new appends continue at EOF.
                    tracing::warn!(
                        path = %self.path.display(),
                        offset,
                        %reason,
                        "rebuild stopped at corrupt record"
                    );
                    break;
                }
                Err(FsError::TruncatedRecord(at)) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        offset = at,
                        "rebuild stopped at truncated record"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::debug!(
            path = %self.path.display(),
            records = replayed,
            live_keys = inner.index.len(),
            "rebuilt index"
        );
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.inner.read().file.sync_all()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.flush()
    }
}

impl StoreInner {
    fn range_offsets(&self, from_key: &[u8], descending: bool) -> Vec<u64> {
        self.index
            .range(from_key, descending)
            .map(|(_, offset)| offset)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> KvStore {
        KvStore::open(dir.path().join("store"), 1024 * 1024).unwrap()
    }

    #[test]
    fn test_single_key_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put(b"hello", b"world").unwrap();
        store.put(b"allo", b"dlrow").unwrap();
        assert_eq!(store.get(b"hello").unwrap(), b"world");
        assert_eq!(store.get(b"allo").unwrap(), b"dlrow");
        store.delete(b"allo").unwrap();
        assert!(matches!(store.get(b"allo"), Err(FsError::NotFound)));
        assert_eq!(store.get(b"hello").unwrap(), b"world");
    }

    #[test]
    fn test_overwrite_returns_latest() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put(b"k", b"v1").unwrap();
        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), b"v2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_durable_rebuild() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            for i in 0..100 {
                store
                    .put(format!("key{i}").as_bytes(), format!("value{i}").as_bytes())
                    .unwrap();
            }
            store.close().unwrap();
        }
        let store = open_store(&dir);
        store.rebuild_index().unwrap();
        for i in 0..100 {
            assert_eq!(
                store.get(format!("key{i}").as_bytes()).unwrap(),
                format!("value{i}").as_bytes()
            );
        }
    }

    #[test]
    fn test_rebuild_replays_tombstones() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.put(b"keep", b"1").unwrap();
            store.put(b"drop", b"2").unwrap();
            store.delete(b"drop").unwrap();
            store.put(b"back", b"3").unwrap();
            store.delete(b"back").unwrap();
            store.put(b"back", b"4").unwrap();
            store.close().unwrap();
        }
        let store = open_store(&dir);
        store.rebuild_index().unwrap();
        assert_eq!(store.get(b"keep").unwrap(), b"1");
        assert!(matches!(store.get(b"drop"), Err(FsError::NotFound)));
        assert_eq!(store.get(b"back").unwrap(), b"4");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ordered_range_scan() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for key in ["hello", "hello1", "hello2", "hello3", "hello4", "hello5"] {
            store.put(key.as_bytes(), key.as_bytes()).unwrap();
        }
        let ascending: Vec<Vec<u8>> = store
            .search(b"hello2", false)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(
            ascending,
            vec![
                b"hello2".to_vec(),
                b"hello3".to_vec(),
                b"hello4".to_vec(),
                b"hello5".to_vec()
            ]
        );
        let descending: Vec<Vec<u8>> = store
            .search(b"hello3", true)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(
            descending,
            vec![
                b"hello3".to_vec(),
                b"hello2".to_vec(),
                b"hello1".to_vec(),
                b"hello".to_vec()
            ]
        );
    }

    #[test]
    fn test_search_reads_fresh_values() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put(b"a", b"old").unwrap();
        store.put(b"a", b"new").unwrap();
        let records = store.search(b"", false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, b"new");
    }

    #[test]
    fn test_rebuild_tolerates_corrupt_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        {
            let store = KvStore::open(&path, 1024).unwrap();
            store.put(b"a", b"1").unwrap();
            store.put(b"b", b"2").unwrap();
            store.close().unwrap();
        }
        // Simulate a writer dying mid-append.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            let partial = Record::new(b"c".as_slice(), b"3".as_slice()).encode();
            file.write_all(&partial[..partial.len() - 5]).unwrap();
        }
        let store = KvStore::open(&path, 1024).unwrap();
        store.rebuild_index().unwrap();
        assert_eq!(store.get(b"a").unwrap(), b"1");
        assert_eq!(store.get(b"b").unwrap(), b"2");
        assert!(matches!(store.get(b"c"), Err(FsError::NotFound)));
        // The store stays writable after the bad tail.
        store.put(b"d", b"4").unwrap();
        assert_eq!(store.get(b"d").unwrap(), b"4");
    }

    #[test]
    fn test_oversized_put_rejected() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(dir.path().join("store"), 16).unwrap();
        assert!(matches!(
            store.put(b"key", &[0u8; 32]),
            Err(FsError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_store(&dir));
        store.put(b"shared", b"init").unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..200u32 {
                    store.put(b"shared", &i.to_le_bytes()).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        // Always sees a complete value, never a torn one.
                        let v = store.get(b"shared").unwrap();
                        assert!(v == b"init" || v.len() == 4);
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.get(b"shared").unwrap(), 199u32.to_le_bytes());
    }
}
