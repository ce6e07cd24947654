//! The on-disk record codec.
//!
//! Layout, offsets in bytes:
//!
//! ```text
//! 0          flags (1)
//! 1..5       key_len   (u32 LE)
//! 5..9       value_len (u32 LE)
//! 9..9+K     key bytes
//! 9+K..9+K+V value bytes
//! ..+4       crc32 (u32 LE, IEEE polynomial over bytes 0..9+K+V)
//! ```

use monofs_types::coding::{get_u32_le, put_u32_le};
use monofs_types::{FsError, Result};

/// Size of the fixed header (flags + two length fields).
pub const HEADER_SIZE: usize = 9;

/// Header plus the trailing CRC.
pub const META_SIZE: usize = 13;

/// Flag bit marking a record as a tombstone for its key.
pub const FLAG_TOMBSTONE: u8 = 1 << 1;

/// One atomic unit of the record log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub flags: u8,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            flags: 0,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Mark this record as a deletion of its key.
    pub fn tombstone(&mut self) {
        self.flags |= FLAG_TOMBSTONE;
    }

    pub fn is_tombstoned(&self) -> bool {
        self.flags & FLAG_TOMBSTONE != 0
    }

    /// Encoded size of this record on disk.
    pub fn raw_size(&self) -> usize {
        META_SIZE + self.key.len() + self.value.len()
    }

    /// Encode to the on-disk frame, CRC included.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.raw_size());
        buf.push(self.flags);
        put_u32_le(&mut buf, self.key.len() as u32);
        put_u32_le(&mut buf, self.value.len() as u32);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        let crc = crc32fast::hash(&buf);
        put_u32_le(&mut buf, crc);
        buf
    }

    /// Decode one record from the front of `data`.
    ///
    /// Fails with `CorruptRecord` when the buffer cannot hold the frame
    /// the header announces, or when the CRC does not verify.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(FsError::CorruptRecord(format!(
                "{} bytes is shorter than the record header",
                data.len()
            )));
        }
        let flags = data[0];
        let key_len = get_u32_le(&data[1..5]).unwrap_or(0) as usize;
        let value_len = get_u32_le(&data[5..9]).unwrap_or(0) as usize;
        let value_end = HEADER_SIZE + key_len + value_len;
        let total = value_end + 4;
        if data.len() < total {
            return Err(FsError::CorruptRecord(format!(
                "record claims {} bytes, buffer holds {}",
                total,
                data.len()
            )));
        }
        let stored_crc = get_u32_le(&data[value_end..total]).unwrap_or(0);
        let crc = crc32fast::hash(&data[..value_end]);
        if crc != stored_crc {
            return Err(FsError::CorruptRecord(format!(
                "crc mismatch {crc:#010x} != {stored_crc:#010x}"
            )));
        }
        Ok(Self {
            flags,
            key: data[HEADER_SIZE..HEADER_SIZE + key_len].to_vec(),
            value: data[HEADER_SIZE + key_len..value_end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let record = Record::new(b"hello".as_slice(), b"world".as_slice());
        let bytes = record.encode();
        assert_eq!(bytes.len(), META_SIZE + 10);
        let decoded = Record::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_tombstoned());
    }

    #[test]
    fn test_tombstone_flag_survives() {
        let mut record = Record::new(b"key".as_slice(), Vec::new());
        record.tombstone();
        let decoded = Record::decode(&record.encode()).unwrap();
        assert!(decoded.is_tombstoned());
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let bytes = Record::new(b"k".as_slice(), b"v".as_slice()).encode();
        for byte in 0..bytes.len() {
            for bit in 0..8 {
                let mut flipped = bytes.clone();
                flipped[byte] ^= 1 << bit;
                match Record::decode(&flipped) {
                    Err(FsError::CorruptRecord(_)) => {}
                    other => panic!(
                        "flip of byte {byte} bit {bit} went undetected: {other:?}"
                    ),
                }
            }
        }
    }

    #[test]
    fn test_short_buffer() {
        let bytes = Record::new(b"hello".as_slice(), b"world".as_slice()).encode();
        assert!(matches!(
            Record::decode(&bytes[..bytes.len() - 1]),
            Err(FsError::CorruptRecord(_))
        ));
        assert!(matches!(
            Record::decode(&bytes[..4]),
            Err(FsError::CorruptRecord(_))
        ));
        assert!(matches!(
            Record::decode(&[]),
            Err(FsError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_empty_key_and_value() {
        let record = Record::new(Vec::new(), Vec::new());
        assert_eq!(record.raw_size(), META_SIZE);
        let decoded = Record::decode(&record.encode()).unwrap();
        assert!(decoded.key.is_empty());
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        // A buffer may hold more than one record; decode reads only the first.
        let mut bytes = Record::new(b"a".as_slice(), b"1".as_slice()).encode();
        bytes.extend_from_slice(&Record::new(b"b".as_slice(), b"2".as_slice()).encode());
        let decoded = Record::decode(&bytes).unwrap();
        assert_eq!(decoded.key, b"a");
    }
}
