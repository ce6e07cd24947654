//! Sequential parser over a record file.
//!
//! Yields records in file order by peeking the 9-byte header for the two
//! length fields, then pulling exactly one frame and decoding it. EOF on
//! a record boundary ends the sequence; EOF mid-record is a
//! `TruncatedRecord`. CRC failures are surfaced, never skipped; recovery
//! policy belongs to the caller.

use std::io::{BufReader, ErrorKind, Read};

use monofs_types::coding::get_u32_le;
use monofs_types::{FsError, Result};

use crate::record::{Record, HEADER_SIZE, META_SIZE};

/// Round a buffer size up to whole 4 KiB pages.
fn buffer_size(max_record_size: usize) -> usize {
    (max_record_size + META_SIZE).div_ceil(4096) * 4096
}

pub struct RecordScanner<R: Read> {
    reader: BufReader<R>,
    max_record_size: usize,
    scratch: Vec<u8>,
    offset: u64,
    done: bool,
}

impl<R: Read> RecordScanner<R> {
    pub fn new(reader: R, max_record_size: usize) -> Self {
        let cap = buffer_size(max_record_size);
        Self {
            reader: BufReader::with_capacity(cap, reader),
            max_record_size,
            scratch: vec![0u8; cap],
            offset: 0,
            done: false,
        }
    }

    /// File offset of the next record to be yielded.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn next_record(&mut self) -> Option<Result<Record>> {
        match self.read_full_at(0, HEADER_SIZE) {
            Ok(0) => return None,
            Ok(n) if n < HEADER_SIZE => {
                return Some(Err(FsError::TruncatedRecord(self.offset)));
            }
            Ok(_) => {}
            Err(e) => return Some(Err(e.into())),
        }

        let key_len = get_u32_le(&self.scratch[1..5]).unwrap_or(0) as usize;
        let value_len = get_u32_le(&self.scratch[5..9]).unwrap_or(0) as usize;
        if key_len + value_len > self.max_record_size {
            return Some(Err(FsError::CorruptRecord(format!(
                "record at offset {} claims {} bytes, store maximum is {}",
                self.offset,
                key_len + value_len,
                self.max_record_size
            ))));
        }

        let total = META_SIZE + key_len + value_len;
        let rest = total - HEADER_SIZE;
        match self.read_full_at(HEADER_SIZE, rest) {
            Ok(n) if n < rest => {
                return Some(Err(FsError::TruncatedRecord(self.offset)));
            }
            Ok(_) => {}
            Err(e) => return Some(Err(e.into())),
        }

        match Record::decode(&self.scratch[..total]) {
            Ok(record) => {
                self.offset += total as u64;
                Some(Ok(record))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// Read into `scratch[start..start + len]` until full or EOF; returns
    /// bytes read.
    fn read_full_at(&mut self, start: usize, len: usize) -> std::io::Result<usize> {
        let mut n = 0;
        while n < len {
            match self.reader.read(&mut self.scratch[start + n..start + len]) {
                Ok(0) => break,
                Ok(m) => n += m,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(n)
    }
}

impl<R: Read> Iterator for RecordScanner<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_record();
        match &item {
            None | Some(Err(_)) => self.done = true,
            Some(Ok(_)) => {}
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn log_of(records: &[Record]) -> Vec<u8> {
        let mut log = Vec::new();
        for r in records {
            log.extend_from_slice(&r.encode());
        }
        log
    }

    #[test]
    fn test_scans_in_order() {
        let records = vec![
            Record::new(b"a".as_slice(), b"1".as_slice()),
            Record::new(b"b".as_slice(), b"2".as_slice()),
            Record::new(b"c".as_slice(), b"3".as_slice()),
        ];
        let scanned: Vec<Record> = RecordScanner::new(Cursor::new(log_of(&records)), 1024)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(scanned, records);
    }

    #[test]
    fn test_empty_input_ends_cleanly() {
        let mut scanner = RecordScanner::new(Cursor::new(Vec::new()), 1024);
        assert!(scanner.next().is_none());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_mid_record_eof_is_truncated() {
        let record = Record::new(b"hello".as_slice(), b"world".as_slice());
        let mut log = record.encode();
        log.extend_from_slice(&record.encode()[..7]);
        let mut scanner = RecordScanner::new(Cursor::new(log), 1024);
        assert!(scanner.next().unwrap().is_ok());
        let offset_before = scanner.offset();
        assert_eq!(offset_before, record.raw_size() as u64);
        match scanner.next() {
            Some(Err(FsError::TruncatedRecord(off))) => assert_eq!(off, offset_before),
            other => panic!("expected TruncatedRecord, got {other:?}"),
        }
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_crc_failure_is_surfaced_not_skipped() {
        let mut log = log_of(&[
            Record::new(b"good".as_slice(), b"1".as_slice()),
            Record::new(b"bad".as_slice(), b"2".as_slice()),
        ]);
        let flip_at = log.len() - 6; // inside the second record's payload
        log[flip_at] ^= 0x01;
        let mut scanner = RecordScanner::new(Cursor::new(log), 1024);
        assert!(scanner.next().unwrap().is_ok());
        assert!(matches!(
            scanner.next(),
            Some(Err(FsError::CorruptRecord(_)))
        ));
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_oversized_record_rejected() {
        let record = Record::new(b"key".as_slice(), vec![0u8; 256]);
        let mut scanner = RecordScanner::new(Cursor::new(record.encode()), 64);
        assert!(matches!(
            scanner.next(),
            Some(Err(FsError::CorruptRecord(_)))
        ));
    }

    #[test]
    fn test_buffer_size_is_page_aligned() {
        assert_eq!(buffer_size(1), 4096);
        assert_eq!(buffer_size(4096), 8192);
        assert_eq!(buffer_size(4096 - META_SIZE), 4096);
        assert_eq!(buffer_size(1024 * 1024), 1024 * 1024 + 4096);
    }
}
