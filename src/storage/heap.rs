//! Append-only value heap.
//!
//! In indirect value mode the leaf entry stores only a `u64` offset;
//! the payload itself lives in a sibling file managed here. Records are
//! fixed-length and append-only, so an offset handed out once stays
//! valid for the life of the index.

use crate::error::{IndexError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub struct ValueHeap {
    file: File,
    len: u64,
    record_len: usize,
}

impl ValueHeap {
    pub fn open(path: &Path, record_len: usize) -> Result<Self> {
        if record_len == 0 {
            return Err(IndexError::InvalidArgument(
                "indirect value records must not be empty".into(),
            ));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            record_len,
        })
    }

    /// Appends one record and returns its offset. `payload` may be
    /// shorter than the record length; the remainder is zero-filled.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        if payload.len() > self.record_len {
            return Err(IndexError::InvalidArgument(format!(
                "value of {} bytes exceeds declared length {}",
                payload.len(),
                self.record_len
            )));
        }
        let mut record = vec![0u8; self.record_len];
        record[..payload.len()].copy_from_slice(payload);
        let offset = self.len;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&record)?;
        self.len += self.record_len as u64;
        Ok(offset)
    }

    pub fn read(&mut self, offset: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(self.record_len as u64)
            .ok_or_else(|| IndexError::Corruption("value offset overflow".into()))?;
        if end > self.len || offset % self.record_len as u64 != 0 {
            return Err(IndexError::Corruption(format!(
                "value offset {offset} is not a record boundary in a heap of {} bytes",
                self.len
            )));
        }
        let mut record = vec![0u8; self.record_len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut record)?;
        Ok(record)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
