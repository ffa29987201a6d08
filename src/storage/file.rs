//! Offset-addressed file access.
//!
//! Every page of the index lives at a fixed byte offset in one file.
//! [`RecordFile`] wraps the file handle with bounds-checked reads,
//! in-place writes, and end-of-file appends, and holds an exclusive
//! advisory lock for the life of the handle.

use crate::error::{IndexError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug)]
pub struct RecordFile {
    file: File,
    len: u64,
}

impl RecordFile {
    /// Opens (creating if absent) the file at `path` and takes an
    /// exclusive lock. Returns the handle and whether the file was
    /// freshly created.
    pub fn open(path: &Path) -> Result<(Self, bool)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| {
            IndexError::InvalidArgument(format!(
                "index file {} is locked by another process",
                path.display()
            ))
        })?;
        let len = file.metadata()?.len();
        Ok((Self { file, len }, len == 0))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Fills `buf` from `offset`. Reading past the end of the file is
    /// corruption: offsets only ever come from pages we wrote.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| IndexError::Corruption("record offset overflow".into()))?;
        if end > self.len {
            return Err(IndexError::Corruption(format!(
                "read of {} bytes at offset {offset} past file end {}",
                buf.len(),
                self.len
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes `buf` at `offset`, extending the file if the write runs
    /// past the current end.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        self.len = self.len.max(offset + buf.len() as u64);
        Ok(())
    }

    /// Appends `buf` at the end of the file and returns the offset it
    /// landed at.
    pub fn append(&mut self, buf: &[u8]) -> Result<u64> {
        let offset = self.len;
        self.write_at(offset, buf)?;
        Ok(offset)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");
        let (mut file, created) = RecordFile::open(&path).unwrap();
        assert!(created);

        let a = file.append(b"hello").unwrap();
        let b = file.append(b"world").unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 5);

        let mut buf = [0u8; 5];
        file.read_at(b, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn read_past_end_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let (mut file, _) = RecordFile::open(&dir.path().join("records")).unwrap();
        file.append(b"abc").unwrap();
        let mut buf = [0u8; 8];
        let err = file.read_at(0, &mut buf).expect_err("short file should fail");
        assert!(matches!(err, IndexError::Corruption(_)));
    }

    #[test]
    fn second_open_is_rejected_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");
        let (_file, _) = RecordFile::open(&path).unwrap();
        let err = RecordFile::open(&path).expect_err("lock should exclude a second opener");
        assert!(matches!(err, IndexError::InvalidArgument(_)));
    }

    #[test]
    fn reopen_sees_persisted_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records");
        {
            let (mut file, _) = RecordFile::open(&path).unwrap();
            file.append(&[7u8; 16]).unwrap();
            file.sync().unwrap();
        }
        let (file, created) = RecordFile::open(&path).unwrap();
        assert!(!created);
        assert_eq!(file.len(), 16);
    }
}
