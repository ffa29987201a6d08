//! The fixed header at offset zero of an index file.
//!
//! Layout (32 bytes, little-endian):
//!
//! ```text
//! [0..8)   magic "SABLIDX\0"
//! [8..10)  format version major
//! [10..12) format version minor
//! [12..14) interior fanout
//! [14..16) leaf fanout
//! [16..18) declared value length
//! [18]     value mode (0 inline, 1 indirect)
//! [19]     reserved
//! [20..28) root page offset
//! [28..32) reserved
//! ```
//!
//! The geometry fields pin the file to the build that wrote it; opening
//! a file whose fanouts or value policy disagree with the caller's
//! options is refused rather than reinterpreted.

use crate::config::ValueMode;
use crate::error::{IndexError, Result};

pub const HEADER_LEN: usize = 32;
pub const MAGIC: [u8; 8] = *b"SABLIDX\0";
pub const FORMAT_VERSION_MAJOR: u16 = 1;
pub const FORMAT_VERSION_MINOR: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version_major: u16,
    pub version_minor: u16,
    pub node_cap: u16,
    pub leaf_cap: u16,
    pub value_len: u16,
    pub value_mode: ValueMode,
    /// Offset of the root page. Updated whenever the root splits or
    /// collapses, so reopening always lands on the current root.
    pub root_offset: u64,
}

impl Header {
    pub fn new(node_cap: u16, leaf_cap: u16, value_len: u16, value_mode: ValueMode) -> Self {
        Self {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            node_cap,
            leaf_cap,
            value_len,
            value_mode,
            root_offset: 0,
        }
    }

    pub fn write_to(&self, out: &mut [u8; HEADER_LEN]) {
        out.fill(0);
        out[0..8].copy_from_slice(&MAGIC);
        out[8..10].copy_from_slice(&self.version_major.to_le_bytes());
        out[10..12].copy_from_slice(&self.version_minor.to_le_bytes());
        out[12..14].copy_from_slice(&self.node_cap.to_le_bytes());
        out[14..16].copy_from_slice(&self.leaf_cap.to_le_bytes());
        out[16..18].copy_from_slice(&self.value_len.to_le_bytes());
        out[18] = match self.value_mode {
            ValueMode::Inline => 0,
            ValueMode::Indirect => 1,
        };
        out[20..28].copy_from_slice(&self.root_offset.to_le_bytes());
    }

    pub fn read_from(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        if bytes[0..8] != MAGIC {
            return Err(IndexError::Corruption("bad magic in index header".into()));
        }
        let version_major = u16::from_le_bytes([bytes[8], bytes[9]]);
        if version_major != FORMAT_VERSION_MAJOR {
            return Err(IndexError::Corruption(format!(
                "unsupported index format version {version_major}"
            )));
        }
        let value_mode = match bytes[18] {
            0 => ValueMode::Inline,
            1 => ValueMode::Indirect,
            other => {
                return Err(IndexError::Corruption(format!(
                    "unknown value mode byte {other}"
                )))
            }
        };
        Ok(Self {
            version_major,
            version_minor: u16::from_le_bytes([bytes[10], bytes[11]]),
            node_cap: u16::from_le_bytes([bytes[12], bytes[13]]),
            leaf_cap: u16::from_le_bytes([bytes[14], bytes[15]]),
            value_len: u16::from_le_bytes([bytes[16], bytes[17]]),
            value_mode,
            root_offset: u64::from_le_bytes(
                bytes[20..28]
                    .try_into()
                    .map_err(|_| IndexError::Corruption("failed to read root offset".into()))?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let mut header = Header::new(16, 32, 8, ValueMode::Indirect);
        header.root_offset = 4096;
        let mut buf = [0u8; HEADER_LEN];
        header.write_to(&mut buf);
        assert_eq!(Header::read_from(&buf).unwrap(), header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [0u8; HEADER_LEN];
        Header::new(16, 32, 8, ValueMode::Inline).write_to(&mut buf);
        buf[0] = b'X';
        assert!(matches!(
            Header::read_from(&buf),
            Err(IndexError::Corruption(_))
        ));
    }

    #[test]
    fn rejects_future_major_version() {
        let mut buf = [0u8; HEADER_LEN];
        Header::new(16, 32, 8, ValueMode::Inline).write_to(&mut buf);
        buf[8..10].copy_from_slice(&99u16.to_le_bytes());
        assert!(matches!(
            Header::read_from(&buf),
            Err(IndexError::Corruption(_))
        ));
    }
}
