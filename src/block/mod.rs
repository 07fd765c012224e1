//! Blocked day-file layout: append-side writer and streaming reader.
//!
//! A blocked day file is a 24-byte [`DayFileHeader`] followed by a sequence
//! of independently decodable compressed blocks (see [`crate::codec`]). One
//! file holds one product's events for one UTC calendar day.

pub mod reader;
pub mod writer;

pub use reader::{BlockReader, BlockRows};
pub use writer::BlockWriter;

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Encoded size of a [`DayFileHeader`].
pub const DAY_FILE_HEADER_SIZE: usize = 24;

/// Summary header at the front of a blocked day file.
///
/// The writer zeroes it on open and rewrites the final totals on close, so
/// a crashed file carries zero totals while its blocks remain recoverable by
/// a sequential scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayFileHeader {
    /// Sum of rows across all blocks.
    pub rows_total: u64,
    /// Total bytes of block payload following the header.
    pub bytes_total: u64,
    /// Calendar date of the file as `YYYYMMDD`.
    pub yyyymmdd: u32,
    /// Number of blocks in the file.
    pub blocks_total: u32,
}

impl DayFileHeader {
    /// Serializes the header into the first [`DAY_FILE_HEADER_SIZE`] bytes of `buf`.
    pub fn encode(&self, mut buf: &mut [u8]) {
        buf.put_u64_le(self.rows_total);
        buf.put_u64_le(self.bytes_total);
        buf.put_u32_le(self.yyyymmdd);
        buf.put_u32_le(self.blocks_total);
    }

    /// Deserializes a header from the front of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < DAY_FILE_HEADER_SIZE {
            return Err(Error::TooSmall { need: DAY_FILE_HEADER_SIZE, have: src.len() });
        }
        let mut src = src;
        Ok(Self {
            rows_total: src.get_u64_le(),
            bytes_total: src.get_u64_le(),
            yyyymmdd: src.get_u32_le(),
            blocks_total: src.get_u32_le(),
        })
    }
}
