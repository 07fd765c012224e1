//! Columnar day-file header.
//!
//! Every columnar day file opens with a fixed 256-byte header:
//!
//! ```text
//! [magic: 6 bytes]          // schema tag, e.g. "L2COL\n"
//! [header_size: u16]        // 256
//! [version: u16]
//! [padding: u16 + u32]
//! [product: 16 bytes]       // NUL-padded tag
//! [day_start_s: u64]        // UTC day start, epoch seconds
//! [rows: u64]               // rows safely flushed
//! [capacity: u64]           // row capacity of the column arrays
//! [col_off: u64 x COLS]     // absolute byte offset of each column
//! [col_sz: u64 x COLS]      // element size of each column
//! [zero padding to 256]
//! ```

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Encoded size of a [`ColumnFileHeader`].
pub const COL_HEADER_SIZE: usize = 256;

/// Decoded form of the columnar day-file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFileHeader {
    /// Schema magic tag.
    pub magic: [u8; 6],
    /// Total header size in bytes, always 256.
    pub header_size: u16,
    /// Schema format version.
    pub version: u16,
    /// NUL-padded product tag.
    pub product: [u8; 16],
    /// UTC day start in epoch seconds.
    pub day_start_s: u64,
    /// Number of rows safely flushed to the column arrays.
    pub rows: u64,
    /// Row capacity of the column arrays.
    pub capacity: u64,
    /// Absolute byte offset of each column array.
    pub col_off: Vec<u64>,
    /// Element size in bytes of each column.
    pub col_sz: Vec<u64>,
}

impl ColumnFileHeader {
    /// Builds a fresh header for a day file with contiguous column arrays.
    pub fn new<S: Schema>(product: &str, day_start_s: u64, capacity: u64) -> Self {
        let mut product_tag = [0u8; 16];
        let bytes = product.as_bytes();
        let n = bytes.len().min(15);
        product_tag[..n].copy_from_slice(&bytes[..n]);

        let mut col_off = Vec::with_capacity(S::COLS);
        let mut col_sz = Vec::with_capacity(S::COLS);
        let mut off = COL_HEADER_SIZE as u64;
        for c in 0..S::COLS {
            col_off.push(off);
            col_sz.push(S::col_size(c) as u64);
            off += capacity * S::col_size(c) as u64;
        }

        Self {
            magic: S::MAGIC,
            header_size: COL_HEADER_SIZE as u16,
            version: S::VERSION,
            product: product_tag,
            day_start_s,
            rows: 0,
            capacity,
            col_off,
            col_sz,
        }
    }

    /// Total file size implied by the header's capacity and column sizes.
    pub fn file_bytes(&self) -> u64 {
        COL_HEADER_SIZE as u64 + self.capacity * self.col_sz.iter().sum::<u64>()
    }

    /// Serializes the header into the first [`COL_HEADER_SIZE`] bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[..COL_HEADER_SIZE].fill(0);
        let mut b = &mut buf[..COL_HEADER_SIZE];
        b.put_slice(&self.magic);
        b.put_u16_le(self.header_size);
        b.put_u16_le(self.version);
        b.put_u16_le(0); // padding
        b.put_u32_le(0); // padding
        b.put_slice(&self.product);
        b.put_u64_le(self.day_start_s);
        b.put_u64_le(self.rows);
        b.put_u64_le(self.capacity);
        for off in &self.col_off {
            b.put_u64_le(*off);
        }
        for sz in &self.col_sz {
            b.put_u64_le(*sz);
        }
    }

    /// Deserializes a header from the front of `src`, verifying the magic.
    pub fn decode<S: Schema>(src: &[u8]) -> Result<Self> {
        if src.len() < COL_HEADER_SIZE {
            return Err(Error::TooSmall { need: COL_HEADER_SIZE, have: src.len() });
        }

        let mut b = src;
        let mut magic = [0u8; 6];
        b.copy_to_slice(&mut magic);
        if magic != S::MAGIC {
            return Err(Error::bad_magic(&S::MAGIC, &magic));
        }

        let header_size = b.get_u16_le();
        let version = b.get_u16_le();
        let _pad16 = b.get_u16_le();
        let _pad32 = b.get_u32_le();
        let mut product = [0u8; 16];
        b.copy_to_slice(&mut product);
        let day_start_s = b.get_u64_le();
        let rows = b.get_u64_le();
        let capacity = b.get_u64_le();
        let mut col_off = Vec::with_capacity(S::COLS);
        for _ in 0..S::COLS {
            col_off.push(b.get_u64_le());
        }
        let mut col_sz = Vec::with_capacity(S::COLS);
        for _ in 0..S::COLS {
            col_sz.push(b.get_u64_le());
        }

        Ok(Self {
            magic,
            header_size,
            version,
            product,
            day_start_s,
            rows,
            capacity,
            col_off,
            col_sz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{L2Schema, L3Schema, VoiSchema};

    #[test]
    fn test_header_roundtrip() {
        let mut hdr = ColumnFileHeader::new::<L2Schema>("BTC-USD", 1_704_067_200, 1024);
        hdr.rows = 77;

        let mut buf = [0u8; COL_HEADER_SIZE];
        hdr.encode(&mut buf);

        let decoded = ColumnFileHeader::decode::<L2Schema>(&buf).unwrap();
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn test_column_layout_is_contiguous() {
        let hdr = ColumnFileHeader::new::<L3Schema>("ES", 0, 100);
        assert_eq!(hdr.col_off[0], 256);
        for c in 1..L3Schema::COLS {
            assert_eq!(hdr.col_off[c], hdr.col_off[c - 1] + 100 * hdr.col_sz[c - 1]);
        }
        assert_eq!(hdr.file_bytes(), 256 + 100 * (8 + 8 + 4 + 4 + 1 + 1));
    }

    #[test]
    fn test_wrong_schema_magic_rejected() {
        let hdr = ColumnFileHeader::new::<L2Schema>("BTC-USD", 0, 16);
        let mut buf = [0u8; COL_HEADER_SIZE];
        hdr.encode(&mut buf);

        let err = ColumnFileHeader::decode::<VoiSchema>(&buf).unwrap_err();
        assert!(matches!(err, Error::BadMagic { .. }));
    }

    #[test]
    fn test_long_product_truncated() {
        let hdr =
            ColumnFileHeader::new::<L2Schema>("A-VERY-LONG-PRODUCT-NAME", 0, 16);
        assert_eq!(hdr.product[15], 0, "tag keeps a trailing NUL");
    }
}
