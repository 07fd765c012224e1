//! Block codec for the blocked day-file layout.
//!
//! A block stores a fixed batch of tick rows in five column slabs:
//!
//! ```text
//! [BlockHeader: 76 bytes]
//! [ts deltas, ts_bw bits each]
//! [zig-zag price deltas, px_bw bits each]
//! [sizes, raw little-endian f32]
//! [side flags, 1 bit each]
//! [type flags, 1 bit each]
//! ```
//!
//! Timestamps are stored as scaled deltas from the first row (the scale
//! divisor defaults to one millisecond, discarding finer resolution), prices
//! as zig-zag deltas from the first row's price. The bit widths are chosen
//! per block as the minimum covering the largest delta.

use bytes::{Buf, BufMut};

use crate::codec::bitpack::{
    ceil_log2, pack_bits, pack_u32, pack_u64, packed_len, unpack_bits, unpack_u32, unpack_u64,
    zigzag_decode32, zigzag_encode32,
};
use crate::error::{Error, Result};

/// 8-byte magic opening every block.
pub const BLOCK_MAGIC: [u8; 8] = *b"TKBLK\0v1";

/// Encoded size of a [`BlockHeader`].
pub const BLOCK_HEADER_SIZE: usize = 76;

/// Timestamp delta divisor in nanoseconds (millisecond resolution).
pub const DEFAULT_TS_SCALE_NS: u32 = 1_000_000;

/// A limit-order book event.
pub const KIND_LIMIT: u8 = b'L';

/// A trade event.
pub const KIND_TRADE: u8 = b'T';

/// One tick event as stored in the blocked layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRow {
    /// Event timestamp in epoch nanoseconds.
    pub ts_ns: u64,
    /// Price in ticks.
    pub price: u32,
    /// Event quantity.
    pub size: f32,
    /// Side flag; only bit 0 survives encoding.
    pub side: u8,
    /// Event kind, [`KIND_LIMIT`] or [`KIND_TRADE`].
    pub kind: u8,
}

/// Self-describing header of one encoded block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Format version, currently 1.
    pub version: u16,
    /// Reserved, 0.
    pub flags: u16,
    /// Rows in this block.
    pub n_rows: u32,
    /// First row's timestamp.
    pub base_ts: u64,
    /// First row's price.
    pub base_px: u32,
    /// Divisor applied to timestamp deltas.
    pub ts_scale_ns: u32,
    /// Bits per packed timestamp delta.
    pub ts_bw: u8,
    /// Bits per packed zig-zag price delta.
    pub px_bw: u8,
    /// Timestamp slab offset from block start.
    pub off_ts: u32,
    /// Timestamp slab length in bytes.
    pub len_ts: u32,
    /// Price slab offset.
    pub off_px: u32,
    /// Price slab length.
    pub len_px: u32,
    /// Size slab offset.
    pub off_sz: u32,
    /// Size slab length.
    pub len_sz: u32,
    /// Side slab offset.
    pub off_side: u32,
    /// Side slab length.
    pub len_side: u32,
    /// Type slab offset.
    pub off_type: u32,
    /// Type slab length.
    pub len_type: u32,
}

impl BlockHeader {
    /// Serializes the header into the first [`BLOCK_HEADER_SIZE`] bytes of `buf`.
    pub fn encode(&self, mut buf: &mut [u8]) {
        buf.put_slice(&BLOCK_MAGIC);
        buf.put_u16_le(self.version);
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.n_rows);
        buf.put_u64_le(self.base_ts);
        buf.put_u32_le(self.base_px);
        buf.put_u32_le(self.ts_scale_ns);
        buf.put_u8(self.ts_bw);
        buf.put_u8(self.px_bw);
        buf.put_u16_le(0); // reserved
        buf.put_u32_le(self.off_ts);
        buf.put_u32_le(self.len_ts);
        buf.put_u32_le(self.off_px);
        buf.put_u32_le(self.len_px);
        buf.put_u32_le(self.off_sz);
        buf.put_u32_le(self.len_sz);
        buf.put_u32_le(self.off_side);
        buf.put_u32_le(self.len_side);
        buf.put_u32_le(self.off_type);
        buf.put_u32_le(self.len_type);
    }

    /// Deserializes a header from the front of `src`, verifying the magic.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < BLOCK_HEADER_SIZE {
            return Err(Error::TooSmall { need: BLOCK_HEADER_SIZE, have: src.len() });
        }

        let mut src = src;
        let mut magic = [0u8; 8];
        src.copy_to_slice(&mut magic);
        if magic != BLOCK_MAGIC {
            return Err(Error::bad_magic(&BLOCK_MAGIC, &magic));
        }

        let version = src.get_u16_le();
        let flags = src.get_u16_le();
        let n_rows = src.get_u32_le();
        let base_ts = src.get_u64_le();
        let base_px = src.get_u32_le();
        let ts_scale_ns = src.get_u32_le();
        let ts_bw = src.get_u8();
        let px_bw = src.get_u8();
        let _reserved = src.get_u16_le();

        Ok(Self {
            version,
            flags,
            n_rows,
            base_ts,
            base_px,
            ts_scale_ns,
            ts_bw,
            px_bw,
            off_ts: src.get_u32_le(),
            len_ts: src.get_u32_le(),
            off_px: src.get_u32_le(),
            len_px: src.get_u32_le(),
            off_sz: src.get_u32_le(),
            len_sz: src.get_u32_le(),
            off_side: src.get_u32_le(),
            len_side: src.get_u32_le(),
            off_type: src.get_u32_le(),
            len_type: src.get_u32_le(),
        })
    }
}

/// Encodes `rows` as one block appended to `out`.
///
/// Appends nothing for an empty input.
pub fn encode_block(rows: &[TickRow], out: &mut Vec<u8>) {
    if rows.is_empty() {
        return;
    }

    let n = rows.len();
    let base_ts = rows[0].ts_ns;
    let base_px = rows[0].price;
    let ts_scale_ns = DEFAULT_TS_SCALE_NS;

    let mut ts_delta = Vec::with_capacity(n);
    let mut px_delta = Vec::with_capacity(n);
    let mut side = Vec::with_capacity(n);
    let mut kind = Vec::with_capacity(n);

    let mut max_dt = 0u64;
    let mut max_dxz = 0u32;
    for r in rows {
        let dt = r.ts_ns.wrapping_sub(base_ts) / ts_scale_ns as u64;
        ts_delta.push(dt);
        max_dt = max_dt.max(dt);

        let dx = (r.price as i64 - base_px as i64) as i32;
        let dz = zigzag_encode32(dx);
        px_delta.push(dz);
        max_dxz = max_dxz.max(dz);

        side.push(r.side);
        kind.push((r.kind == KIND_TRADE) as u8);
    }

    let ts_bw = ceil_log2(max_dt + 1) as u8;
    let px_bw = ceil_log2(max_dxz as u64 + 1) as u8;

    let start = out.len();
    out.resize(start + BLOCK_HEADER_SIZE, 0);

    let off_ts = BLOCK_HEADER_SIZE as u32;
    let before = out.len();
    pack_u64(&ts_delta, ts_bw as u32, out);
    let len_ts = (out.len() - before) as u32;

    let off_px = off_ts + len_ts;
    let before = out.len();
    pack_u32(&px_delta, px_bw as u32, out);
    let len_px = (out.len() - before) as u32;

    let off_sz = off_px + len_px;
    for r in rows {
        out.extend_from_slice(&r.size.to_le_bytes());
    }
    let len_sz = (n * 4) as u32;

    let off_side = off_sz + len_sz;
    let before = out.len();
    pack_bits(&side, out);
    let len_side = (out.len() - before) as u32;

    let off_type = off_side + len_side;
    let before = out.len();
    pack_bits(&kind, out);
    let len_type = (out.len() - before) as u32;

    let hdr = BlockHeader {
        version: 1,
        flags: 0,
        n_rows: n as u32,
        base_ts,
        base_px,
        ts_scale_ns,
        ts_bw,
        px_bw,
        off_ts,
        len_ts,
        off_px,
        len_px,
        off_sz,
        len_sz,
        off_side,
        len_side,
        off_type,
        len_type,
    };
    hdr.encode(&mut out[start..start + BLOCK_HEADER_SIZE]);
}

/// Decodes one block from the front of `src` into `rows_out`.
///
/// On success returns the number of bytes the block occupies, so a caller
/// can advance past it even when a slab is zero-length. A zero-row block
/// consumes exactly the header and leaves `rows_out` unchanged; otherwise
/// `rows_out` is replaced with the decoded rows.
pub fn decode_block(src: &[u8], rows_out: &mut Vec<TickRow>) -> Result<usize> {
    let hdr = BlockHeader::decode(src)?;
    if hdr.n_rows == 0 {
        return Ok(BLOCK_HEADER_SIZE);
    }

    let n = hdr.n_rows as usize;
    let slabs = [
        (hdr.off_ts, hdr.len_ts),
        (hdr.off_px, hdr.len_px),
        (hdr.off_sz, hdr.len_sz),
        (hdr.off_side, hdr.len_side),
        (hdr.off_type, hdr.len_type),
    ];
    let mut end = BLOCK_HEADER_SIZE;
    for (off, len) in slabs {
        let slab_end = off as usize + len as usize;
        if slab_end > src.len() {
            return Err(Error::TooSmall { need: slab_end, have: src.len() });
        }
        end = end.max(slab_end);
    }
    let need = [
        packed_len(n, hdr.ts_bw as u32),
        packed_len(n, hdr.px_bw as u32),
        n * 4,
        n.div_ceil(8),
        n.div_ceil(8),
    ];
    for ((_, len), need) in slabs.iter().zip(need) {
        if (*len as usize) < need {
            return Err(Error::TooSmall { need, have: *len as usize });
        }
    }

    let slab = |off: u32, len: u32| &src[off as usize..off as usize + len as usize];

    let mut ts_delta = Vec::new();
    unpack_u64(slab(hdr.off_ts, hdr.len_ts), n, hdr.ts_bw as u32, &mut ts_delta);

    let mut px_delta = Vec::new();
    unpack_u32(slab(hdr.off_px, hdr.len_px), n, hdr.px_bw as u32, &mut px_delta);

    let mut side = Vec::new();
    unpack_bits(slab(hdr.off_side, hdr.len_side), n, &mut side);

    let mut kind = Vec::new();
    unpack_bits(slab(hdr.off_type, hdr.len_type), n, &mut kind);

    let sz = slab(hdr.off_sz, hdr.len_sz);

    rows_out.clear();
    rows_out.reserve(n);
    for i in 0..n {
        let dx = zigzag_decode32(px_delta[i]);
        let px = hdr.base_px as i64 + dx as i64;
        if px < 0 || px > u32::MAX as i64 {
            return Err(Error::PriceOverflow { base_px: hdr.base_px, delta: dx });
        }

        rows_out.push(TickRow {
            ts_ns: hdr.base_ts.wrapping_add(ts_delta[i].wrapping_mul(hdr.ts_scale_ns as u64)),
            price: px as u32,
            size: f32::from_le_bytes(sz[i * 4..i * 4 + 4].try_into().unwrap()),
            side: side[i],
            kind: if kind[i] == 1 { KIND_TRADE } else { KIND_LIMIT },
        });
    }

    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<TickRow> {
        (0..n)
            .map(|i| TickRow {
                ts_ns: i as u64 * 1_000_000,
                price: 10_000 + i as u32,
                size: 1.0,
                side: (i & 1) as u8,
                kind: KIND_LIMIT,
            })
            .collect()
    }

    #[test]
    fn test_empty_block_encodes_nothing() {
        let mut out = Vec::new();
        encode_block(&[], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_zero_row_header_consumes_header() {
        let mut buf = vec![0u8; BLOCK_HEADER_SIZE];
        BlockHeader { version: 1, ..Default::default() }.encode(&mut buf);

        let mut rows = vec![ramp(1)[0]];
        let consumed = decode_block(&buf, &mut rows).unwrap();
        assert_eq!(consumed, BLOCK_HEADER_SIZE);
        assert_eq!(rows.len(), 1, "rows_out must be left unchanged");
    }

    #[test]
    fn test_single_row_roundtrip() {
        let row = TickRow { ts_ns: 1_000_000_000, price: 10_000, size: 1.5, side: 1, kind: KIND_LIMIT };
        let mut out = Vec::new();
        encode_block(&[row], &mut out);

        let hdr = BlockHeader::decode(&out).unwrap();
        assert_eq!(hdr.n_rows, 1);
        assert_eq!(hdr.ts_bw, 1);
        assert_eq!(hdr.px_bw, 1);
        assert_eq!(hdr.base_ts, 1_000_000_000);
        assert_eq!(hdr.base_px, 10_000);

        let mut rows = Vec::new();
        let consumed = decode_block(&out, &mut rows).unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(rows, vec![row]);
    }

    #[test]
    fn test_monotonic_ramp_roundtrip() {
        let rows = ramp(8192);
        let mut out = Vec::new();
        encode_block(&rows, &mut out);

        let hdr = BlockHeader::decode(&out).unwrap();
        assert!(hdr.ts_bw <= 14, "ts_bw={}", hdr.ts_bw);
        assert!(hdr.px_bw <= 14, "px_bw={}", hdr.px_bw);
        assert_eq!(hdr.len_sz, 8192 * 4);
        assert_eq!(hdr.len_side, 1024);
        assert_eq!(hdr.len_type, 1024);
        assert_eq!(hdr.off_ts, BLOCK_HEADER_SIZE as u32);
        assert_eq!(hdr.off_px, hdr.off_ts + hdr.len_ts);
        assert_eq!(hdr.off_sz, hdr.off_px + hdr.len_px);

        let mut decoded = Vec::new();
        let consumed = decode_block(&out, &mut decoded).unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_minimal_bit_width() {
        for n in [2usize, 5, 17, 300] {
            let rows = ramp(n);
            let mut out = Vec::new();
            encode_block(&rows, &mut out);
            let hdr = BlockHeader::decode(&out).unwrap();

            let max_dt = (n as u64 - 1) * 1_000_000 / DEFAULT_TS_SCALE_NS as u64;
            assert!(max_dt < 1u64 << hdr.ts_bw);
            if hdr.ts_bw > 1 {
                assert!(max_dt >= 1u64 << (hdr.ts_bw - 1));
            }
        }
    }

    #[test]
    fn test_negative_price_delta_and_trades() {
        let rows = vec![
            TickRow { ts_ns: 5_000_000_000, price: 10_000, size: 2.5, side: 1, kind: KIND_TRADE },
            TickRow { ts_ns: 5_001_000_000, price: 9_990, size: 0.5, side: 0, kind: KIND_LIMIT },
            TickRow { ts_ns: 5_002_000_000, price: 10_010, size: 1.25, side: 1, kind: KIND_TRADE },
        ];
        let mut out = Vec::new();
        encode_block(&rows, &mut out);

        let mut decoded = Vec::new();
        decode_block(&out, &mut decoded).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_side_keeps_only_low_bit() {
        let rows = vec![
            TickRow { ts_ns: 0, price: 1, size: 0.0, side: 0xff, kind: KIND_LIMIT },
            TickRow { ts_ns: 0, price: 1, size: 0.0, side: 0x02, kind: KIND_LIMIT },
        ];
        let mut out = Vec::new();
        encode_block(&rows, &mut out);

        let mut decoded = Vec::new();
        decode_block(&out, &mut decoded).unwrap();
        assert_eq!(decoded[0].side, 1);
        assert_eq!(decoded[1].side, 0);
    }

    #[test]
    fn test_ts_scale_truncation() {
        // Sub-millisecond resolution is discarded by the default scale.
        let rows = vec![
            TickRow { ts_ns: 1_000_000_000, price: 5, size: 0.0, side: 0, kind: KIND_LIMIT },
            TickRow { ts_ns: 1_000_999_999, price: 5, size: 0.0, side: 0, kind: KIND_LIMIT },
        ];
        let mut out = Vec::new();
        encode_block(&rows, &mut out);

        let mut decoded = Vec::new();
        decode_block(&out, &mut decoded).unwrap();
        assert_eq!(decoded[1].ts_ns, 1_000_000_000);
    }

    #[test]
    fn test_decode_too_small() {
        let err = decode_block(&[0u8; 10], &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::TooSmall { need, have: 10 } if need == BLOCK_HEADER_SIZE));
    }

    #[test]
    fn test_decode_bad_magic() {
        let mut out = Vec::new();
        encode_block(&ramp(4), &mut out);
        out[0] ^= 0xff;

        let err = decode_block(&out, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::BadMagic { .. }));
    }

    #[test]
    fn test_decode_truncated_slab() {
        let mut out = Vec::new();
        encode_block(&ramp(100), &mut out);
        out.truncate(out.len() - 5);

        let err = decode_block(&out, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::TooSmall { .. }));
    }

    #[test]
    fn test_decode_price_overflow() {
        let rows = vec![
            TickRow { ts_ns: 0, price: 10, size: 0.0, side: 0, kind: KIND_LIMIT },
            TickRow { ts_ns: 0, price: 0, size: 0.0, side: 0, kind: KIND_LIMIT },
        ];
        let mut out = Vec::new();
        encode_block(&rows, &mut out);
        // Lower the base price below the largest negative delta.
        let mut hdr = BlockHeader::decode(&out).unwrap();
        hdr.base_px = 5;
        hdr.encode(&mut out[..BLOCK_HEADER_SIZE]);

        let err = decode_block(&out, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::PriceOverflow { base_px: 5, delta: -10 }));
    }

    #[test]
    fn test_large_random_roundtrip() {
        let mut state = 0x1234_5678_u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut ts = 1_700_000_000_000_000_000u64;
        let mut rows = Vec::new();
        for _ in 0..10_000 {
            ts += (next() % 50) * 1_000_000;
            rows.push(TickRow {
                ts_ns: ts,
                price: 1_000_000 + (next() % 2_000) as u32,
                size: (next() % 1_000) as f32 / 8.0,
                side: (next() & 1) as u8,
                kind: if next() & 1 == 0 { KIND_LIMIT } else { KIND_TRADE },
            });
        }

        let mut out = Vec::new();
        encode_block(&rows, &mut out);

        let mut decoded = Vec::new();
        let consumed = decode_block(&out, &mut decoded).unwrap();
        assert_eq!(consumed, out.len());
        assert_eq!(decoded, rows);
    }
}
