//! Block writer: streams compressed blocks into a per-day file.
//!
//! The writer keeps at most one day file open. Blocks are encoded into a
//! reused scratch buffer and copied through a growing writable mapping
//! window; the file itself is preallocated in large chunks so the window can
//! extend without per-block metadata updates. On close the file is truncated
//! to its exact written size and the finalized [`DayFileHeader`] is written
//! back over the zeroed placeholder.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use memmap2::{Advice, MmapMut, MmapOptions};

use crate::block::{DayFileHeader, DAY_FILE_HEADER_SIZE};
use crate::codec::{encode_block, TickRow};
use crate::config::BlockWriterOptions;
use crate::error::{Error, Result};

/// Bytes appended between periodic data syncs.
const SYNC_INTERVAL: u64 = 64 << 20;

struct OpenDay {
    file: File,
    path: PathBuf,
    map: MmapMut,
    allocated: u64,
    file_off: u64,
    yyyymmdd: u32,
    rows_total: u64,
    bytes_total: u64,
    blocks_total: u32,
    bytes_since_sync: u64,
}

/// Appends encoded blocks to one day file at a time.
///
/// Usage:
/// ```no_run
/// use tickstore::{BlockWriter, BlockWriterOptions, TickRow};
///
/// let opts = BlockWriterOptions::new("/data", "BTC-USD");
/// let mut writer = BlockWriter::new(opts).unwrap();
/// writer.begin_day(20240815).unwrap();
/// writer.write_row(TickRow { ts_ns: 0, price: 100, size: 1.0, side: 0, kind: b'L' }).unwrap();
/// writer.close().unwrap();
/// ```
pub struct BlockWriter {
    opts: BlockWriterOptions,
    day: Option<OpenDay>,
    buf: Vec<TickRow>,
    block_buf: Vec<u8>,
}

impl BlockWriter {
    /// Creates a writer; no file is opened until [`BlockWriter::begin_day`].
    pub fn new(opts: BlockWriterOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self { opts, day: None, buf: Vec::new(), block_buf: Vec::new() })
    }

    /// True when a day file is open.
    pub fn is_open(&self) -> bool {
        self.day.is_some()
    }

    /// The date of the open day file, if any.
    pub fn current_day(&self) -> Option<u32> {
        self.day.as_ref().map(|d| d.yyyymmdd)
    }

    /// Switches to the given calendar day, closing any previous day file.
    ///
    /// A no-op when the writer is already on that day.
    pub fn begin_day(&mut self, yyyymmdd: u32) -> Result<()> {
        if self.current_day() == Some(yyyymmdd) {
            return Ok(());
        }
        self.flush_block()?;
        self.close()?;
        self.open_day_file(yyyymmdd)
    }

    /// Buffers one row, flushing a block when the buffer reaches `block_rows`.
    pub fn write_row(&mut self, row: TickRow) -> Result<()> {
        self.buf.push(row);
        if self.buf.len() >= self.opts.block_rows as usize {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Appends `rows` as one block, after flushing any buffered rows.
    ///
    /// Fails with [`Error::NotOpen`] unless a day file is open.
    pub fn write_block(&mut self, rows: &[TickRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if self.day.is_none() {
            return Err(Error::not_open("write_block called without begin_day"));
        }
        self.flush_block()?;
        self.append_rows_as_block(rows)
    }

    /// Flushes buffered rows, truncates the file to its exact size, writes
    /// the finalized day header, and syncs.
    ///
    /// A no-op when no day file is open. A failed header write leaves the
    /// file logically invalid and is fatal.
    pub fn close(&mut self) -> Result<()> {
        if self.day.is_none() {
            return Ok(());
        }
        self.flush_block()?;

        let Some(day) = self.day.take() else {
            return Ok(());
        };
        let OpenDay {
            file,
            path,
            map,
            file_off,
            yyyymmdd,
            rows_total,
            bytes_total,
            blocks_total,
            ..
        } = day;

        map.flush()?;
        drop(map);

        file.set_len(file_off)?;

        let hdr = DayFileHeader { rows_total, bytes_total, yyyymmdd, blocks_total };
        let mut hdr_buf = [0u8; DAY_FILE_HEADER_SIZE];
        hdr.encode(&mut hdr_buf);
        file.write_all_at(&hdr_buf, 0)?;
        file.sync_data()?;

        log::info!(
            "[blockwriter:{}] closed {} ({} rows, {} blocks, {} bytes)",
            yyyymmdd,
            path.display(),
            rows_total,
            blocks_total,
            bytes_total
        );
        Ok(())
    }

    fn open_day_file(&mut self, yyyymmdd: u32) -> Result<()> {
        let dir = self.opts.base_dir.join(format!("{}-BLOCKS", self.opts.product));
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{:08}.blocks", yyyymmdd));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::open_failed(format!("{}: {}", path.display(), e)))?;

        let map_len = align_up(DAY_FILE_HEADER_SIZE as u64 + self.opts.map_window, 4096);
        let allocated = align_up(map_len, self.opts.allocate_chunk);
        file.set_len(allocated)
            .map_err(|e| Error::allocate_failed(format!("{}: {}", path.display(), e)))?;

        let mut map = unsafe { MmapOptions::new().len(map_len as usize).map_mut(&file) }
            .map_err(|e| Error::open_failed(format!("mmap {}: {}", path.display(), e)))?;
        let _ = map.advise(Advice::Sequential);

        let hdr = DayFileHeader { yyyymmdd, ..Default::default() };
        hdr.encode(&mut map[..DAY_FILE_HEADER_SIZE]);
        map.flush_range(0, DAY_FILE_HEADER_SIZE)?;

        log::info!("[blockwriter:{}] opened {}", yyyymmdd, path.display());

        self.day = Some(OpenDay {
            file,
            path,
            map,
            allocated,
            file_off: DAY_FILE_HEADER_SIZE as u64,
            yyyymmdd,
            rows_total: 0,
            bytes_total: 0,
            blocks_total: 0,
            bytes_since_sync: 0,
        });
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.day.is_none() || self.buf.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.buf);
        let res = self.append_rows_as_block(&rows);
        self.buf = rows;
        self.buf.clear();
        res?;

        if let Some(day) = &self.day {
            day.file.sync_data()?;
        }
        Ok(())
    }

    fn append_rows_as_block(&mut self, rows: &[TickRow]) -> Result<()> {
        self.block_buf.clear();
        encode_block(rows, &mut self.block_buf);
        let len = self.block_buf.len() as u64;
        self.ensure_chunk(len)?;

        let day = self.day.as_mut().ok_or_else(|| Error::not_open("no day file open"))?;
        let off = day.file_off as usize;
        day.map[off..off + len as usize].copy_from_slice(&self.block_buf);

        day.file_off += len;
        day.rows_total += rows.len() as u64;
        day.bytes_total += len;
        day.bytes_since_sync += len;
        day.blocks_total += 1;

        if day.bytes_since_sync >= SYNC_INTERVAL {
            day.file.sync_data()?;
            day.bytes_since_sync = 0;
        }
        Ok(())
    }

    /// Guarantees the mapping covers `need` more bytes past the write cursor,
    /// extending the allocation and re-mapping a larger window as needed.
    /// The window may move; block payloads are always re-addressed from it.
    fn ensure_chunk(&mut self, need: u64) -> Result<()> {
        let day = self.day.as_mut().ok_or_else(|| Error::not_open("no day file open"))?;
        let min_len = day.file_off + need;
        if day.map.len() as u64 >= min_len {
            return Ok(());
        }

        let mut new_len = day.map.len() as u64;
        while new_len < min_len {
            new_len += self.opts.map_window;
        }

        if new_len > day.allocated {
            let rounded = align_up(new_len, self.opts.allocate_chunk);
            day.file
                .set_len(rounded)
                .map_err(|e| Error::allocate_failed(format!("{}: {}", day.path.display(), e)))?;
            day.allocated = rounded;
        }

        day.map.flush()?;
        let new_map = unsafe { MmapOptions::new().len(new_len as usize).map_mut(&day.file) }
            .map_err(|e| Error::remap_failed(format!("{}: {}", day.path.display(), e)))?;
        let _ = new_map.advise(Advice::Sequential);
        day.map = new_map;
        Ok(())
    }
}

impl Drop for BlockWriter {
    fn drop(&mut self) {
        // Best effort close on drop
        let _ = self.close();
    }
}

#[inline]
fn align_up(x: u64, a: u64) -> u64 {
    x.div_ceil(a) * a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(4097, 4096), 8192);
    }

    #[test]
    fn test_write_block_requires_open_day() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            BlockWriter::new(BlockWriterOptions::new(dir.path(), "TEST")).unwrap();

        let row = TickRow { ts_ns: 0, price: 1, size: 0.0, side: 0, kind: b'L' };
        let err = writer.write_block(&[row]).unwrap_err();
        assert!(matches!(err, Error::NotOpen(_)));
    }

    #[test]
    fn test_begin_day_same_day_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let opts = BlockWriterOptions::new(dir.path(), "TEST")
            .map_window(1 << 16)
            .allocate_chunk(1 << 16);
        let mut writer = BlockWriter::new(opts).unwrap();

        writer.begin_day(20240101).unwrap();
        assert_eq!(writer.current_day(), Some(20240101));
        writer.begin_day(20240101).unwrap();
        assert_eq!(writer.current_day(), Some(20240101));
        writer.close().unwrap();
        assert!(!writer.is_open());
    }

    #[test]
    fn test_close_truncates_and_finalizes_header() {
        let dir = tempfile::tempdir().unwrap();
        let opts = BlockWriterOptions::new(dir.path(), "TEST")
            .block_rows(4)
            .map_window(1 << 16)
            .allocate_chunk(1 << 16);
        let mut writer = BlockWriter::new(opts).unwrap();
        writer.begin_day(20240102).unwrap();

        for i in 0..10u32 {
            writer
                .write_row(TickRow {
                    ts_ns: i as u64 * 1_000_000,
                    price: 100 + i,
                    size: 1.0,
                    side: 0,
                    kind: b'L',
                })
                .unwrap();
        }
        writer.close().unwrap();

        let path = dir.path().join("TEST-BLOCKS").join("20240102.blocks");
        let data = fs::read(&path).unwrap();
        let hdr = DayFileHeader::decode(&data).unwrap();
        assert_eq!(hdr.rows_total, 10);
        assert_eq!(hdr.yyyymmdd, 20240102);
        // 4 + 4 + 2 buffered rows -> three blocks
        assert_eq!(hdr.blocks_total, 3);
        assert_eq!(hdr.bytes_total, data.len() as u64 - DAY_FILE_HEADER_SIZE as u64);
    }
}
