//! Block reader: streaming decode over a date range of blocked day files.

use std::fs::File;
use std::path::PathBuf;

use memmap2::{Advice, Mmap};

use crate::block::{DayFileHeader, DAY_FILE_HEADER_SIZE};
use crate::codec::{decode_block, TickRow};
use crate::config::BlockReaderOptions;
use crate::dayfile::{self, DayFile};
use crate::error::{Error, Result};

/// One decoded block handed to the visitor.
#[derive(Debug)]
pub struct BlockRows<'a> {
    /// The decoded rows of this block.
    pub rows: &'a [TickRow],
    /// Byte offset of the block within its day file.
    pub file_offset: u64,
    /// Calendar date of the day file.
    pub yyyymmdd: u32,
}

/// Sequentially decodes every block of every day file in a date range.
///
/// Day files are enumerated at construction, filtered by the inclusive
/// `[date_from, date_to]` range, and visited in ascending date order. The
/// reader is not thread-safe; independent instances may run concurrently.
pub struct BlockReader {
    files: Vec<DayFile>,
}

impl BlockReader {
    /// Enumerates the product's day files matching the date filter.
    pub fn new(opts: BlockReaderOptions) -> Result<Self> {
        opts.validate()?;
        let dir = opts.base_dir.join(format!("{}-BLOCKS", opts.product));
        let files = dayfile::list_day_files(&dir, "blocks", opts.date_from, opts.date_to)?;
        Ok(Self { files })
    }

    /// Dates of the matched day files, ascending.
    pub fn days(&self) -> Vec<u32> {
        self.files.iter().map(|f| f.yyyymmdd).collect()
    }

    /// Paths of the matched day files, ascending by date.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Visits every block of every matched day file exactly once, in order.
    ///
    /// A file whose tail is truncated or whose next block fails to decode is
    /// abandoned cleanly and iteration continues with the next file. A price
    /// overflow inside a block is fatal.
    pub fn visit_day_files<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&BlockRows<'_>),
    {
        let mut rows: Vec<TickRow> = Vec::new();

        for df in &self.files {
            let file = File::open(&df.path)
                .map_err(|e| Error::open_failed(format!("{}: {}", df.path.display(), e)))?;
            let len = file
                .metadata()
                .map_err(|e| Error::open_failed(format!("{}: {}", df.path.display(), e)))?
                .len();
            if (len as usize) < DAY_FILE_HEADER_SIZE {
                return Err(Error::open_failed(format!(
                    "{}: shorter than day header",
                    df.path.display()
                )));
            }

            let map = unsafe { Mmap::map(&file) }
                .map_err(|e| Error::open_failed(format!("mmap {}: {}", df.path.display(), e)))?;
            let _ = map.advise(Advice::Sequential);

            let hdr = DayFileHeader::decode(&map)?;
            let begin = DAY_FILE_HEADER_SIZE as u64;
            let limit = (begin + hdr.bytes_total).min(map.len() as u64);

            let mut off = begin;
            let mut count = 0u32;
            while off < limit && count < hdr.blocks_total {
                rows.clear();
                let src = &map[off as usize..limit as usize];
                let consumed = match decode_block(src, &mut rows) {
                    Ok(c) => c as u64,
                    Err(Error::TooSmall { .. }) | Err(Error::BadMagic { .. }) => {
                        log::warn!(
                            "{}: undecodable block at offset {}, abandoning file",
                            df.path.display(),
                            off
                        );
                        break;
                    }
                    Err(e) => return Err(e),
                };
                if consumed == 0 || off + consumed > limit {
                    break;
                }

                f(&BlockRows { rows: &rows, file_offset: off, yyyymmdd: df.yyyymmdd });

                off += consumed;
                count += 1;
            }
        }
        Ok(())
    }
}
