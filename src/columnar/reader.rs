//! Columnar day-file reader.
//!
//! Maps one day file at a time read-only and exposes a [`Segment`]: the row
//! count plus zero-copy slices over each column array. Staged visiting
//! copies the columns into an owned slab first, for callers that outlive
//! the mapping.

use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use memmap2::{Advice, Mmap};

use crate::columnar::header::{ColumnFileHeader, COL_HEADER_SIZE};
use crate::config::ReaderOptions;
use crate::dayfile::{self, DayFile};
use crate::error::{Error, Result};
use crate::schema::Schema;

/// A view over the rows of one columnar day file.
///
/// Column data may live in a read-only mapping (plain visits) or in an
/// owned staging slab (staged visits); either way the accessors are the
/// same.
pub struct Segment<'a, S: Schema> {
    data: &'a [u8],
    col_off: Vec<u64>,
    rows: u64,
    yyyymmdd: u32,
    day_start_s: u64,
    _schema: PhantomData<S>,
}

impl<S: Schema> Segment<'_, S> {
    /// Number of readable rows.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Calendar date of the underlying day file.
    pub fn yyyymmdd(&self) -> u32 {
        self.yyyymmdd
    }

    /// UTC day start of the underlying day file, epoch seconds.
    pub fn day_start(&self) -> u64 {
        self.day_start_s
    }

    /// Raw bytes of column `col`, exactly `rows * col_size` long.
    pub fn col_bytes(&self, col: usize) -> &[u8] {
        let off = self.col_off[col] as usize;
        let len = self.rows as usize * S::col_size(col);
        &self.data[off..off + len]
    }

    /// Typed zero-copy view of column `col`.
    ///
    /// # Panics
    ///
    /// Panics when `T`'s size differs from the column's element size or the
    /// column data is misaligned for `T`. The writer's even row capacities
    /// keep the shipped schemas' columns aligned, and staged segments align
    /// every column to 8 bytes.
    pub fn col<T: Pod>(&self, col: usize) -> &[T] {
        assert_eq!(std::mem::size_of::<T>(), S::col_size(col), "element size mismatch");
        bytemuck::cast_slice(self.col_bytes(col))
    }

    /// Reassembles the row at `idx` from the column arrays.
    pub fn gather(&self, idx: u64) -> S::Row {
        S::gather(self.data, &self.col_off, idx)
    }
}

/// Reads a product's columnar day files over an inclusive date range.
///
/// Not thread-safe; independent instances may run concurrently.
pub struct Reader<S: Schema> {
    files: Vec<DayFile>,
    _schema: PhantomData<S>,
}

impl<S: Schema> Reader<S> {
    /// Enumerates the product's day files matching the date filter.
    pub fn new(opts: ReaderOptions) -> Result<Self> {
        opts.validate()?;
        let dir = if opts.product.is_empty() {
            opts.base_dir.clone()
        } else {
            opts.base_dir.join(&opts.product)
        };
        let files = dayfile::list_day_files(&dir, "bin", opts.date_from, opts.date_to)?;
        Ok(Self { files, _schema: PhantomData })
    }

    /// Dates of the matched day files, ascending.
    pub fn days(&self) -> Vec<u32> {
        self.files.iter().map(|f| f.yyyymmdd).collect()
    }

    /// Paths of the matched day files, ascending by date.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Visits each matched day file as a borrowed [`Segment`], in order.
    pub fn visit_day_files<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Segment<'_, S>),
    {
        for df in &self.files {
            visit_mapped::<S, _>(&df.path, df.yyyymmdd, &mut f)?;
        }
        Ok(())
    }

    /// Visits a single day file, returning its row count.
    pub fn visit_file<F>(&self, path: &Path, mut f: F) -> Result<u64>
    where
        F: FnMut(&Segment<'_, S>),
    {
        let date = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(dayfile::parse_yyyymmdd)
            .unwrap_or(0);
        visit_mapped::<S, _>(path, date, &mut f)
    }

    /// Visits each matched day file through an owned staging copy of its
    /// columns, packed at the segment's row count with each column kept
    /// 8-byte aligned. Files with no rows are skipped; the visitor returns
    /// `false` to stop early.
    pub fn visit_staged<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Segment<'_, S>) -> bool,
    {
        // u64-backed slab so typed column views stay aligned.
        let mut stage: Vec<u64> = Vec::new();

        for df in &self.files {
            let (map, header) = map_day_file::<S>(&df.path)?;
            let rows = header.rows;
            if rows == 0 {
                continue;
            }

            let mut packed_off = Vec::with_capacity(S::COLS);
            let mut need = 0u64;
            for c in 0..S::COLS {
                packed_off.push(need);
                need = (need + rows * S::col_size(c) as u64).next_multiple_of(8);
            }

            stage.clear();
            stage.resize((need as usize).div_ceil(8), 0);
            let slab: &mut [u8] = bytemuck::cast_slice_mut(&mut stage);
            for c in 0..S::COLS {
                let src = header.col_off[c] as usize;
                let len = (rows * S::col_size(c) as u64) as usize;
                let dst = packed_off[c] as usize;
                slab[dst..dst + len].copy_from_slice(&map[src..src + len]);
            }

            let seg = Segment {
                data: bytemuck::cast_slice(&stage),
                col_off: packed_off,
                rows,
                yyyymmdd: df.yyyymmdd,
                day_start_s: header.day_start_s,
                _schema: PhantomData,
            };
            if !f(&seg) {
                break;
            }
        }
        Ok(())
    }
}

fn map_day_file<S: Schema>(path: &Path) -> Result<(Mmap, ColumnFileHeader)> {
    let file = File::open(path)
        .map_err(|e| Error::open_failed(format!("{}: {}", path.display(), e)))?;
    let len = file
        .metadata()
        .map_err(|e| Error::open_failed(format!("{}: {}", path.display(), e)))?
        .len();
    if (len as usize) < COL_HEADER_SIZE {
        return Err(Error::open_failed(format!(
            "{}: shorter than columnar header",
            path.display()
        )));
    }

    let map = unsafe { Mmap::map(&file) }
        .map_err(|e| Error::open_failed(format!("mmap {}: {}", path.display(), e)))?;
    let _ = map.advise(Advice::Sequential);
    let _ = map.advise(Advice::WillNeed);

    let header = ColumnFileHeader::decode::<S>(&map)?;
    Ok((map, header))
}

fn visit_mapped<S: Schema, F>(path: &Path, yyyymmdd: u32, f: &mut F) -> Result<u64>
where
    F: FnMut(&Segment<'_, S>),
{
    let (map, header) = map_day_file::<S>(path)?;
    let seg = Segment {
        data: &map,
        col_off: header.col_off.clone(),
        rows: header.rows,
        yyyymmdd,
        day_start_s: header.day_start_s,
        _schema: PhantomData,
    };
    f(&seg);
    Ok(header.rows)
}
