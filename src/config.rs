//! Configuration options for the tickstore writers and readers.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Rows per encoded block, unless overridden.
pub const DEFAULT_BLOCK_ROWS: u32 = 8192;

/// Capacity seed for a columnar day file; actual initial capacity is twice this.
pub const DEFAULT_ROWS_PER_HR: u64 = 1 << 24;

/// Capacity of the ingest queue between producer and writer thread.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1 << 26;

/// Size of the block writer's mapping window.
pub const DEFAULT_MAP_WINDOW: u64 = 256 << 20;

/// Granularity of the block writer's file preallocation.
pub const DEFAULT_ALLOCATE_CHUNK: u64 = 1 << 30;

/// Configuration for the columnar background writer.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Root directory for product subdirectories.
    pub base_dir: PathBuf,

    /// Product name; used as subdirectory and header tag.
    pub product: String,

    /// Capacity seed in rows. A new day file is sized for `rows_per_hr * 2`
    /// rows and doubles whenever the producer exceeds it.
    /// Default: `1 << 24`
    pub rows_per_hr: u64,

    /// Refresh the on-disk header's row count every N rows.
    /// Default: 0 (only on rotation and close)
    pub fsync_every_rows: u32,

    /// Ingest queue capacity in rows; rounded up to a power of two.
    /// Default: `1 << 26`
    pub queue_capacity: usize,
}

impl WriterOptions {
    /// Creates writer options for a product under a base directory.
    pub fn new(base_dir: impl Into<PathBuf>, product: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            product: product.into(),
            rows_per_hr: DEFAULT_ROWS_PER_HR,
            fsync_every_rows: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the capacity seed in rows.
    pub fn rows_per_hr(mut self, rows: u64) -> Self {
        self.rows_per_hr = rows;
        self
    }

    /// Sets the header refresh interval in rows.
    pub fn fsync_every_rows(mut self, rows: u32) -> Self {
        self.fsync_every_rows = rows;
        self
    }

    /// Sets the ingest queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<()> {
        validate_product(&self.product)?;
        if self.rows_per_hr == 0 {
            return Err(Error::invalid_argument("rows_per_hr must be > 0"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::invalid_argument("queue_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Configuration for the block writer.
#[derive(Debug, Clone)]
pub struct BlockWriterOptions {
    /// Root directory for product subdirectories.
    pub base_dir: PathBuf,

    /// Product name; the day files live under `<base_dir>/<product>-BLOCKS`.
    pub product: String,

    /// Rows buffered before a block is encoded and appended.
    /// Default: 8192
    pub block_rows: u32,

    /// Informational block-count sync interval; independent of it, the
    /// writer issues a data sync every 64 MiB appended.
    /// Default: 0
    pub fsync_every_blocks: u32,

    /// Mapping window size; the window grows in whole multiples of this.
    /// Default: 256 MiB
    pub map_window: u64,

    /// File preallocation granularity.
    /// Default: 1 GiB
    pub allocate_chunk: u64,
}

impl BlockWriterOptions {
    /// Creates block writer options for a product under a base directory.
    pub fn new(base_dir: impl Into<PathBuf>, product: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            product: product.into(),
            block_rows: DEFAULT_BLOCK_ROWS,
            fsync_every_blocks: 0,
            map_window: DEFAULT_MAP_WINDOW,
            allocate_chunk: DEFAULT_ALLOCATE_CHUNK,
        }
    }

    /// Sets the rows per encoded block.
    pub fn block_rows(mut self, rows: u32) -> Self {
        self.block_rows = rows;
        self
    }

    /// Sets the mapping window size.
    pub fn map_window(mut self, bytes: u64) -> Self {
        self.map_window = bytes;
        self
    }

    /// Sets the file preallocation granularity.
    pub fn allocate_chunk(mut self, bytes: u64) -> Self {
        self.allocate_chunk = bytes;
        self
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<()> {
        validate_product(&self.product)?;
        if self.block_rows == 0 {
            return Err(Error::invalid_argument("block_rows must be > 0"));
        }
        if self.map_window == 0 {
            return Err(Error::invalid_argument("map_window must be > 0"));
        }
        if self.allocate_chunk == 0 {
            return Err(Error::invalid_argument("allocate_chunk must be > 0"));
        }
        Ok(())
    }
}

/// Configuration for the columnar day-file reader.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Root directory for product subdirectories.
    pub base_dir: PathBuf,

    /// Product subdirectory; when empty, `base_dir` itself is scanned.
    pub product: String,

    /// Inclusive lower bound on the day file date (`YYYYMMDD`).
    /// Default: 0 (from the earliest date)
    pub date_from: u32,

    /// Inclusive upper bound on the day file date (`YYYYMMDD`).
    /// Default: 99_999_999
    pub date_to: u32,
}

impl ReaderOptions {
    /// Creates reader options for a product under a base directory.
    pub fn new(base_dir: impl Into<PathBuf>, product: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            product: product.into(),
            date_from: 0,
            date_to: 99_999_999,
        }
    }

    /// Sets the inclusive date range filter.
    pub fn date_range(mut self, from: u32, to: u32) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<()> {
        if self.date_from > self.date_to {
            return Err(Error::invalid_argument("date_from must be <= date_to"));
        }
        Ok(())
    }
}

/// Configuration for the block reader.
#[derive(Debug, Clone)]
pub struct BlockReaderOptions {
    /// Root directory for product subdirectories.
    pub base_dir: PathBuf,

    /// Product name; the day files live under `<base_dir>/<product>-BLOCKS`.
    pub product: String,

    /// Inclusive lower bound on the day file date (`YYYYMMDD`).
    /// Default: 0 (from the earliest date)
    pub date_from: u32,

    /// Inclusive upper bound on the day file date (`YYYYMMDD`).
    /// Default: 99_999_999
    pub date_to: u32,
}

impl BlockReaderOptions {
    /// Creates block reader options for a product under a base directory.
    pub fn new(base_dir: impl Into<PathBuf>, product: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            product: product.into(),
            date_from: 0,
            date_to: 99_999_999,
        }
    }

    /// Sets the inclusive date range filter.
    pub fn date_range(mut self, from: u32, to: u32) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<()> {
        validate_product(&self.product)?;
        if self.date_from > self.date_to {
            return Err(Error::invalid_argument("date_from must be <= date_to"));
        }
        Ok(())
    }
}

fn validate_product(product: &str) -> Result<()> {
    if product.is_empty() {
        return Err(Error::invalid_argument("product must not be empty"));
    }
    Ok(())
}
