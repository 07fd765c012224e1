//! Columnar day-file layout: background writer and mmap reader.
//!
//! One file per product per UTC day, laid out as a fixed 256-byte header
//! followed by one dense array per column. The writer appends through a
//! writable mapping fed by an SPSC queue; readers map the file read-only
//! and hand out zero-copy column slices.

pub mod header;
pub mod queue;
pub mod reader;
pub mod writer;

pub use header::{ColumnFileHeader, COL_HEADER_SIZE};
pub use queue::SpscQueue;
pub use reader::{Reader, Segment};
pub use writer::Writer;
