//! # tickstore - per-product, per-day market event storage
//!
//! tickstore persists high-frequency market microstructure events (L2 book
//! updates, L3 order events, and derived signals) one product-day at a
//! time, in two on-disk layouts:
//!
//! - **Columnar day files** (`<base>/<product>/<YYYYMMDD>.bin`): a 256-byte
//!   header plus one dense array per column. A background thread drains a
//!   lock-free SPSC queue into the mapped file, rotating on UTC day
//!   boundaries and doubling capacity on overflow; readers map the file and
//!   expose zero-copy column slices.
//! - **Blocked day files** (`<base>/<product>-BLOCKS/<YYYYMMDD>.blocks`): a
//!   24-byte summary header plus a stream of independently decodable
//!   blocks. Each block stores timestamps as scaled deltas and prices as
//!   zig-zag deltas, bit-packed at the minimum width the block needs, which
//!   trades a small decode cost for substantial compression.
//!
//! ## Components
//!
//! - [`codec`]: bit-pack primitives and the block encoder/decoder
//! - [`block`]: blocked day-file writer and reader
//! - [`columnar`]: columnar day-file writer, reader, and ingest queue
//! - [`schema`]: the row schemas parameterizing the columnar layout
//!
//! ## Example
//!
//! ```no_run
//! use tickstore::{BlockWriter, BlockWriterOptions, TickRow};
//!
//! # fn main() -> tickstore::Result<()> {
//! let mut writer = BlockWriter::new(BlockWriterOptions::new("./data", "BTC-USD"))?;
//! writer.begin_day(20240815)?;
//! writer.write_row(TickRow { ts_ns: 0, price: 100, size: 1.0, side: 0, kind: b'L' })?;
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod block;
pub mod codec;
pub mod columnar;
pub mod config;
pub mod error;
pub mod schema;

mod dayfile;

pub use block::{BlockReader, BlockRows, BlockWriter, DayFileHeader, DAY_FILE_HEADER_SIZE};
pub use codec::{
    decode_block, encode_block, BlockHeader, TickRow, BLOCK_HEADER_SIZE, BLOCK_MAGIC, KIND_LIMIT,
    KIND_TRADE,
};
pub use columnar::{ColumnFileHeader, Reader, Segment, SpscQueue, Writer, COL_HEADER_SIZE};
pub use config::{BlockReaderOptions, BlockWriterOptions, ReaderOptions, WriterOptions};
pub use error::{Error, Result};
pub use schema::{
    ImbalanceRow, ImbalanceSchema, L2Row, L2Schema, L3Row, L3Schema, Schema, VoiRow, VoiSchema,
    VwapRow, VwapSchema,
};
