//! Delta / zig-zag / bit-packed codec for blocked day files.

pub mod bitpack;
pub mod block;

pub use block::{
    decode_block, encode_block, BlockHeader, TickRow, BLOCK_HEADER_SIZE, BLOCK_MAGIC,
    DEFAULT_TS_SCALE_NS, KIND_LIMIT, KIND_TRADE,
};
