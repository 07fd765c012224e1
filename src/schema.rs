//! Row schemas for the columnar day-file layout.
//!
//! A schema describes one columnar file format: the row type, the number of
//! columns, the per-column element sizes, the 6-byte file magic, and how a
//! row is scattered into (and gathered back out of) the per-column arrays.
//! The columnar writer and reader are generic over a schema; the on-disk
//! layout is always a 256-byte header followed by one dense array per column
//! in declared order.

/// Capability record for one columnar file format.
pub trait Schema: 'static {
    /// The in-memory row type.
    type Row: Copy + Send + 'static;

    /// Number of columns.
    const COLS: usize;

    /// 6-byte file magic written into the day-file header.
    const MAGIC: [u8; 6];

    /// Format version written into the day-file header.
    const VERSION: u16;

    /// Element size in bytes of column `col`.
    fn col_size(col: usize) -> usize;

    /// Hour-granularity epoch seconds derived from a row's timestamp.
    fn hour_from_row(row: &Self::Row) -> u64;

    /// Writes `row` at row index `idx` into the column arrays inside `data`.
    ///
    /// `col_off` holds each column's byte offset from the start of `data`.
    fn scatter(row: &Self::Row, data: &mut [u8], col_off: &[u64], idx: u64);

    /// Reads the row at index `idx` back out of the column arrays.
    fn gather(data: &[u8], col_off: &[u64], idx: u64) -> Self::Row;
}

/// Quantizes a nanosecond timestamp to hour-granularity epoch seconds.
#[inline]
pub fn hour_bucket(ts_ns: u64) -> u64 {
    let s = ts_ns / 1_000_000_000;
    (s / 3600) * 3600
}

#[inline]
fn put(data: &mut [u8], at: u64, src: &[u8]) {
    let at = at as usize;
    data[at..at + src.len()].copy_from_slice(src);
}

#[inline]
fn get<const N: usize>(data: &[u8], at: u64) -> [u8; N] {
    let at = at as usize;
    data[at..at + N].try_into().unwrap()
}

/// One L2 book update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L2Row {
    /// Event timestamp in epoch nanoseconds.
    pub ts_ns: u64,
    /// Price in ticks.
    pub price: u32,
    /// Quantity at the level.
    pub qty: f32,
    /// Side flag (bid/ask).
    pub side: u8,
}

/// Columnar schema for L2 book updates.
pub struct L2Schema;

impl L2Schema {
    /// Timestamp column.
    pub const COL_TS: usize = 0;
    /// Price column.
    pub const COL_PX: usize = 1;
    /// Quantity column.
    pub const COL_QTY: usize = 2;
    /// Side column.
    pub const COL_SIDE: usize = 3;
}

impl Schema for L2Schema {
    type Row = L2Row;

    const COLS: usize = 4;
    const MAGIC: [u8; 6] = *b"L2COL\n";
    const VERSION: u16 = 1;

    fn col_size(col: usize) -> usize {
        match col {
            Self::COL_TS => 8,
            Self::COL_PX | Self::COL_QTY => 4,
            _ => 1,
        }
    }

    fn hour_from_row(row: &Self::Row) -> u64 {
        hour_bucket(row.ts_ns)
    }

    fn scatter(row: &Self::Row, data: &mut [u8], col_off: &[u64], idx: u64) {
        put(data, col_off[Self::COL_TS] + idx * 8, &row.ts_ns.to_le_bytes());
        put(data, col_off[Self::COL_PX] + idx * 4, &row.price.to_le_bytes());
        put(data, col_off[Self::COL_QTY] + idx * 4, &row.qty.to_le_bytes());
        put(data, col_off[Self::COL_SIDE] + idx, &[row.side]);
    }

    fn gather(data: &[u8], col_off: &[u64], idx: u64) -> Self::Row {
        L2Row {
            ts_ns: u64::from_le_bytes(get(data, col_off[Self::COL_TS] + idx * 8)),
            price: u32::from_le_bytes(get(data, col_off[Self::COL_PX] + idx * 4)),
            qty: f32::from_le_bytes(get(data, col_off[Self::COL_QTY] + idx * 4)),
            side: data[(col_off[Self::COL_SIDE] + idx) as usize],
        }
    }
}

/// One L3 order event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L3Row {
    /// Exchange order id.
    pub id: u64,
    /// Event timestamp in epoch nanoseconds.
    pub ts_ns: u64,
    /// Price in ticks.
    pub price: u32,
    /// Order size.
    pub size: u32,
    /// Order action (add/modify/delete).
    pub action: u8,
    /// Side flag (bid/ask).
    pub side: u8,
}

/// Columnar schema for L3 order events.
pub struct L3Schema;

impl L3Schema {
    /// Order id column.
    pub const COL_ID: usize = 0;
    /// Timestamp column.
    pub const COL_TS: usize = 1;
    /// Price column.
    pub const COL_PX: usize = 2;
    /// Size column.
    pub const COL_SZ: usize = 3;
    /// Action column.
    pub const COL_ACT: usize = 4;
    /// Side column.
    pub const COL_SIDE: usize = 5;
}

impl Schema for L3Schema {
    type Row = L3Row;

    const COLS: usize = 6;
    const MAGIC: [u8; 6] = *b"L3COL\n";
    const VERSION: u16 = 1;

    fn col_size(col: usize) -> usize {
        match col {
            Self::COL_ID | Self::COL_TS => 8,
            Self::COL_PX | Self::COL_SZ => 4,
            _ => 1,
        }
    }

    fn hour_from_row(row: &Self::Row) -> u64 {
        hour_bucket(row.ts_ns)
    }

    fn scatter(row: &Self::Row, data: &mut [u8], col_off: &[u64], idx: u64) {
        put(data, col_off[Self::COL_ID] + idx * 8, &row.id.to_le_bytes());
        put(data, col_off[Self::COL_TS] + idx * 8, &row.ts_ns.to_le_bytes());
        put(data, col_off[Self::COL_PX] + idx * 4, &row.price.to_le_bytes());
        put(data, col_off[Self::COL_SZ] + idx * 4, &row.size.to_le_bytes());
        put(data, col_off[Self::COL_ACT] + idx, &[row.action]);
        put(data, col_off[Self::COL_SIDE] + idx, &[row.side]);
    }

    fn gather(data: &[u8], col_off: &[u64], idx: u64) -> Self::Row {
        L3Row {
            id: u64::from_le_bytes(get(data, col_off[Self::COL_ID] + idx * 8)),
            ts_ns: u64::from_le_bytes(get(data, col_off[Self::COL_TS] + idx * 8)),
            price: u32::from_le_bytes(get(data, col_off[Self::COL_PX] + idx * 4)),
            size: u32::from_le_bytes(get(data, col_off[Self::COL_SZ] + idx * 4)),
            action: data[(col_off[Self::COL_ACT] + idx) as usize],
            side: data[(col_off[Self::COL_SIDE] + idx) as usize],
        }
    }
}

/// One order-flow imbalance sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImbalanceRow {
    /// Signed imbalance value.
    pub imbalance: f32,
    /// Sample timestamp in epoch nanoseconds.
    pub ts_ns: u64,
}

/// Columnar schema for order-flow imbalance samples.
pub struct ImbalanceSchema;

impl Schema for ImbalanceSchema {
    type Row = ImbalanceRow;

    const COLS: usize = 2;
    const MAGIC: [u8; 6] = *b"IMBAL\n";
    const VERSION: u16 = 1;

    fn col_size(col: usize) -> usize {
        if col == 0 {
            4
        } else {
            8
        }
    }

    fn hour_from_row(row: &Self::Row) -> u64 {
        hour_bucket(row.ts_ns)
    }

    fn scatter(row: &Self::Row, data: &mut [u8], col_off: &[u64], idx: u64) {
        put(data, col_off[0] + idx * 4, &row.imbalance.to_le_bytes());
        put(data, col_off[1] + idx * 8, &row.ts_ns.to_le_bytes());
    }

    fn gather(data: &[u8], col_off: &[u64], idx: u64) -> Self::Row {
        ImbalanceRow {
            imbalance: f32::from_le_bytes(get(data, col_off[0] + idx * 4)),
            ts_ns: u64::from_le_bytes(get(data, col_off[1] + idx * 8)),
        }
    }
}

/// One VWAP sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapRow {
    /// Volume-weighted average price.
    pub vwap: f32,
    /// Sample timestamp in epoch nanoseconds.
    pub ts_ns: u64,
}

/// Columnar schema for VWAP samples.
pub struct VwapSchema;

impl Schema for VwapSchema {
    type Row = VwapRow;

    const COLS: usize = 2;
    const MAGIC: [u8; 6] = *b"VWAP\n\0";
    const VERSION: u16 = 1;

    fn col_size(col: usize) -> usize {
        if col == 0 {
            4
        } else {
            8
        }
    }

    fn hour_from_row(row: &Self::Row) -> u64 {
        hour_bucket(row.ts_ns)
    }

    fn scatter(row: &Self::Row, data: &mut [u8], col_off: &[u64], idx: u64) {
        put(data, col_off[0] + idx * 4, &row.vwap.to_le_bytes());
        put(data, col_off[1] + idx * 8, &row.ts_ns.to_le_bytes());
    }

    fn gather(data: &[u8], col_off: &[u64], idx: u64) -> Self::Row {
        VwapRow {
            vwap: f32::from_le_bytes(get(data, col_off[0] + idx * 4)),
            ts_ns: u64::from_le_bytes(get(data, col_off[1] + idx * 8)),
        }
    }
}

/// One volume-order-imbalance event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiRow {
    /// Mid price in ticks.
    pub mid_price: u32,
    /// Volume order imbalance value.
    pub voi: u32,
    /// Event timestamp in epoch nanoseconds.
    pub ts_ns: u64,
}

/// Columnar schema for volume-order-imbalance events.
pub struct VoiSchema;

impl VoiSchema {
    /// Mid price column.
    pub const COL_MID: usize = 0;
    /// VOI column.
    pub const COL_VOI: usize = 1;
    /// Timestamp column.
    pub const COL_TS: usize = 2;
}

impl Schema for VoiSchema {
    type Row = VoiRow;

    const COLS: usize = 3;
    const MAGIC: [u8; 6] = *b"VOIEVT";
    const VERSION: u16 = 1;

    fn col_size(col: usize) -> usize {
        match col {
            Self::COL_MID | Self::COL_VOI => 4,
            Self::COL_TS => 8,
            _ => 0,
        }
    }

    fn hour_from_row(row: &Self::Row) -> u64 {
        hour_bucket(row.ts_ns)
    }

    fn scatter(row: &Self::Row, data: &mut [u8], col_off: &[u64], idx: u64) {
        put(data, col_off[Self::COL_MID] + idx * 4, &row.mid_price.to_le_bytes());
        put(data, col_off[Self::COL_VOI] + idx * 4, &row.voi.to_le_bytes());
        put(data, col_off[Self::COL_TS] + idx * 8, &row.ts_ns.to_le_bytes());
    }

    fn gather(data: &[u8], col_off: &[u64], idx: u64) -> Self::Row {
        VoiRow {
            mid_price: u32::from_le_bytes(get(data, col_off[Self::COL_MID] + idx * 4)),
            voi: u32::from_le_bytes(get(data, col_off[Self::COL_VOI] + idx * 4)),
            ts_ns: u64::from_le_bytes(get(data, col_off[Self::COL_TS] + idx * 8)),
        }
    }
}
