//! Columnar background writer.
//!
//! A producer thread enqueues rows onto a lock-free SPSC ring; one worker
//! thread drains it into the current day's memory-mapped columnar file. The
//! worker rotates files on UTC day boundaries, doubles a file's capacity
//! when the row count reaches it, and periodically refreshes the on-disk
//! header's row count so concurrent readers see a safe lower bound.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;

use crate::columnar::header::{ColumnFileHeader, COL_HEADER_SIZE};
use crate::columnar::queue::SpscQueue;
use crate::config::WriterOptions;
use crate::dayfile::{day_from_hour, yyyymmdd_from_day};
use crate::error::{Error, Result};
use crate::schema::Schema;

struct Shared<S: Schema> {
    queue: SpscQueue<S::Row>,
    rows: AtomicU64,
    dropped: AtomicU64,
    stop: AtomicBool,
    running: AtomicBool,
    day_start: AtomicU64,
}

/// Background writer for one product's columnar day files.
///
/// Exactly one thread may call [`Writer::enqueue`]; the worker spawned by
/// [`Writer::start`] is the only consumer. Dropping the writer requests a
/// stop and joins the worker, which drains the queue before exiting.
pub struct Writer<S: Schema> {
    shared: Arc<Shared<S>>,
    opts: WriterOptions,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Schema> Writer<S> {
    /// Creates a writer; the worker thread is not spawned until
    /// [`Writer::start`].
    pub fn new(opts: WriterOptions) -> Result<Self> {
        opts.validate()?;
        let shared = Arc::new(Shared {
            queue: SpscQueue::new(opts.queue_capacity),
            rows: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            day_start: AtomicU64::new(u64::MAX),
        });
        Ok(Self { shared, opts, worker: Mutex::new(None) })
    }

    /// Spawns the worker thread. A no-op when it is already running.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return Ok(());
        }
        self.shared.stop.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let opts = self.opts.clone();
        let handle = thread::Builder::new()
            .name("tickstore-writer".into())
            .spawn(move || run_worker::<S>(shared, opts))?;
        *slot = Some(handle);
        Ok(())
    }

    /// Enqueues one row without blocking.
    ///
    /// Returns `false` when the queue is full; the row is not stored and the
    /// producer decides whether to retry or drop.
    pub fn enqueue(&self, row: S::Row) -> bool {
        self.shared.queue.push(row).is_ok()
    }

    /// Requests shutdown; the worker drains the queue before exiting.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Waits for the worker thread to exit.
    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// True while the worker loop is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Rows written into the current day file.
    pub fn rows(&self) -> u64 {
        self.shared.rows.load(Ordering::Acquire)
    }

    /// Rows the worker had to drop (failed rotation or growth).
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// UTC day start of the current day file, if one is open.
    pub fn day_start(&self) -> Option<u64> {
        match self.shared.day_start.load(Ordering::Acquire) {
            u64::MAX => None,
            day => Some(day),
        }
    }
}

impl<S: Schema> Drop for Writer<S> {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

struct OpenColFile {
    file: File,
    path: PathBuf,
    map: MmapMut,
    header: ColumnFileHeader,
}

impl OpenColFile {
    fn open<S: Schema>(opts: &WriterOptions, day_start: u64) -> Result<Self> {
        let capacity = opts.rows_per_hr * 2;
        let date = yyyymmdd_from_day(day_start)
            .ok_or_else(|| Error::invalid_argument(format!("bad day start {}", day_start)))?;

        let dir = opts.base_dir.join(&opts.product);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{:08}.bin", date));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::open_failed(format!("{}: {}", path.display(), e)))?;

        let header = ColumnFileHeader::new::<S>(&opts.product, day_start, capacity);
        file.set_len(header.file_bytes())
            .map_err(|e| Error::allocate_failed(format!("{}: {}", path.display(), e)))?;

        let mut map = unsafe { MmapOptions::new().map_mut(&file) }
            .map_err(|e| Error::open_failed(format!("mmap {}: {}", path.display(), e)))?;

        header.encode(&mut map);
        map.flush_range(0, COL_HEADER_SIZE)?;

        log::info!(
            "[writer:{}] opened {} (capacity {} rows)",
            date,
            path.display(),
            capacity
        );
        Ok(Self { file, path, map, header })
    }

    /// Doubles the file's row capacity. Capacity changes move every column's
    /// offset, so the already-written column contents are relocated highest
    /// column first; a higher column's new region never overlaps a lower
    /// column's old one, and within a column the copy is a `memmove`.
    ///
    /// The header keeps the old geometry until the resize and remap have
    /// both succeeded, so a failed growth leaves the open file and mapping
    /// exactly as they were and the next attempt starts from a clean state.
    fn grow<S: Schema>(&mut self) -> Result<()> {
        let old_capacity = self.header.capacity;
        let new_capacity = old_capacity * 2;
        log::info!(
            "[writer] growing {} capacity {} -> {}",
            self.path.display(),
            old_capacity,
            new_capacity
        );

        let mut new_off = Vec::with_capacity(S::COLS);
        let mut end = COL_HEADER_SIZE as u64;
        for c in 0..S::COLS {
            new_off.push(end);
            end += new_capacity * S::col_size(c) as u64;
        }

        self.map.flush()?;
        self.file
            .set_len(end)
            .map_err(|e| Error::allocate_failed(format!("{}: {}", self.path.display(), e)))?;
        let map = unsafe { MmapOptions::new().map_mut(&self.file) }
            .map_err(|e| Error::remap_failed(format!("{}: {}", self.path.display(), e)))?;
        self.map = map;

        // Both fallible calls are done; commit the new geometry.
        let old_off = std::mem::replace(&mut self.header.col_off, new_off);
        self.header.capacity = new_capacity;

        let rows = self.header.rows;
        for c in (0..S::COLS).rev() {
            let bytes = (rows * S::col_size(c) as u64) as usize;
            if bytes == 0 {
                continue;
            }
            let src = old_off[c] as usize;
            let dst = self.header.col_off[c] as usize;
            self.map.copy_within(src..src + bytes, dst);
        }

        self.header.encode(&mut self.map);
        self.map.flush_range(0, COL_HEADER_SIZE)?;
        Ok(())
    }

    fn update_rows(&mut self, rows: u64) -> Result<()> {
        self.header.rows = rows;
        self.header.encode(&mut self.map);
        self.map.flush_range(0, COL_HEADER_SIZE)?;
        Ok(())
    }

    fn close(mut self, rows: u64) {
        if let Err(e) = self.update_rows(rows) {
            log::warn!(
                "[writer] header update on close of {} failed: {}",
                self.path.display(),
                e
            );
        }
        log::info!("[writer] closed {} ({} rows)", self.path.display(), rows);
        let _ = self.file.sync_data();
    }
}

fn run_worker<S: Schema>(shared: Arc<Shared<S>>, opts: WriterOptions) {
    let mut file: Option<OpenColFile> = None;
    let mut current_day: Option<u64> = None;
    let mut since_sync: u32 = 0;

    loop {
        if shared.stop.load(Ordering::Acquire) && shared.queue.is_empty() {
            break;
        }
        let Some(row) = shared.queue.pop() else {
            thread::yield_now();
            continue;
        };

        let day = day_from_hour(S::hour_from_row(&row));
        if current_day != Some(day) {
            if let Some(prev) = file.take() {
                let rows = shared.rows.load(Ordering::Acquire);
                prev.close(rows);
            }
            shared.rows.store(0, Ordering::Release);
            current_day = Some(day);

            match OpenColFile::open::<S>(&opts, day) {
                Ok(f) => {
                    file = Some(f);
                    shared.day_start.store(day, Ordering::Release);
                }
                Err(e) => {
                    log::warn!("[writer] rotation to day {} failed: {}", day, e);
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
        }
        let Some(open) = file.as_mut() else {
            // Rotation already failed for this day.
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let idx = shared.rows.fetch_add(1, Ordering::AcqRel);
        if idx >= open.header.capacity {
            open.header.rows = idx;
            if let Err(e) = open.grow::<S>() {
                log::warn!("[writer] growing {} failed: {}", open.path.display(), e);
                shared.rows.store(open.header.capacity, Ordering::Release);
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        }

        S::scatter(&row, &mut open.map, &open.header.col_off, idx);

        if opts.fsync_every_rows > 0 {
            since_sync += 1;
            if since_sync >= opts.fsync_every_rows {
                let rows = shared.rows.load(Ordering::Acquire);
                if let Err(e) = open.update_rows(rows) {
                    log::warn!("[writer] header refresh failed: {}", e);
                }
                since_sync = 0;
            }
        }
    }

    if let Some(open) = file.take() {
        let rows = shared.rows.load(Ordering::Acquire);
        open.close(rows);
    }
    shared.running.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{L2Row, L2Schema};

    fn row(i: u32) -> L2Row {
        L2Row { ts_ns: i as u64 * 1_000_000_000, price: 10_000 + i, qty: 1.0, side: (i & 1) as u8 }
    }

    #[test]
    fn test_enqueue_full_queue_returns_false() {
        let opts = WriterOptions::new("/tmp/tickstore-unused", "TEST").queue_capacity(2);
        let writer = Writer::<L2Schema>::new(opts).unwrap();

        // Worker not started, so the queue fills up.
        assert!(writer.enqueue(row(0)));
        assert!(writer.enqueue(row(1)));
        assert!(!writer.enqueue(row(2)));
    }

    /// Opens a day file for 1970-01-01 and fills it to capacity.
    fn open_full_file(dir: &std::path::Path) -> OpenColFile {
        let opts = WriterOptions::new(dir, "TEST").rows_per_hr(4).queue_capacity(64);
        let mut open = OpenColFile::open::<L2Schema>(&opts, 0).unwrap();
        let capacity = open.header.capacity;
        for i in 0..capacity {
            L2Schema::scatter(&row(i as u32), &mut open.map, &open.header.col_off, i);
        }
        open.header.rows = capacity;
        open
    }

    #[test]
    fn test_failed_allocate_on_grow_keeps_old_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut open = open_full_file(dir.path());
        let path = open.path.clone();

        let old_capacity = open.header.capacity;
        let old_off = open.header.col_off.clone();
        let file_len = open.file.metadata().unwrap().len();

        // A read-only descriptor makes the resize fail.
        let rw = std::mem::replace(&mut open.file, File::open(&path).unwrap());
        let err = open.grow::<L2Schema>().unwrap_err();
        assert!(matches!(err, Error::AllocateFailed(_)));

        // Nothing committed: the capacity (which the worker clamps its row
        // counter to on this failure) and offsets still describe the file on
        // disk, and every row reads back through them.
        assert_eq!(open.header.capacity, old_capacity);
        assert_eq!(open.header.col_off, old_off);
        assert_eq!(open.file.metadata().unwrap().len(), file_len);
        for i in 0..old_capacity {
            assert_eq!(L2Schema::gather(&open.map, &open.header.col_off, i), row(i as u32));
        }

        // A retry with a healthy descriptor succeeds and relocates the rows.
        open.file = rw;
        open.grow::<L2Schema>().unwrap();
        assert_eq!(open.header.capacity, old_capacity * 2);
        let disk = ColumnFileHeader::decode::<L2Schema>(&open.map).unwrap();
        assert_eq!(disk.capacity, old_capacity * 2);
        for i in 0..old_capacity {
            assert_eq!(L2Schema::gather(&open.map, &open.header.col_off, i), row(i as u32));
        }
    }

    #[test]
    fn test_failed_remap_on_grow_keeps_old_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut open = open_full_file(dir.path());
        let path = open.path.clone();

        let old_capacity = open.header.capacity;
        let old_off = open.header.col_off.clone();

        // A write-only descriptor lets the resize through but fails the map.
        let rw = std::mem::replace(
            &mut open.file,
            OpenOptions::new().write(true).open(&path).unwrap(),
        );
        let err = open.grow::<L2Schema>().unwrap_err();
        assert!(matches!(err, Error::RemapFailed(_)));

        // The old mapping stays live and the header still describes it.
        assert_eq!(open.header.capacity, old_capacity);
        assert_eq!(open.header.col_off, old_off);
        for i in 0..old_capacity {
            assert_eq!(L2Schema::gather(&open.map, &open.header.col_off, i), row(i as u32));
        }

        open.file = rw;
        open.grow::<L2Schema>().unwrap();
        assert_eq!(open.header.capacity, old_capacity * 2);
        for i in 0..old_capacity {
            assert_eq!(L2Schema::gather(&open.map, &open.header.col_off, i), row(i as u32));
        }
    }

    #[test]
    fn test_writer_drains_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let opts = WriterOptions::new(dir.path(), "TEST").rows_per_hr(64).queue_capacity(1024);
        let writer = Writer::<L2Schema>::new(opts).unwrap();
        writer.start().unwrap();

        for i in 0..100 {
            assert!(writer.enqueue(row(i)));
        }
        drop(writer);

        let path = dir.path().join("TEST").join("19700101.bin");
        assert!(path.exists());
        let data = fs::read(&path).unwrap();
        let hdr = ColumnFileHeader::decode::<L2Schema>(&data).unwrap();
        assert_eq!(hdr.rows, 100);
    }
}
