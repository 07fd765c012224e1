//! Day-file enumeration shared by the readers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};

use crate::error::Result;

/// One day file discovered under a product directory.
#[derive(Debug, Clone)]
pub(crate) struct DayFile {
    pub yyyymmdd: u32,
    pub path: PathBuf,
}

/// Parses an 8-digit `YYYYMMDD` filename stem.
pub(crate) fn parse_yyyymmdd(stem: &str) -> Option<u32> {
    if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Lists `<dir>/<YYYYMMDD>.<ext>` files inside the inclusive date range,
/// sorted ascending by date. A missing directory yields an empty list.
pub(crate) fn list_day_files(
    dir: &Path,
    ext: &str,
    date_from: u32,
    date_to: u32,
) -> Result<Vec<DayFile>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let Some(date) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(parse_yyyymmdd)
        else {
            continue;
        };
        if date < date_from || date > date_to {
            continue;
        }
        files.push(DayFile { yyyymmdd: date, path });
    }
    files.sort_by_key(|f| f.yyyymmdd);
    Ok(files)
}

/// Floors hour-granularity epoch seconds to the containing UTC day.
#[inline]
pub(crate) fn day_from_hour(hour_s: u64) -> u64 {
    hour_s - (hour_s % 86_400)
}

/// Formats UTC day-start epoch seconds as a `YYYYMMDD` integer.
pub(crate) fn yyyymmdd_from_day(day_s: u64) -> Option<u32> {
    let dt: DateTime<Utc> = DateTime::from_timestamp(day_s as i64, 0)?;
    Some(dt.year() as u32 * 10_000 + dt.month() * 100 + dt.day())
}
