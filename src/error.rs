//! Error types for the tickstore storage engine.

use std::fmt;
use std::io;

/// The result type used throughout tickstore.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for tickstore operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(io::Error),

    /// Opening, stat-ing, or mapping a day file failed.
    OpenFailed(String),

    /// Preallocating file space failed.
    AllocateFailed(String),

    /// Re-creating the writer's mapping window failed.
    RemapFailed(String),

    /// A source region is shorter than the structure it must contain.
    TooSmall {
        /// Bytes required.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// A file or block magic did not match.
    BadMagic {
        /// The magic that was expected (little-endian, zero-padded).
        expected: u64,
        /// The magic that was found.
        actual: u64,
    },

    /// A reconstructed price does not fit in a `u32`.
    PriceOverflow {
        /// The block's base price.
        base_px: u32,
        /// The decoded signed delta.
        delta: i32,
    },

    /// A write was attempted without an open day file.
    NotOpen(String),

    /// An invalid argument was provided.
    InvalidArgument(String),
}

impl Error {
    /// Creates a new open failure error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Error::OpenFailed(msg.into())
    }

    /// Creates a new allocation failure error.
    pub fn allocate_failed(msg: impl Into<String>) -> Self {
        Error::AllocateFailed(msg.into())
    }

    /// Creates a new remap failure error.
    pub fn remap_failed(msg: impl Into<String>) -> Self {
        Error::RemapFailed(msg.into())
    }

    /// Creates a new not-open error.
    pub fn not_open(msg: impl Into<String>) -> Self {
        Error::NotOpen(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a bad-magic error from raw magic bytes (up to 8 each).
    pub fn bad_magic(expected: &[u8], actual: &[u8]) -> Self {
        Error::BadMagic { expected: magic_to_u64(expected), actual: magic_to_u64(actual) }
    }
}

fn magic_to_u64(m: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    let n = m.len().min(8);
    b[..n].copy_from_slice(&m[..n]);
    u64::from_le_bytes(b)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::OpenFailed(msg) => write!(f, "Open failed: {}", msg),
            Error::AllocateFailed(msg) => write!(f, "Allocate failed: {}", msg),
            Error::RemapFailed(msg) => write!(f, "Remap failed: {}", msg),
            Error::TooSmall { need, have } => {
                write!(f, "Region too small: need {} bytes, have {}", need, have)
            }
            Error::BadMagic { expected, actual } => {
                write!(f, "Bad magic: expected {:#018x}, got {:#018x}", expected, actual)
            }
            Error::PriceOverflow { base_px, delta } => {
                write!(f, "Price overflow: base {} with delta {}", base_px, delta)
            }
            Error::NotOpen(msg) => write!(f, "Not open: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::open_failed("no such file");
        assert_eq!(err.to_string(), "Open failed: no such file");

        let err = Error::TooSmall { need: 76, have: 10 };
        assert!(err.to_string().contains("need 76"));

        let err = Error::PriceOverflow { base_px: 5, delta: -10 };
        assert!(err.to_string().contains("base 5"));
    }

    #[test]
    fn test_bad_magic_padding() {
        let err = Error::bad_magic(b"L2COL\n", b"XXXXXX");
        match err {
            Error::BadMagic { expected, actual } => {
                assert_eq!(expected & 0xffff_0000_0000_0000, 0);
                assert_ne!(expected, actual);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
