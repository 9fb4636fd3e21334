//! Durable storage: filesystem collaborator, ring store and in-memory backend.
//!
//! The flight computer exposes a small filesystem; everything the beacon
//! subsystem persists (ring store, configuration, exports) is a raw binary
//! file at a well-known path. Files are plain [`embedded_io`] byte streams.

pub mod ram;
pub mod ring;

pub use ram::{RamFile, RamFs};
pub use ring::{Record, RingSpan, RingStore, SharedRing};

use embedded_io::{ErrorKind, Read, ReadExactError, Seek, Write};
use thiserror_no_std::Error;

use crate::wire::DecodeError;

/// Maximum length of a storage path, as carried on the wire
pub const PATH_LEN: usize = 50;

/// Owned storage path
pub type Path = heapless::String<PATH_LEN>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("file not found")]
    NotFound,
    #[error("storage I/O error: {0:?}")]
    Io(ErrorKind),
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("store header does not match the expected layout")]
    HeaderMismatch,
    #[error("stored data is corrupt")]
    Corrupt,
    #[error("store capacity must be non-zero")]
    InvalidCapacity,
}

impl StorageError {
    pub fn io<E: embedded_io::Error>(e: E) -> Self {
        match e.kind() {
            ErrorKind::NotFound => Self::NotFound,
            kind => Self::Io(kind),
        }
    }

    pub fn read_exact<E: embedded_io::Error>(e: ReadExactError<E>) -> Self {
        match e {
            ReadExactError::UnexpectedEof => Self::UnexpectedEof,
            ReadExactError::Other(e) => Self::io(e),
        }
    }
}

impl From<DecodeError> for StorageError {
    fn from(_: DecodeError) -> Self {
        Self::Corrupt
    }
}

/// Filesystem collaborator
///
/// Implementations hand out independent handles to named files. Handles to
/// the same path must observe each other's writes.
pub trait FileSystem {
    type File: Read + Write + Seek;

    /// Open an existing file for reading and writing
    fn open(&self, path: &str) -> Result<Self::File, StorageError>;

    /// Create a file, truncating any existing content
    fn create(&self, path: &str) -> Result<Self::File, StorageError>;
}

/// Read a whole fixed-size blob from the start of `path`
pub fn read_blob<FS: FileSystem>(fs: &FS, path: &str, buf: &mut [u8]) -> Result<(), StorageError> {
    let mut file = fs.open(path)?;
    file.read_exact(buf).map_err(StorageError::read_exact)
}

/// Replace the contents of `path` with `data`
pub fn write_blob<FS: FileSystem>(fs: &FS, path: &str, data: &[u8]) -> Result<(), StorageError> {
    let mut file = fs.create(path)?;
    file.write_all(data).map_err(StorageError::io)?;
    file.flush().map_err(StorageError::io)
}

/// Whether two device paths name the same file; a leading `/` is ignored
pub fn same_file(a: &str, b: &str) -> bool {
    a.trim_start_matches('/') == b.trim_start_matches('/')
}

/// Parse a NUL-padded path field from a request
pub fn path_from_wire(raw: &[u8]) -> Result<Path, DecodeError> {
    let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let s = core::str::from_utf8(&raw[..len]).map_err(|_| DecodeError::InvalidPath)?;
    if s.is_empty() {
        return Err(DecodeError::InvalidPath);
    }
    Path::try_from(s).map_err(|_| DecodeError::InvalidPath)
}

/// Write `path` as a NUL-padded [`PATH_LEN`]-byte field
pub fn path_to_wire(path: &str, out: &mut [u8]) {
    let out = &mut out[..PATH_LEN];
    out.fill(0);
    let n = path.len().min(PATH_LEN);
    out[..n].copy_from_slice(&path.as_bytes()[..n]);
}
