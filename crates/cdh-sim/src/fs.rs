//! Host filesystem backend rooted at the simulator data directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use cdh_core::storage::{FileSystem, StorageError};
use embedded_io::{ErrorKind, ErrorType, Read, Seek, SeekFrom, Write};

/// Device paths are resolved relative to `root`; a leading `/` is ignored and
/// paths that would leave `root` are refused.
#[derive(Debug, Clone)]
pub struct StdFs {
    root: PathBuf,
}

impl StdFs {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::Io(ErrorKind::PermissionDenied));
        }
        Ok(self.root.join(relative))
    }
}

fn kind(e: io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
        io::ErrorKind::TimedOut => ErrorKind::TimedOut,
        io::ErrorKind::Interrupted => ErrorKind::Interrupted,
        io::ErrorKind::WriteZero => ErrorKind::WriteZero,
        _ => ErrorKind::Other,
    }
}

fn open_with(path: &Path, options: &OpenOptions) -> Result<StdFile, StorageError> {
    options
        .open(path)
        .map(|inner| StdFile { inner })
        .map_err(|e| StorageError::io(kind(e)))
}

impl FileSystem for StdFs {
    type File = StdFile;

    fn open(&self, path: &str) -> Result<StdFile, StorageError> {
        open_with(
            &self.resolve(path)?,
            OpenOptions::new().read(true).write(true),
        )
    }

    fn create(&self, path: &str) -> Result<StdFile, StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(kind(e)))?;
        }
        open_with(
            &full,
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true),
        )
    }
}

pub struct StdFile {
    inner: File,
}

impl ErrorType for StdFile {
    type Error = ErrorKind;
}

impl Read for StdFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        io::Read::read(&mut self.inner, buf).map_err(kind)
    }
}

impl Write for StdFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        io::Write::write(&mut self.inner, buf).map_err(kind)
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        io::Write::flush(&mut self.inner).map_err(kind)
    }
}

impl Seek for StdFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, ErrorKind> {
        let pos = match pos {
            SeekFrom::Start(n) => io::SeekFrom::Start(n),
            SeekFrom::End(n) => io::SeekFrom::End(n),
            SeekFrom::Current(n) => io::SeekFrom::Current(n),
        };
        io::Seek::seek(&mut self.inner, pos).map_err(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdh_core::beacon::{BeaconRecord, HousekeepingA};
    use cdh_core::storage::{RingStore, read_blob, write_blob};

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFs::new(dir.path()).unwrap();
        assert!(matches!(fs.open("nope.bin"), Err(StorageError::NotFound)));
    }

    #[test]
    fn test_blob_roundtrip_with_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFs::new(dir.path()).unwrap();
        write_blob(&fs, "/flash/cdh.cnf", &[9, 8, 7]).unwrap();
        assert!(dir.path().join("flash/cdh.cnf").exists());

        let mut buf = [0u8; 3];
        read_blob(&fs, "flash/cdh.cnf", &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7]);
    }

    #[test]
    fn test_paths_cannot_leave_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFs::new(dir.path().join("data")).unwrap();
        let denied = Err(StorageError::Io(ErrorKind::PermissionDenied));

        assert_eq!(fs.resolve("../escape.bin"), denied);
        assert_eq!(fs.resolve("/flash/../../escape.bin"), denied);
        assert!(matches!(
            write_blob(&fs, "../escape.bin", &[1]),
            Err(StorageError::Io(ErrorKind::PermissionDenied))
        ));
        assert!(!dir.path().join("escape.bin").exists());

        assert_eq!(fs.resolve("/flash/a.bin"), Ok(dir.path().join("data/flash/a.bin")));
    }

    #[test]
    fn test_ring_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdFs::new(dir.path()).unwrap();
        let record = BeaconRecord::housekeeping(77, HousekeepingA::default());
        {
            let mut ring = RingStore::create(&fs, "beacon.bin", 4).unwrap();
            ring.append(&record).unwrap();
        }
        let mut ring: RingStore<StdFile, BeaconRecord> =
            RingStore::open(&fs, "beacon.bin").unwrap();
        assert_eq!(ring.total_writes(), 1);
        assert_eq!(ring.read(0).unwrap(), Some(record));
    }
}
