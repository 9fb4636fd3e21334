//! Volatile in-memory filesystem
//!
//! Used by the host test-suite and by simulator runs that should not touch
//! the disk. Supports fault injection so storage failure paths can be
//! exercised without real hardware.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use embedded_io::{ErrorKind, ErrorType, Read, Seek, SeekFrom, Write};

use super::{FileSystem, StorageError};

/// Which operations should currently fail
#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    reads: bool,
    writes: bool,
    /// Write calls left before writes start failing
    writes_left: Option<u32>,
}

impl Faults {
    /// Account for one write call; `true` if it must fail
    fn take_write(&mut self) -> bool {
        match self.writes_left {
            Some(0) => true,
            Some(n) => {
                self.writes_left = Some(n - 1);
                false
            }
            None => self.writes,
        }
    }
}

type FileData = Rc<RefCell<Vec<u8>>>;

/// In-memory filesystem; clones share the same files
#[derive(Clone, Default)]
pub struct RamFs {
    files: Rc<RefCell<BTreeMap<String, FileData>>>,
    faults: Rc<Cell<Faults>>,
}

impl RamFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        let mut faults = self.faults.get();
        faults.writes = fail;
        faults.writes_left = None;
        self.faults.set(faults);
    }

    /// Let the next `calls` write calls through, then fail every write
    /// until [`fail_writes`](Self::fail_writes) resets the fault
    pub fn fail_writes_after(&self, calls: u32) {
        let mut faults = self.faults.get();
        faults.writes_left = Some(calls);
        self.faults.set(faults);
    }

    /// Make every subsequent read fail with an I/O error
    pub fn fail_reads(&self, fail: bool) {
        let mut faults = self.faults.get();
        faults.reads = fail;
        self.faults.set(faults);
    }

    /// Copy of a file's current contents
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).map(|d| d.borrow().clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn handle(&self, data: FileData) -> RamFile {
        RamFile {
            data,
            pos: 0,
            faults: self.faults.clone(),
        }
    }
}

impl FileSystem for RamFs {
    type File = RamFile;

    fn open(&self, path: &str) -> Result<RamFile, StorageError> {
        let data = self
            .files
            .borrow()
            .get(path)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        Ok(self.handle(data))
    }

    fn create(&self, path: &str) -> Result<RamFile, StorageError> {
        if self.faults.get().writes || self.faults.get().writes_left == Some(0) {
            return Err(StorageError::Io(ErrorKind::Other));
        }
        let data: FileData = Rc::default();
        self.files
            .borrow_mut()
            .insert(String::from(path), data.clone());
        Ok(self.handle(data))
    }
}

/// Handle to a file in a [`RamFs`]
pub struct RamFile {
    data: FileData,
    pos: usize,
    faults: Rc<Cell<Faults>>,
}

impl ErrorType for RamFile {
    type Error = ErrorKind;
}

impl Read for RamFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.faults.get().reads {
            return Err(ErrorKind::Other);
        }
        let data = self.data.borrow();
        let available = data.len().saturating_sub(self.pos);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for RamFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut faults = self.faults.get();
        let fail = faults.take_write();
        self.faults.set(faults);
        if fail {
            return Err(ErrorKind::Other);
        }
        let mut data = self.data.borrow_mut();
        let end = self.pos + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Seek for RamFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let len = self.data.borrow().len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(ErrorKind::InvalidInput);
        }
        self.pos = target as usize;
        Ok(target as u64)
    }
}
