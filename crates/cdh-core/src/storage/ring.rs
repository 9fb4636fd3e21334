//! Fixed-capacity circular record log on persistent storage.
//!
//! ## File layout
//!
//! - header: 32 bytes, a postcard-encoded [`RingHeader`] followed by zero fill
//! - slots: `capacity` records of `record_size` bytes, host-native layout
//!
//! Every append gets a sequence number equal to the number of records written
//! before it. Sequence `n` lives in slot `n % capacity`; once the store has
//! wrapped, the oldest retained sequence is `total_writes - capacity`, so the
//! oldest record sits at slot `total_writes % capacity`, not slot 0.

use alloc::vec;
use alloc::vec::Vec;
use core::marker::PhantomData;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_io::{Read, Seek, SeekFrom, Write};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{FileSystem, StorageError};
use crate::wire::DecodeError;

/// "NMBR"
pub const RING_MAGIC: u32 = 0x4E4D_4252;
pub const RING_VERSION: u8 = 1;
/// Bytes reserved for the header at the start of the file
pub const RING_HEADER_SIZE: usize = 32;

/// A fixed-size record that can live in a [`RingStore`]
pub trait Record: Sized {
    /// Encoded size in bytes; constant for every record of the type
    const SIZE: usize;

    /// Capture time, seconds since epoch
    fn timestamp(&self) -> u32;

    /// Write the host-native encoding into `out[..Self::SIZE]`
    fn write_native(&self, out: &mut [u8]);

    fn read_native(input: &[u8]) -> Result<Self, DecodeError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
struct RingHeader {
    magic: u32,
    version: u8,
    record_size: u32,
    capacity: u32,
    /// Slot the next append goes to
    head: u32,
    /// Records ever appended
    total_writes: u64,
}

impl RingHeader {
    fn encode(&self) -> Result<[u8; RING_HEADER_SIZE], StorageError> {
        let mut buf = [0u8; RING_HEADER_SIZE];
        postcard::to_slice(self, &mut buf).map_err(|_| StorageError::Corrupt)?;
        Ok(buf)
    }

    fn decode(buf: &[u8; RING_HEADER_SIZE]) -> Result<Self, StorageError> {
        postcard::from_bytes(buf).map_err(|_| StorageError::HeaderMismatch)
    }
}

/// Sequence numbers currently retained by a store, `oldest..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSpan {
    pub oldest: u64,
    pub end: u64,
}

impl RingSpan {
    pub fn len(&self) -> u64 {
        self.end - self.oldest
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.oldest
    }

    pub fn contains(&self, seq: u64) -> bool {
        seq >= self.oldest && seq < self.end
    }
}

/// Handle to an open ring store file
pub struct RingStore<F, R> {
    file: F,
    header: RingHeader,
    scratch: Vec<u8>,
    /// Slot left half-written by a failed append
    torn: Option<u32>,
    _record: PhantomData<R>,
}

impl<F, R> RingStore<F, R>
where
    F: Read + Write + Seek,
    R: Record,
{
    /// Attach to an existing store.
    ///
    /// Fails with [`StorageError::NotFound`] if the file does not exist and
    /// [`StorageError::HeaderMismatch`] if it was not formatted for `R`.
    pub fn open<FS>(fs: &FS, path: &str) -> Result<Self, StorageError>
    where
        FS: FileSystem<File = F>,
    {
        let mut file = fs.open(path)?;

        let mut raw = [0u8; RING_HEADER_SIZE];
        file.seek(SeekFrom::Start(0)).map_err(StorageError::io)?;
        file.read_exact(&mut raw).map_err(StorageError::read_exact)?;
        let header = RingHeader::decode(&raw)?;

        if header.magic != RING_MAGIC
            || header.version != RING_VERSION
            || header.record_size as usize != R::SIZE
            || header.capacity == 0
        {
            return Err(StorageError::HeaderMismatch);
        }
        if header.head as u64 != header.total_writes % header.capacity as u64 {
            return Err(StorageError::Corrupt);
        }

        info!(
            "Opened ring store {}: {} of {} records, {} written",
            path,
            header.total_writes.min(header.capacity as u64),
            header.capacity,
            header.total_writes
        );

        Ok(Self::from_parts(file, header))
    }

    /// Format a new, empty store, discarding anything already at `path`
    pub fn create<FS>(fs: &FS, path: &str, capacity: u32) -> Result<Self, StorageError>
    where
        FS: FileSystem<File = F>,
    {
        if capacity == 0 {
            return Err(StorageError::InvalidCapacity);
        }

        let file = fs.create(path)?;
        let header = RingHeader {
            magic: RING_MAGIC,
            version: RING_VERSION,
            record_size: R::SIZE as u32,
            capacity,
            head: 0,
            total_writes: 0,
        };
        let mut store = Self::from_parts(file, header);
        store.write_header()?;

        info!("Created ring store {} ({} x {} bytes)", path, capacity, R::SIZE);
        Ok(store)
    }

    /// Open the store at `path`, formatting it if it does not exist yet
    pub fn open_or_create<FS>(fs: &FS, path: &str, capacity: u32) -> Result<Self, StorageError>
    where
        FS: FileSystem<File = F>,
    {
        match Self::open(fs, path) {
            Err(StorageError::NotFound) => Self::create(fs, path, capacity),
            other => other,
        }
    }

    fn from_parts(file: F, header: RingHeader) -> Self {
        Self {
            file,
            header,
            scratch: vec![0; R::SIZE],
            torn: None,
            _record: PhantomData,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.header.capacity
    }

    /// Slot the next append will write
    pub fn head(&self) -> u32 {
        self.header.head
    }

    /// Records appended over the lifetime of the store
    pub fn total_writes(&self) -> u64 {
        self.header.total_writes
    }

    /// Number of records currently retained
    pub fn len(&self) -> u64 {
        self.span().len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.total_writes == 0
    }

    pub fn span(&self) -> RingSpan {
        let end = self.header.total_writes;
        RingSpan {
            oldest: end.saturating_sub(self.header.capacity as u64),
            end,
        }
    }

    fn slot_offset(&self, slot: u32) -> u64 {
        RING_HEADER_SIZE as u64 + slot as u64 * R::SIZE as u64
    }

    fn write_header(&mut self) -> Result<(), StorageError> {
        let raw = self.header.encode()?;
        self.file.seek(SeekFrom::Start(0)).map_err(StorageError::io)?;
        self.file.write_all(&raw).map_err(StorageError::io)?;
        self.file.flush().map_err(StorageError::io)
    }

    /// Write `record` at the head, overwriting the oldest record when full.
    ///
    /// Returns the sequence number of the new record. The in-memory header is
    /// only advanced once both the record and the header reached storage.
    /// If an append that overwrites a retained record fails, that slot is
    /// reported as evicted until the next successful append rewrites it.
    pub fn append(&mut self, record: &R) -> Result<u64, StorageError> {
        let seq = self.header.total_writes;
        let slot = self.header.head;
        let offset = self.slot_offset(slot);

        if seq >= self.header.capacity as u64 {
            self.torn = Some(slot);
        }
        record.write_native(&mut self.scratch);
        self.file.seek(SeekFrom::Start(offset)).map_err(StorageError::io)?;
        self.file.write_all(&self.scratch).map_err(StorageError::io)?;

        let previous = self.header;
        self.header.total_writes += 1;
        self.header.head = ((seq + 1) % self.header.capacity as u64) as u32;
        if let Err(e) = self.write_header() {
            self.header = previous;
            return Err(e);
        }
        self.torn = None;

        debug!("Ring append seq {} at slot {}", seq, slot);
        Ok(seq)
    }

    /// Read the record with sequence number `seq`, `None` if not retained
    pub fn read(&mut self, seq: u64) -> Result<Option<R>, StorageError> {
        if !self.span().contains(seq) {
            return Ok(None);
        }

        let slot = (seq % self.header.capacity as u64) as u32;
        if self.torn == Some(slot) {
            return Ok(None);
        }
        let offset = self.slot_offset(slot);
        self.file.seek(SeekFrom::Start(offset)).map_err(StorageError::io)?;
        self.file
            .read_exact(&mut self.scratch)
            .map_err(StorageError::read_exact)?;

        Ok(Some(R::read_native(&self.scratch)?))
    }

    /// Walk retained records oldest to newest, yielding those accepted by
    /// `select(seq, &record)`.
    ///
    /// The walk covers the records present when it starts. Calling this
    /// again restarts from the oldest record.
    pub fn read_range<P>(&mut self, select: P) -> RangeIter<'_, F, R, P>
    where
        P: FnMut(u64, &R) -> bool,
    {
        let span = self.span();
        RangeIter {
            store: self,
            next: span.oldest,
            end: span.end,
            select,
        }
    }
}

/// Lazy iterator returned by [`RingStore::read_range`]
pub struct RangeIter<'a, F, R, P> {
    store: &'a mut RingStore<F, R>,
    next: u64,
    end: u64,
    select: P,
}

impl<F, R, P> Iterator for RangeIter<'_, F, R, P>
where
    F: Read + Write + Seek,
    R: Record,
    P: FnMut(u64, &R) -> bool,
{
    type Item = Result<(u64, R), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let seq = self.next;
            self.next += 1;
            match self.store.read(seq) {
                Ok(Some(record)) => {
                    if (self.select)(seq, &record) {
                        return Some(Ok((seq, record)));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.next = self.end;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// A ring store shared between the collector (single writer) and any
/// number of query handlers.
///
/// Readers take a [`RingSpan`] snapshot under a short lock and then read
/// records one at a time, each under its own short lock. A record evicted by
/// a concurrent append between those steps is reported as absent rather
/// than replaced by its newer neighbour.
pub struct SharedRing<F, R> {
    inner: Mutex<CriticalSectionRawMutex, Option<RingStore<F, R>>>,
}

impl<F, R> Default for SharedRing<F, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, R> SharedRing<F, R> {
    /// A shared slot with no store attached yet
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }
}

impl<F, R> SharedRing<F, R>
where
    F: Read + Write + Seek,
    R: Record,
{
    pub fn with_store(store: RingStore<F, R>) -> Self {
        Self {
            inner: Mutex::new(Some(store)),
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Attach the store at `path` if none is attached, formatting it when absent
    pub async fn ensure_attached<FS>(
        &self,
        fs: &FS,
        path: &str,
        capacity: u32,
    ) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        let mut guard = self.inner.lock().await;
        if guard.is_none() {
            *guard = Some(RingStore::open_or_create(fs, path, capacity)?);
        }
        Ok(())
    }

    pub async fn append(&self, record: &R) -> Result<u64, StorageError> {
        match self.inner.lock().await.as_mut() {
            Some(store) => store.append(record),
            None => Err(StorageError::NotFound),
        }
    }

    /// Retained sequence numbers right now, `None` when no store is attached
    pub async fn span(&self) -> Option<RingSpan> {
        self.inner.lock().await.as_ref().map(|s| s.span())
    }

    /// Read one record; `Ok(None)` if it has been evicted or never existed
    pub async fn read(&self, seq: u64) -> Result<Option<R>, StorageError> {
        match self.inner.lock().await.as_mut() {
            Some(store) => store.read(seq),
            None => Err(StorageError::NotFound),
        }
    }
}
