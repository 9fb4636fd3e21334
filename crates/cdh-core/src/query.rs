//! Historical beacon queries.
//!
//! A query walks the ring store from the oldest retained record forward and
//! selects records by time window, type mask and a decimation interval. The
//! selection is either streamed to the requesting connection (BEACON_LOG) or
//! dumped to a file for later download (BEACON_STORE).

use embedded_io::Write as _;
use embedded_io_async::Write;
use log::{debug, warn};
use thiserror_no_std::Error;

use crate::beacon::{BEACON_SIZE, BeaconRecord, MASK_ALL};
use crate::storage::{
    FileSystem, PATH_LEN, Path, SharedRing, StorageError, path_from_wire, path_to_wire,
};
use crate::wire::{ByteOrder, DecodeError, Field, Kind, Packer, Schema, Section, Unpacker};

/// BEACON_LOG request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeaconRequest {
    /// Inclusive lower bound, UNIX seconds
    pub from: u32,
    /// Inclusive upper bound, UNIX seconds
    pub to: u32,
    /// Minimum gap between emitted records, seconds
    pub min_interval: u16,
    pub max_count: u16,
    /// Beacon type flags to match
    pub mask: u8,
}

impl Section for BeaconRequest {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("from", Kind::U32),
        Field::new("to", Kind::U32),
        Field::new("min_interval", Kind::U16),
        Field::new("max_count", Kind::U16),
        Field::new("mask", Kind::U8),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u32(self.from);
        p.u32(self.to);
        p.u16(self.min_interval);
        p.u16(self.max_count);
        p.u8(self.mask);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        Self {
            from: u.u32(),
            to: u.u32(),
            min_interval: u.u16(),
            max_count: u.u16(),
            mask: u.u8(),
        }
    }
}

impl BeaconRequest {
    pub fn from_bytes(input: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_from(input, ByteOrder::Network)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        self.encode_into(&mut out, ByteOrder::Network);
        out
    }

    fn selection(&self) -> Selection {
        Selection::new(
            self.from,
            self.to,
            self.min_interval as u32,
            Some(self.max_count as u32),
            self.mask,
        )
    }
}

/// Time window and interval of a BEACON_STORE request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StoreWindow {
    from: u32,
    to: u32,
    interval: u16,
}

impl Section for StoreWindow {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("from", Kind::U32),
        Field::new("to", Kind::U32),
        Field::new("interval", Kind::U16),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u32(self.from);
        p.u32(self.to);
        p.u16(self.interval);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        Self {
            from: u.u32(),
            to: u.u32(),
            interval: u.u16(),
        }
    }
}

/// BEACON_STORE request: export a selection to `path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    pub from: u32,
    pub to: u32,
    pub interval: u16,
    pub path: Path,
}

impl StoreRequest {
    pub const SIZE: usize = StoreWindow::SIZE + PATH_LEN;

    pub fn from_bytes(input: &[u8]) -> Result<Self, DecodeError> {
        if input.len() < Self::SIZE {
            return Err(DecodeError::Truncated {
                expected: Self::SIZE,
                actual: input.len(),
            });
        }
        let window = StoreWindow::decode_from(input, ByteOrder::Network)?;
        let path = path_from_wire(&input[StoreWindow::SIZE..Self::SIZE])?;
        Ok(Self {
            from: window.from,
            to: window.to,
            interval: window.interval,
            path,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let window = StoreWindow {
            from: self.from,
            to: self.to,
            interval: self.interval,
        };
        window.encode_into(&mut out, ByteOrder::Network);
        path_to_wire(&self.path, &mut out[StoreWindow::SIZE..]);
        out
    }

    fn selection(&self) -> Selection {
        Selection::new(self.from, self.to, self.interval as u32, None, MASK_ALL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Emit,
    Skip,
    /// Count cap reached; nothing further will be emitted
    Done,
}

/// Window, mask, decimation and count filter over a chronological walk
#[derive(Debug, Clone)]
pub struct Selection {
    from: u32,
    to: u32,
    min_interval: u32,
    max_count: Option<u32>,
    mask: u8,
    last_emitted: Option<u32>,
    emitted: u32,
}

impl Selection {
    pub fn new(from: u32, to: u32, min_interval: u32, max_count: Option<u32>, mask: u8) -> Self {
        Self {
            from,
            to,
            min_interval,
            max_count,
            mask,
            last_emitted: None,
            emitted: 0,
        }
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Decide on the next record; an `Emit` verdict counts it as sent
    pub fn offer(&mut self, record: &BeaconRecord) -> Verdict {
        if self.max_count.is_some_and(|max| self.emitted >= max) {
            return Verdict::Done;
        }

        let ts = record.timestamp;
        if ts < self.from || ts > self.to || !record.matches_mask(self.mask) {
            return Verdict::Skip;
        }
        if let Some(last) = self.last_emitted {
            if ts.saturating_sub(last) < self.min_interval {
                return Verdict::Skip;
            }
        }

        self.last_emitted = Some(ts);
        self.emitted += 1;
        Verdict::Emit
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    #[error("beacon store: {0}")]
    Storage(StorageError),
    #[error("reply connection failed")]
    Link,
}

impl From<StorageError> for QueryError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Chronological walk over the span retained when the walk started
struct Walk {
    next: u64,
    end: u64,
}

impl Walk {
    async fn start<F>(ring: &SharedRing<F, BeaconRecord>) -> Result<Self, StorageError>
    where
        F: embedded_io::Read + embedded_io::Write + embedded_io::Seek,
    {
        let span = ring.span().await.ok_or(StorageError::NotFound)?;
        Ok(Self {
            next: span.oldest,
            end: span.end,
        })
    }

    /// Next record still retained. Records evicted mid-walk and records that
    /// no longer decode are skipped; I/O errors end the walk.
    async fn next<F>(
        &mut self,
        ring: &SharedRing<F, BeaconRecord>,
    ) -> Result<Option<BeaconRecord>, StorageError>
    where
        F: embedded_io::Read + embedded_io::Write + embedded_io::Seek,
    {
        while self.next < self.end {
            let seq = self.next;
            self.next += 1;
            match ring.read(seq).await {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(StorageError::Corrupt) => warn!("Skipping corrupt beacon, sequence {}", seq),
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Stream the selected records to `conn` as network-order frames.
///
/// Returns the number of frames sent. Completion is signalled to the peer by
/// closing the connection, which is up to the caller.
pub async fn serve_beacons<F, W>(
    ring: &SharedRing<F, BeaconRecord>,
    conn: &mut W,
    request: &BeaconRequest,
) -> Result<u32, QueryError>
where
    F: embedded_io::Read + embedded_io::Write + embedded_io::Seek,
    W: Write,
{
    let mut selection = request.selection();
    let mut walk = Walk::start(ring).await?;

    while let Some(record) = walk.next(ring).await? {
        match selection.offer(&record) {
            Verdict::Emit => {
                let frame = record.encode(ByteOrder::Network);
                conn.write_all(&frame).await.map_err(|_| QueryError::Link)?;
            }
            Verdict::Skip => {}
            Verdict::Done => break,
        }
    }
    conn.flush().await.map_err(|_| QueryError::Link)?;

    debug!("Sent {} beacons for {:?}", selection.emitted(), request);
    Ok(selection.emitted())
}

/// Write the selected records to `request.path` as network-order frames
pub async fn export<FS>(
    ring: &SharedRing<FS::File, BeaconRecord>,
    fs: &FS,
    request: &StoreRequest,
) -> Result<u32, StorageError>
where
    FS: FileSystem,
{
    let mut selection = request.selection();
    let mut walk = Walk::start(ring).await?;
    let mut file = fs.create(&request.path)?;

    while let Some(record) = walk.next(ring).await? {
        match selection.offer(&record) {
            Verdict::Emit => {
                let frame: [u8; BEACON_SIZE] = record.encode(ByteOrder::Network);
                file.write_all(&frame).map_err(StorageError::io)?;
            }
            Verdict::Skip => {}
            Verdict::Done => break,
        }
    }
    file.flush().map_err(StorageError::io)?;

    debug!("Exported {} beacons to {}", selection.emitted(), request.path);
    Ok(selection.emitted())
}
