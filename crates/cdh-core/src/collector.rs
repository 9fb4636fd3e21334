//! Periodic beacon sample collector.
//!
//! Every `collect_interval` seconds the collector polls each remote subsystem
//! for its housekeeping section, reads the local board sensors, assembles one
//! beacon of the configured variant, publishes it as the latest beacon and,
//! when the per-type store interval has elapsed, appends it to the ring store.
//!
//! A subsystem that times out or answers garbage does not abort the cycle:
//! its section is zero-filled and the beacon is still captured.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::app_state::CdhState;
use crate::beacon::{
    AdcsExt, AdcsHk, AttitudeB, BeaconRecord, BeaconType, CameraHk, ComHk, EpsHk, HousekeepingA,
    HubHk, ObcHk,
};
use crate::csp::{DEFAULT_TIMEOUT, NodeMap, Subsystem, Transport, TransportError};
use crate::sensors::{BoardSensors, Clock};
use crate::storage::{FileSystem, StorageError};
use crate::wire::{ByteOrder, MAX_SECTION_SIZE, Section};

/// A housekeeping section fetched from a remote node
pub trait RemoteSection: Section {
    const SUBSYSTEM: Subsystem;
    /// Port of the housekeeping service on the remote node
    const PORT: u8;
    /// Request payload selecting the telemetry table
    const REQUEST: &'static [u8];
}

impl RemoteSection for EpsHk {
    const SUBSYSTEM: Subsystem = Subsystem::Eps;
    const PORT: u8 = 8;
    const REQUEST: &'static [u8] = &[0x00];
}

impl RemoteSection for ComHk {
    const SUBSYSTEM: Subsystem = Subsystem::Com;
    const PORT: u8 = 9;
    const REQUEST: &'static [u8] = &[0x00];
}

impl RemoteSection for CameraHk {
    const SUBSYSTEM: Subsystem = Subsystem::Camera;
    const PORT: u8 = 10;
    const REQUEST: &'static [u8] = &[0x00];
}

impl RemoteSection for HubHk {
    const SUBSYSTEM: Subsystem = Subsystem::Hub;
    const PORT: u8 = 8;
    const REQUEST: &'static [u8] = &[0x00];
}

impl RemoteSection for AdcsHk {
    const SUBSYSTEM: Subsystem = Subsystem::Adcs;
    const PORT: u8 = 20;
    const REQUEST: &'static [u8] = &[0x00];
}

impl RemoteSection for AdcsExt {
    const SUBSYSTEM: Subsystem = Subsystem::Adcs;
    const PORT: u8 = 20;
    const REQUEST: &'static [u8] = &[0x01];
}

/// The most recently captured beacon, shared with other tasks by copy
pub struct BeaconSnapshot {
    latest: BlockingMutex<CriticalSectionRawMutex, Cell<Option<BeaconRecord>>>,
}

impl Default for BeaconSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconSnapshot {
    pub const fn new() -> Self {
        Self {
            latest: BlockingMutex::new(Cell::new(None)),
        }
    }

    pub fn latest(&self) -> Option<BeaconRecord> {
        self.latest.lock(|c| c.get())
    }

    fn publish(&self, record: BeaconRecord) {
        self.latest.lock(|c| c.set(Some(record)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Collecting,
    Committing,
}

/// What happened to the captured beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    /// Appended with this sequence number
    Stored(u64),
    /// Store interval for this beacon type has not elapsed
    NotDue,
    /// Ring store unavailable or append failed; retried next cycle
    Failed(StorageError),
}

/// Outcome of one collection cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub record: BeaconRecord,
    /// Subsystems whose section was zero-filled
    pub missing: heapless::Vec<Subsystem, 8>,
    pub local_sensors_ok: bool,
    pub persisted: Persisted,
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorSettings {
    pub nodes: NodeMap,
    /// Per-subsystem transaction timeout
    pub timeout: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            nodes: NodeMap::DEFAULT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The beacon capture task; the only writer of the ring store
pub struct SampleCollector<'a, FS, T, S, C>
where
    FS: FileSystem,
{
    state: &'a CdhState<FS>,
    transport: T,
    sensors: S,
    clock: C,
    settings: CollectorSettings,
    last_stored: [Option<u32>; 2],
    phase: CollectorState,
}

impl<'a, FS, T, S, C> SampleCollector<'a, FS, T, S, C>
where
    FS: FileSystem,
    T: Transport,
    S: BoardSensors,
    C: Clock,
{
    pub fn new(
        state: &'a CdhState<FS>,
        transport: T,
        sensors: S,
        clock: C,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            state,
            transport,
            sensors,
            clock,
            settings,
            last_stored: [None; 2],
            phase: CollectorState::Idle,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.phase
    }

    /// Run collection cycles forever, sleeping `collect_interval` between them
    pub async fn run<D: DelayNs>(&mut self, delay: &mut D) -> ! {
        info!("Beacon collector started");
        loop {
            self.collect_once().await;

            let interval = self.state.config.get().collect_interval.max(1);
            delay.delay_ms(interval as u32 * 1000).await;
        }
    }

    /// Run a single collection cycle
    pub async fn collect_once(&mut self) -> CycleReport {
        self.phase = CollectorState::Collecting;
        let config = self.state.config.get();
        let timestamp = self.clock.now();
        let mut missing = heapless::Vec::new();

        debug!("Collecting beacon {:?} at {}", config.capture_type(), timestamp);

        let mut local_sensors_ok = true;
        let record = match config.capture_type() {
            BeaconType::A => {
                let obc = match self.sensors.read().await {
                    Ok(readings) => ObcHk::from(readings),
                    Err(e) => {
                        warn!("Local sensors unavailable: {}", e);
                        local_sensors_ok = false;
                        ObcHk::default()
                    }
                };
                let hk = HousekeepingA {
                    obc,
                    com: self.fetch_or_zero(&mut missing).await,
                    eps: self.fetch_or_zero(&mut missing).await,
                    camera: self.fetch_or_zero(&mut missing).await,
                    hub: self.fetch_or_zero(&mut missing).await,
                    adcs: self.fetch_or_zero(&mut missing).await,
                };
                BeaconRecord::housekeeping(timestamp, hk)
            }
            BeaconType::B => {
                let att = AttitudeB {
                    adcs: self.fetch_or_zero(&mut missing).await,
                };
                BeaconRecord::attitude(timestamp, att)
            }
        };

        self.state.latest.publish(record);

        self.phase = CollectorState::Committing;
        let persisted = self.commit(&record, config.intervals(record.beacon_type()).store).await;
        self.phase = CollectorState::Idle;
        debug!("{} ({:?})", record, persisted);

        CycleReport {
            record,
            missing,
            local_sensors_ok,
            persisted,
        }
    }

    async fn commit(&mut self, record: &BeaconRecord, store_interval: u16) -> Persisted {
        let slot = &mut self.last_stored[record.beacon_type().index()];
        let due = match *slot {
            None => true,
            // A clock that went backwards counts as due
            Some(last) => record
                .timestamp
                .checked_sub(last)
                .is_none_or(|elapsed| elapsed >= store_interval as u32),
        };
        if !due {
            return Persisted::NotDue;
        }

        let ring = &self.state.ring;
        let paths = &self.state.paths;
        let appended = match ring
            .ensure_attached(&self.state.fs, paths.ring, paths.ring_capacity)
            .await
        {
            Ok(()) => ring.append(record).await,
            Err(e) => Err(e),
        };

        match appended {
            Ok(seq) => {
                *slot = Some(record.timestamp);
                Persisted::Stored(seq)
            }
            Err(e) => {
                error!("Failed to store beacon at {}: {}", record.timestamp, e);
                Persisted::Failed(e)
            }
        }
    }

    async fn fetch<R: RemoteSection>(&mut self) -> Result<R, TransportError> {
        let node = self.settings.nodes.node(R::SUBSYSTEM);
        let mut reply = [0u8; MAX_SECTION_SIZE];
        let n = self
            .transport
            .transact(node, R::PORT, R::REQUEST, &mut reply, self.settings.timeout)
            .await?;

        let short = TransportError::ShortReply {
            expected: R::SIZE,
            actual: n,
        };
        if n < R::SIZE {
            return Err(short);
        }
        R::decode_from(&reply[..n], ByteOrder::Network).map_err(|_| short)
    }

    async fn fetch_or_zero<R: RemoteSection>(
        &mut self,
        missing: &mut heapless::Vec<Subsystem, 8>,
    ) -> R {
        match self.fetch::<R>().await {
            Ok(section) => section,
            Err(e) => {
                warn!("{} telemetry unavailable: {}", R::SUBSYSTEM.name(), e);
                if !missing.contains(&R::SUBSYSTEM) {
                    let _ = missing.push(R::SUBSYSTEM);
                }
                R::default()
            }
        }
    }
}
