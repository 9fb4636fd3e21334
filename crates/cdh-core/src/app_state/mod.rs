//! Shared state of the beacon subsystem
//!
//! One [`CdhState`] is created at boot and borrowed by both the collector
//! task and the network dispatcher.

use log::{error, info};

use crate::beacon::BeaconRecord;
use crate::collector::BeaconSnapshot;
use crate::config::{CONFIG_PATH, ConfigStore};
use crate::storage::{FileSystem, SharedRing, same_file};

/// Default ring file
pub const RING_PATH: &str = "beacon.bin";
/// One day of beacons at the default 10 s collection interval
pub const RING_CAPACITY: u32 = 8640;

/// Where the persistent state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoragePaths {
    pub ring: &'static str,
    pub ring_capacity: u32,
    pub config: &'static str,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self {
            ring: RING_PATH,
            ring_capacity: RING_CAPACITY,
            config: CONFIG_PATH,
        }
    }
}

impl StoragePaths {
    /// Whether `path` is the ring file or the boot configuration
    pub fn is_live(&self, path: &str) -> bool {
        same_file(path, self.ring) || same_file(path, self.config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    /// Configuration loaded and ring attached
    Ready,
    /// Ring store unavailable; the collector keeps retrying
    StorageDegraded,
}

/// Application state container
pub struct CdhState<FS: FileSystem> {
    pub fs: FS,
    pub paths: StoragePaths,
    pub config: ConfigStore,
    pub ring: SharedRing<FS::File, BeaconRecord>,
    pub latest: BeaconSnapshot,
}

impl<FS: FileSystem> CdhState<FS> {
    pub fn new(fs: FS, paths: StoragePaths) -> Self {
        Self {
            fs,
            paths,
            config: ConfigStore::new(),
            ring: SharedRing::new(),
            latest: BeaconSnapshot::new(),
        }
    }

    /// Restore persisted configuration and attach the ring store.
    ///
    /// Neither failure is fatal: configuration falls back to defaults and the
    /// ring is attached lazily on the first successful append.
    pub async fn boot(&self) -> BootState {
        self.config.boot(&self.fs, self.paths.config);

        match self
            .ring
            .ensure_attached(&self.fs, self.paths.ring, self.paths.ring_capacity)
            .await
        {
            Ok(()) => {
                if let Some(span) = self.ring.span().await {
                    info!(
                        "Beacon store {} attached, {} records (seq {}..{})",
                        self.paths.ring,
                        span.len(),
                        span.oldest,
                        span.end
                    );
                }
                BootState::Ready
            }
            Err(e) => {
                error!("Beacon store {} unavailable: {}", self.paths.ring, e);
                BootState::StorageDegraded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigRecord;
    use crate::storage::RamFs;
    use crate::wire::{ByteOrder, Section};
    use embassy_futures::block_on;

    #[test]
    fn test_boot_on_empty_filesystem() {
        let state = CdhState::new(RamFs::new(), StoragePaths::default());
        assert_eq!(block_on(state.boot()), BootState::Ready);
        assert_eq!(state.config.get(), ConfigRecord::DEFAULT);
        assert!(state.fs.exists(RING_PATH));
        assert_eq!(block_on(state.ring.span()).map(|s| s.len()), Some(0));
    }

    #[test]
    fn test_boot_restores_saved_config() {
        let fs = RamFs::new();
        let saved = ConfigRecord {
            collect_interval: 30,
            force_beacon_b: true,
            ..ConfigRecord::DEFAULT
        };
        let mut raw = [0u8; ConfigRecord::SIZE];
        saved.encode_into(&mut raw, ByteOrder::Native);
        crate::storage::write_blob(&fs, CONFIG_PATH, &raw).unwrap();

        let state = CdhState::new(fs, StoragePaths::default());
        block_on(state.boot());
        assert_eq!(state.config.get(), saved);
    }

    #[test]
    fn test_boot_survives_unwritable_storage() {
        let fs = RamFs::new();
        fs.fail_writes(true);
        let state = CdhState::new(fs, StoragePaths::default());
        assert_eq!(block_on(state.boot()), BootState::StorageDegraded);
        assert!(!block_on(state.ring.is_attached()));
    }
}
