//! Beacon configuration: live record plus durable copy.
//!
//! Binary format (11 bytes, host-native on disk, big-endian on the wire):
//! - collect_interval: u16
//! - beacon A store / transmit interval: 2 × u16
//! - beacon B store / transmit interval: 2 × u16
//! - force_beacon_b: u8

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::beacon::BeaconType;
use crate::storage::{FileSystem, StorageError, read_blob, write_blob};
use crate::wire::{ByteOrder, DecodeError, Field, Kind, Packer, Schema, Section, Unpacker};

/// Well-known path of the durable configuration
pub const CONFIG_PATH: &str = "cdh.cnf";

/// How often a beacon type is persisted and pushed to ground, in seconds.
///
/// A store interval of 0 persists every captured sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeaconIntervals {
    pub store: u16,
    /// Informational at this layer; consumed by the downlink scheduler
    pub transmit: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRecord {
    /// Seconds between beacon captures
    pub collect_interval: u16,
    pub beacon_a: BeaconIntervals,
    pub beacon_b: BeaconIntervals,
    /// Capture the extended attitude beacon instead of housekeeping
    pub force_beacon_b: bool,
}

impl ConfigRecord {
    /// Compiled-in firmware defaults
    pub const DEFAULT: Self = Self {
        collect_interval: 10,
        beacon_a: BeaconIntervals {
            store: 60,
            transmit: 20,
        },
        beacon_b: BeaconIntervals {
            store: 300,
            transmit: 0,
        },
        force_beacon_b: false,
    };

    pub const fn intervals(&self, beacon: BeaconType) -> BeaconIntervals {
        match beacon {
            BeaconType::A => self.beacon_a,
            BeaconType::B => self.beacon_b,
        }
    }

    /// Beacon variant the collector should capture
    pub const fn capture_type(&self) -> BeaconType {
        if self.force_beacon_b {
            BeaconType::B
        } else {
            BeaconType::A
        }
    }
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Section for ConfigRecord {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("collect_interval", Kind::U16),
        Field::new("beacon_a_store", Kind::U16),
        Field::new("beacon_a_transmit", Kind::U16),
        Field::new("beacon_b_store", Kind::U16),
        Field::new("beacon_b_transmit", Kind::U16),
        Field::new("force_beacon_b", Kind::U8),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u16(self.collect_interval);
        p.u16(self.beacon_a.store);
        p.u16(self.beacon_a.transmit);
        p.u16(self.beacon_b.store);
        p.u16(self.beacon_b.transmit);
        p.u8(self.force_beacon_b as u8);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        Self {
            collect_interval: u.u16(),
            beacon_a: BeaconIntervals {
                store: u.u16(),
                transmit: u.u16(),
            },
            beacon_b: BeaconIntervals {
                store: u.u16(),
                transmit: u.u16(),
            },
            force_beacon_b: u.u8() != 0,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config storage error: {0}")]
    Storage(StorageError),
    #[error("config decode error: {0}")]
    Decode(DecodeError),
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<DecodeError> for ConfigError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// The process-wide live configuration.
///
/// Readers always get a copy; writers replace the whole record, so the
/// collector observes either the old or the new record, never a mix.
pub struct ConfigStore {
    live: BlockingMutex<CriticalSectionRawMutex, Cell<ConfigRecord>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// A store holding the firmware defaults
    pub const fn new() -> Self {
        Self {
            live: BlockingMutex::new(Cell::new(ConfigRecord::DEFAULT)),
        }
    }

    /// Load the durable copy at boot, keeping defaults if it is missing or bad
    pub fn boot<FS: FileSystem>(&self, fs: &FS, path: &str) {
        match self.load(fs, path) {
            Ok(_) => {}
            Err(ConfigError::Storage(StorageError::NotFound)) => {
                info!("No stored configuration at {}, using defaults", path);
            }
            Err(e) => {
                warn!("Failed to load configuration from {}: {}; using defaults", path, e);
            }
        }
    }

    pub fn get(&self) -> ConfigRecord {
        self.live.lock(|c| c.get())
    }

    pub fn set(&self, record: ConfigRecord) {
        self.live.lock(|c| c.set(record));
    }

    /// Replace the live record with the file at `path`.
    ///
    /// Only the size is checked; the contents are trusted.
    pub fn load<FS: FileSystem>(&self, fs: &FS, path: &str) -> Result<ConfigRecord, ConfigError> {
        let mut raw = [0u8; ConfigRecord::SIZE];
        read_blob(fs, path, &mut raw)?;
        let record = ConfigRecord::decode_from(&raw, ByteOrder::Native)?;
        self.set(record);
        info!("Loaded configuration from {}: {:?}", path, record);
        Ok(record)
    }

    /// Persist the live record to `path`
    pub fn save<FS: FileSystem>(&self, fs: &FS, path: &str) -> Result<(), ConfigError> {
        let mut raw = [0u8; ConfigRecord::SIZE];
        self.get().encode_into(&mut raw, ByteOrder::Native);
        write_blob(fs, path, &raw)?;
        info!("Saved configuration to {}", path);
        Ok(())
    }

    /// Reset to firmware defaults and persist them to `path`
    pub fn restore<FS: FileSystem>(&self, fs: &FS, path: &str) -> Result<(), ConfigError> {
        self.set(ConfigRecord::DEFAULT);
        info!("Restored default configuration");
        self.save(fs, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RamFs;

    fn custom() -> ConfigRecord {
        ConfigRecord {
            collect_interval: 5,
            beacon_a: BeaconIntervals {
                store: 15,
                transmit: 30,
            },
            beacon_b: BeaconIntervals {
                store: 0,
                transmit: 600,
            },
            force_beacon_b: true,
        }
    }

    #[test]
    fn test_config_size() {
        assert_eq!(ConfigRecord::SIZE, 11);
    }

    #[test]
    fn test_network_encoding() {
        let mut raw = [0u8; ConfigRecord::SIZE];
        custom().encode_into(&mut raw, ByteOrder::Network);
        assert_eq!(raw, [0, 5, 0, 15, 0, 30, 0, 0, 0x02, 0x58, 1]);
        assert_eq!(
            ConfigRecord::decode_from(&raw, ByteOrder::Network),
            Ok(custom())
        );
    }

    #[test]
    fn test_set_get() {
        let store = ConfigStore::new();
        assert_eq!(store.get(), ConfigRecord::DEFAULT);
        store.set(custom());
        assert_eq!(store.get(), custom());
        assert_eq!(store.get().capture_type(), BeaconType::B);
    }

    #[test]
    fn test_save_then_load() {
        let fs = RamFs::new();
        let store = ConfigStore::new();
        store.set(custom());
        store.save(&fs, "alt.cnf").unwrap();

        let other = ConfigStore::new();
        assert_eq!(other.load(&fs, "alt.cnf"), Ok(custom()));
        assert_eq!(other.get(), custom());
    }

    #[test]
    fn test_load_missing_file_keeps_live_record() {
        let fs = RamFs::new();
        let store = ConfigStore::new();
        store.set(custom());
        assert_eq!(
            store.load(&fs, "missing.cnf"),
            Err(ConfigError::Storage(StorageError::NotFound))
        );
        assert_eq!(store.get(), custom());
    }

    #[test]
    fn test_load_short_file_is_rejected() {
        let fs = RamFs::new();
        write_blob(&fs, CONFIG_PATH, &[1, 2, 3]).unwrap();
        let store = ConfigStore::new();
        assert_eq!(
            store.load(&fs, CONFIG_PATH),
            Err(ConfigError::Storage(StorageError::UnexpectedEof))
        );
    }

    #[test]
    fn test_restore_is_idempotent() {
        let fs = RamFs::new();
        let store = ConfigStore::new();
        store.set(custom());

        store.restore(&fs, CONFIG_PATH).unwrap();
        let first = fs.contents(CONFIG_PATH).unwrap();
        store.set(custom());
        store.restore(&fs, CONFIG_PATH).unwrap();
        let second = fs.contents(CONFIG_PATH).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get(), ConfigRecord::DEFAULT);

        // Live and durable copies agree after a save
        store.save(&fs, CONFIG_PATH).unwrap();
        let mut expected = [0u8; ConfigRecord::SIZE];
        store.get().encode_into(&mut expected, ByteOrder::Native);
        assert_eq!(fs.contents(CONFIG_PATH).unwrap(), expected.to_vec());
    }

    #[test]
    fn test_boot_falls_back_to_defaults() {
        let fs = RamFs::new();
        let store = ConfigStore::new();
        store.boot(&fs, CONFIG_PATH);
        assert_eq!(store.get(), ConfigRecord::DEFAULT);

        let saved = ConfigStore::new();
        saved.set(custom());
        saved.save(&fs, CONFIG_PATH).unwrap();
        store.boot(&fs, CONFIG_PATH);
        assert_eq!(store.get(), custom());
    }
}
