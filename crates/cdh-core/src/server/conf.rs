//! CONF port protocol: one opcode byte followed by an opcode-specific payload.

use log::{error, warn};

use super::Status;
use crate::app_state::StoragePaths;
use crate::config::{ConfigError, ConfigRecord, ConfigStore};
use crate::storage::{
    FileSystem, PATH_LEN, Path, StorageError, path_from_wire, path_to_wire, same_file,
};
use crate::wire::{ByteOrder, DecodeError, Section};

const OP_GET: u8 = 0;
const OP_SET: u8 = 1;
const OP_LOAD: u8 = 2;
const OP_SAVE: u8 = 3;
const OP_RESTORE: u8 = 4;

/// Longest CONF request on the wire
pub const MAX_REQUEST_SIZE: usize = 1 + PATH_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfRequest {
    Get,
    Set(ConfigRecord),
    Load(Path),
    Save(Path),
    Restore,
}

impl ConfRequest {
    /// Payload length following `opcode`, or `None` for an unknown opcode
    pub const fn payload_len(opcode: u8) -> Option<usize> {
        match opcode {
            OP_GET | OP_RESTORE => Some(0),
            OP_SET => Some(ConfigRecord::SIZE),
            OP_LOAD | OP_SAVE => Some(PATH_LEN),
            _ => None,
        }
    }

    pub fn from_bytes(input: &[u8]) -> Result<Self, DecodeError> {
        let (&opcode, payload) = input.split_first().ok_or(DecodeError::Truncated {
            expected: 1,
            actual: 0,
        })?;
        let len = Self::payload_len(opcode).ok_or(DecodeError::UnknownCommand(opcode))?;
        if payload.len() < len {
            return Err(DecodeError::Truncated {
                expected: 1 + len,
                actual: input.len(),
            });
        }

        Ok(match opcode {
            OP_GET => Self::Get,
            OP_SET => Self::Set(ConfigRecord::decode_from(payload, ByteOrder::Network)?),
            OP_LOAD => Self::Load(path_from_wire(&payload[..len])?),
            OP_SAVE => Self::Save(path_from_wire(&payload[..len])?),
            _ => Self::Restore,
        })
    }

    /// Encode as sent by a client; returns the buffer and its used length
    pub fn to_bytes(&self) -> ([u8; MAX_REQUEST_SIZE], usize) {
        let mut out = [0u8; MAX_REQUEST_SIZE];
        let opcode = match self {
            Self::Get => OP_GET,
            Self::Set(record) => {
                record.encode_into(&mut out[1..], ByteOrder::Network);
                OP_SET
            }
            Self::Load(path) => {
                path_to_wire(path, &mut out[1..]);
                OP_LOAD
            }
            Self::Save(path) => {
                path_to_wire(path, &mut out[1..]);
                OP_SAVE
            }
            Self::Restore => OP_RESTORE,
        };
        out[0] = opcode;
        // payload_len is defined for every opcode produced above
        let len = 1 + Self::payload_len(opcode).unwrap_or(0);
        (out, len)
    }
}

/// Reply to a CONF request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfReply {
    /// Network-order configuration record
    Record([u8; ConfigRecord::SIZE]),
    Status(Status),
}

impl ConfReply {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Record(raw) => raw,
            Self::Status(status) => status.as_bytes(),
        }
    }
}

/// Execute a CONF request against the live configuration.
///
/// `load` and `save` never touch the ring file.
pub fn apply<FS: FileSystem>(
    config: &ConfigStore,
    fs: &FS,
    paths: &StoragePaths,
    request: &ConfRequest,
) -> ConfReply {
    if let ConfRequest::Load(path) | ConfRequest::Save(path) = request {
        if same_file(path, paths.ring) {
            warn!("Refusing configuration {:?} on the ring file", request);
            return ConfReply::Status(Status::Failed);
        }
    }

    let result = match request {
        ConfRequest::Get => {
            let mut raw = [0u8; ConfigRecord::SIZE];
            config.get().encode_into(&mut raw, ByteOrder::Network);
            return ConfReply::Record(raw);
        }
        ConfRequest::Set(record) => {
            config.set(*record);
            Ok(())
        }
        ConfRequest::Load(path) => config.load(fs, path).map(|_| ()),
        ConfRequest::Save(path) => config.save(fs, path),
        ConfRequest::Restore => config.restore(fs, paths.config),
    };

    match result {
        Ok(()) => ConfReply::Status(Status::Ok),
        Err(e) => {
            error!("Configuration {:?} failed: {}", request, e);
            ConfReply::Status(match e {
                ConfigError::Storage(StorageError::NotFound) => Status::NotFound,
                _ => Status::Failed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BeaconIntervals, CONFIG_PATH};
    use crate::storage::write_blob;
    use crate::storage::RamFs;

    fn custom() -> ConfigRecord {
        ConfigRecord {
            collect_interval: 0x0102,
            beacon_a: BeaconIntervals {
                store: 0x0304,
                transmit: 0x0506,
            },
            beacon_b: BeaconIntervals {
                store: 0x0708,
                transmit: 0x090A,
            },
            force_beacon_b: true,
        }
    }

    #[test]
    fn test_request_encoding() {
        let (raw, len) = ConfRequest::Set(custom()).to_bytes();
        assert_eq!(&raw[..len], &[1, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 1]);
        assert_eq!(ConfRequest::from_bytes(&raw[..len]), Ok(ConfRequest::Set(custom())));

        let (raw, len) = ConfRequest::Load(Path::try_from("a.cnf").unwrap()).to_bytes();
        assert_eq!(len, 51);
        assert_eq!(&raw[..6], &[2, b'a', b'.', b'c', b'n', b'f']);

        let (raw, len) = ConfRequest::Restore.to_bytes();
        assert_eq!(&raw[..len], &[4]);
    }

    #[test]
    fn test_malformed_requests() {
        assert!(matches!(ConfRequest::from_bytes(&[]), Err(DecodeError::Truncated { .. })));
        assert_eq!(ConfRequest::from_bytes(&[9]), Err(DecodeError::UnknownCommand(9)));
        assert!(matches!(
            ConfRequest::from_bytes(&[OP_SET, 0, 10]),
            Err(DecodeError::Truncated { expected: 12, actual: 3 })
        ));
        let mut empty_path = [0u8; 51];
        empty_path[0] = OP_SAVE;
        assert_eq!(ConfRequest::from_bytes(&empty_path), Err(DecodeError::InvalidPath));
    }

    #[test]
    fn test_get_returns_network_record() {
        let config = ConfigStore::new();
        config.set(custom());
        let reply = apply(&config, &RamFs::new(), &StoragePaths::default(), &ConfRequest::Get);
        assert_eq!(reply.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 1]);
    }

    #[test]
    fn test_set_then_save_and_load() {
        let fs = RamFs::new();
        let config = ConfigStore::new();
        let paths = StoragePaths::default();
        let path = Path::try_from("alt.cnf").unwrap();

        let ok = ConfReply::Status(Status::Ok);
        assert_eq!(apply(&config, &fs, &paths, &ConfRequest::Set(custom())), ok);
        assert_eq!(config.get(), custom());
        assert_eq!(apply(&config, &fs, &paths, &ConfRequest::Save(path.clone())), ok);

        config.set(ConfigRecord::DEFAULT);
        assert_eq!(apply(&config, &fs, &paths, &ConfRequest::Load(path)), ok);
        assert_eq!(config.get(), custom());
    }

    #[test]
    fn test_restore_persists_defaults() {
        let fs = RamFs::new();
        let config = ConfigStore::new();
        let paths = StoragePaths::default();
        config.set(custom());
        let reply = apply(&config, &fs, &paths, &ConfRequest::Restore);
        assert_eq!(reply, ConfReply::Status(Status::Ok));
        assert_eq!(config.get(), ConfigRecord::DEFAULT);

        let mut expected = [0u8; ConfigRecord::SIZE];
        ConfigRecord::DEFAULT.encode_into(&mut expected, ByteOrder::Native);
        assert_eq!(fs.contents(CONFIG_PATH).unwrap(), expected);
    }

    #[test]
    fn test_failure_statuses() {
        let fs = RamFs::new();
        let config = ConfigStore::new();
        let paths = StoragePaths::default();
        let missing = ConfRequest::Load(Path::try_from("missing.cnf").unwrap());
        assert_eq!(apply(&config, &fs, &paths, &missing), ConfReply::Status(Status::NotFound));

        fs.fail_writes(true);
        let save = ConfRequest::Save(Path::try_from("x.cnf").unwrap());
        assert_eq!(apply(&config, &fs, &paths, &save), ConfReply::Status(Status::Failed));
    }

    #[test]
    fn test_load_and_save_refuse_ring_file() {
        let fs = RamFs::new();
        let config = ConfigStore::new();
        let paths = StoragePaths::default();
        write_blob(&fs, paths.ring, &[0xAB; 64]).unwrap();
        config.set(custom());

        let ring = Path::try_from(paths.ring).unwrap();
        let failed = ConfReply::Status(Status::Failed);
        assert_eq!(apply(&config, &fs, &paths, &ConfRequest::Save(ring.clone())), failed);
        assert_eq!(apply(&config, &fs, &paths, &ConfRequest::Load(ring)), failed);

        assert_eq!(fs.contents(paths.ring).unwrap(), vec![0xAB; 64]);
        assert_eq!(config.get(), custom());

        // Saving the boot configuration itself stays allowed
        let boot = Path::try_from(CONFIG_PATH).unwrap();
        let ok = ConfReply::Status(Status::Ok);
        assert_eq!(apply(&config, &fs, &paths, &ConfRequest::Save(boot)), ok);
    }
}
