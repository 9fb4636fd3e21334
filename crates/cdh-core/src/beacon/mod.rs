//! Beacon records: one fixed-size telemetry sample per collection cycle.
//!
//! Binary format (91 bytes, no padding between fields):
//! - timestamp: 4 bytes (u32, UNIX seconds)
//! - type_flags: 1 byte (exactly one of [`BeaconType`])
//! - payload: 86 bytes, the selected variant followed by zero fill
//!
//! The same layout is used on the network (big-endian) and in the ring store
//! (host-native). Records are therefore constant-size regardless of variant.

mod sections;

pub use sections::*;

use core::fmt::Display;

use crate::storage::Record;
use crate::wire::{ByteOrder, DecodeError, Field, Kind, Packer, Schema, Section, Unpacker};

/// Beacon variant bit as carried in `type_flags`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BeaconType {
    /// Common housekeeping
    A = 0x01,
    /// Extended attitude determination telemetry
    B = 0x02,
}

impl BeaconType {
    pub const fn flag(self) -> u8 {
        self as u8
    }

    pub const fn from_flags(flags: u8) -> Option<Self> {
        match flags {
            0x01 => Some(Self::A),
            0x02 => Some(Self::B),
            _ => None,
        }
    }

    /// Index used for per-type bookkeeping (intervals, last-stored times)
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Mask selecting every beacon type
pub const MASK_ALL: u8 = BeaconType::A.flag() | BeaconType::B.flag();

/// Beacon payload, one variant per record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeaconPayload {
    HousekeepingA(HousekeepingA),
    AttitudeB(AttitudeB),
}

impl BeaconPayload {
    pub const fn beacon_type(&self) -> BeaconType {
        match self {
            Self::HousekeepingA(_) => BeaconType::A,
            Self::AttitudeB(_) => BeaconType::B,
        }
    }
}

const HEADER: Schema = Schema::new(&[
    Field::new("timestamp", Kind::U32),
    Field::new("type_flags", Kind::U8),
]);

const HEADER_SIZE: usize = HEADER.size();

/// Size of the payload region, the larger of the two variants
pub const PAYLOAD_SIZE: usize = if HousekeepingA::SIZE > AttitudeB::SIZE {
    HousekeepingA::SIZE
} else {
    AttitudeB::SIZE
};

/// Encoded size of every beacon record
pub const BEACON_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;

/// A single beacon sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeaconRecord {
    /// Capture time, seconds since epoch
    pub timestamp: u32,
    pub payload: BeaconPayload,
}

impl BeaconRecord {
    pub fn housekeeping(timestamp: u32, hk: HousekeepingA) -> Self {
        Self {
            timestamp,
            payload: BeaconPayload::HousekeepingA(hk),
        }
    }

    pub fn attitude(timestamp: u32, att: AttitudeB) -> Self {
        Self {
            timestamp,
            payload: BeaconPayload::AttitudeB(att),
        }
    }

    pub const fn beacon_type(&self) -> BeaconType {
        self.payload.beacon_type()
    }

    pub const fn type_flags(&self) -> u8 {
        self.beacon_type().flag()
    }

    /// Whether this record is selected by a type mask
    pub const fn matches_mask(&self, mask: u8) -> bool {
        self.type_flags() & mask != 0
    }

    /// Encode into a fixed buffer in the requested byte order.
    ///
    /// Unused payload bytes are zeroed.
    pub fn encode(&self, order: ByteOrder) -> [u8; BEACON_SIZE] {
        let mut out = [0u8; BEACON_SIZE];

        let (header, payload) = out.split_at_mut(HEADER_SIZE);
        let mut p = Packer::new(header);
        p.u32(self.timestamp);
        p.u8(self.type_flags());
        if order == ByteOrder::Network {
            HEADER.to_network(header);
        }

        match &self.payload {
            BeaconPayload::HousekeepingA(hk) => {
                let mut offset = 0;
                encode_section(&hk.obc, payload, &mut offset, order);
                encode_section(&hk.com, payload, &mut offset, order);
                encode_section(&hk.eps, payload, &mut offset, order);
                encode_section(&hk.camera, payload, &mut offset, order);
                encode_section(&hk.hub, payload, &mut offset, order);
                encode_section(&hk.adcs, payload, &mut offset, order);
            }
            BeaconPayload::AttitudeB(att) => {
                att.adcs.encode_into(payload, order);
            }
        }

        out
    }

    /// Decode a record; the input must hold at least [`BEACON_SIZE`] bytes
    pub fn decode(input: &[u8], order: ByteOrder) -> Result<Self, DecodeError> {
        if input.len() < BEACON_SIZE {
            return Err(DecodeError::Truncated {
                expected: BEACON_SIZE,
                actual: input.len(),
            });
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&input[..HEADER_SIZE]);
        if order == ByteOrder::Network {
            HEADER.to_host(&mut header);
        }
        let mut u = Unpacker::new(&header);
        let timestamp = u.u32();
        let flags = u.u8();

        let payload = &input[HEADER_SIZE..BEACON_SIZE];
        let payload = match BeaconType::from_flags(flags) {
            Some(BeaconType::A) => {
                let mut offset = 0;
                BeaconPayload::HousekeepingA(HousekeepingA {
                    obc: decode_section(payload, &mut offset, order)?,
                    com: decode_section(payload, &mut offset, order)?,
                    eps: decode_section(payload, &mut offset, order)?,
                    camera: decode_section(payload, &mut offset, order)?,
                    hub: decode_section(payload, &mut offset, order)?,
                    adcs: decode_section(payload, &mut offset, order)?,
                })
            }
            Some(BeaconType::B) => BeaconPayload::AttitudeB(AttitudeB {
                adcs: AdcsExt::decode_from(payload, order)?,
            }),
            None => return Err(DecodeError::UnknownType(flags)),
        };

        Ok(Self { timestamp, payload })
    }
}

fn encode_section<S: Section>(section: &S, out: &mut [u8], offset: &mut usize, order: ByteOrder) {
    section.encode_into(&mut out[*offset..], order);
    *offset += S::SIZE;
}

fn decode_section<S: Section>(
    input: &[u8],
    offset: &mut usize,
    order: ByteOrder,
) -> Result<S, DecodeError> {
    let section = S::decode_from(&input[*offset..], order)?;
    *offset += S::SIZE;
    Ok(section)
}

impl Record for BeaconRecord {
    const SIZE: usize = BEACON_SIZE;

    fn timestamp(&self) -> u32 {
        self.timestamp
    }

    fn write_native(&self, out: &mut [u8]) {
        out[..BEACON_SIZE].copy_from_slice(&self.encode(ByteOrder::Native));
    }

    fn read_native(input: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(input, ByteOrder::Native)
    }
}

impl Display for BeaconRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.payload {
            BeaconPayload::HousekeepingA(hk) => write!(
                f,
                "[Beacon A] timestamp: {}, obc: {:.1}°C, vbatt: {} mV, rx/tx: {}/{}",
                self.timestamp,
                hk.obc.temp_a as f32 / 10.0,
                hk.eps.vbatt,
                hk.com.rx_count,
                hk.com.tx_count
            ),
            BeaconPayload::AttitudeB(att) => write!(
                f,
                "[Beacon B] timestamp: {}, mode: {}, q: {:?}",
                self.timestamp, att.adcs.mode, att.adcs.q_est
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_housekeeping() -> HousekeepingA {
        HousekeepingA {
            obc: ObcHk {
                temp_a: i16::MAX,
                temp_b: i16::MIN,
                boot_count: u16::MAX,
                boot_cause: u8::MAX,
                uptime: u32::MAX,
            },
            com: ComHk {
                rx_count: u32::MAX,
                tx_count: u32::MAX,
                last_rssi: i16::MIN,
                bgnd_rssi: i16::MAX,
                temp_board: i16::MAX,
                temp_pa: i16::MIN,
            },
            eps: EpsHk {
                vbatt: u16::MAX,
                cursun: u16::MAX,
                cursys: u16::MAX,
                curout: [u16::MAX; EPS_OUTPUTS],
                temp: [i16::MIN; EPS_TEMPS],
                batt_mode: u8::MAX,
            },
            camera: CameraHk {
                images: u16::MAX,
                detections: u16::MAX,
                last_detection: u32::MAX,
                temp: i16::MAX,
            },
            hub: HubHk {
                deploy_status: u8::MAX,
                switch_status: u8::MAX,
                burn_tries: [u8::MAX; HUB_CHANNELS],
                temp: i16::MIN,
            },
            adcs: AdcsHk {
                mode: u8::MAX,
                fault_flags: u8::MAX,
                rate: [i16::MAX, i16::MIN, -1],
                mag: [i16::MIN, i16::MAX, 1],
            },
        }
    }

    fn max_attitude() -> AttitudeB {
        AttitudeB {
            adcs: AdcsExt {
                mode: u8::MAX,
                filter_status: u8::MAX,
                q_est: [f32::MAX, f32::MIN, -0.0, 1.0],
                rate_est: [f32::MAX; 3],
                mag_field: [f32::MIN_POSITIVE; 3],
                sun_vec: [f32::MIN; 3],
                torque: [-1.5e-7, 2.5e-7, f32::EPSILON],
                residual: f32::MAX,
            },
        }
    }

    #[test]
    fn test_beacon_size() {
        assert_eq!(BEACON_SIZE, 91);
        assert_eq!(PAYLOAD_SIZE, 86);
    }

    #[test]
    fn test_max_values_survive_network_round_trip() {
        let a = BeaconRecord::housekeeping(u32::MAX, max_housekeeping());
        let b = BeaconRecord::attitude(u32::MAX, max_attitude());

        for record in [a, b] {
            let bytes = record.encode(ByteOrder::Network);
            let decoded = BeaconRecord::decode(&bytes, ByteOrder::Network).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_network_header_is_big_endian() {
        let record = BeaconRecord::housekeeping(0x0102_0304, HousekeepingA::default());
        let bytes = record.encode(ByteOrder::Network);
        assert_eq!(&bytes[..5], &[1, 2, 3, 4, BeaconType::A.flag()]);
    }

    #[test]
    fn test_native_layout_is_host_order() {
        let record = BeaconRecord::housekeeping(0x0102_0304, HousekeepingA::default());
        let bytes = record.encode(ByteOrder::Native);
        assert_eq!(&bytes[..4], &0x0102_0304u32.to_ne_bytes());
    }

    #[test]
    fn test_type_b_is_zero_padded() {
        let record = BeaconRecord::attitude(10, max_attitude());
        let bytes = record.encode(ByteOrder::Network);
        assert!(bytes[5 + AttitudeB::SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_rejects_truncated_record() {
        let bytes =
            BeaconRecord::housekeeping(1, HousekeepingA::default()).encode(ByteOrder::Network);
        assert_eq!(
            BeaconRecord::decode(&bytes[..BEACON_SIZE - 1], ByteOrder::Network),
            Err(DecodeError::Truncated {
                expected: BEACON_SIZE,
                actual: BEACON_SIZE - 1
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let mut bytes =
            BeaconRecord::housekeeping(1, HousekeepingA::default()).encode(ByteOrder::Network);
        bytes[4] = 0x03;
        assert_eq!(
            BeaconRecord::decode(&bytes, ByteOrder::Network),
            Err(DecodeError::UnknownType(0x03))
        );
    }

    #[test]
    fn test_mask_matching() {
        let a = BeaconRecord::housekeeping(1, HousekeepingA::default());
        let b = BeaconRecord::attitude(1, AttitudeB::default());
        assert!(a.matches_mask(BeaconType::A.flag()));
        assert!(!a.matches_mask(BeaconType::B.flag()));
        assert!(b.matches_mask(MASK_ALL));
        assert!(!b.matches_mask(0));
    }
}
