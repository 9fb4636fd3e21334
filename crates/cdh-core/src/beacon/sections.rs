//! Telemetry sections carried in a beacon payload.
//!
//! Each section is the housekeeping snapshot of one subsystem, in engineering
//! units already scaled to integers where the source board reports them that
//! way (milli-volts, milli-amps, tenths of a degree C).

use crate::wire::{Field, Kind, Packer, Schema, Section, Unpacker};

/// On-board computer housekeeping, read from local sensors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObcHk {
    /// Board temperature sensor A, tenths of a degree C
    pub temp_a: i16,
    /// Board temperature sensor B, tenths of a degree C
    pub temp_b: i16,
    pub boot_count: u16,
    pub boot_cause: u8,
    /// Seconds since last boot
    pub uptime: u32,
}

impl Section for ObcHk {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("temp_a", Kind::I16),
        Field::new("temp_b", Kind::I16),
        Field::new("boot_count", Kind::U16),
        Field::new("boot_cause", Kind::U8),
        Field::new("uptime", Kind::U32),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.i16(self.temp_a);
        p.i16(self.temp_b);
        p.u16(self.boot_count);
        p.u8(self.boot_cause);
        p.u32(self.uptime);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        Self {
            temp_a: u.i16(),
            temp_b: u.i16(),
            boot_count: u.u16(),
            boot_cause: u.u8(),
            uptime: u.u32(),
        }
    }
}

/// Radio (COM) counters and signal levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComHk {
    pub rx_count: u32,
    pub tx_count: u32,
    /// dBm
    pub last_rssi: i16,
    /// dBm
    pub bgnd_rssi: i16,
    pub temp_board: i16,
    pub temp_pa: i16,
}

impl Section for ComHk {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("rx_count", Kind::U32),
        Field::new("tx_count", Kind::U32),
        Field::new("last_rssi", Kind::I16),
        Field::new("bgnd_rssi", Kind::I16),
        Field::new("temp_board", Kind::I16),
        Field::new("temp_pa", Kind::I16),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u32(self.rx_count);
        p.u32(self.tx_count);
        p.i16(self.last_rssi);
        p.i16(self.bgnd_rssi);
        p.i16(self.temp_board);
        p.i16(self.temp_pa);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        Self {
            rx_count: u.u32(),
            tx_count: u.u32(),
            last_rssi: u.i16(),
            bgnd_rssi: u.i16(),
            temp_board: u.i16(),
            temp_pa: u.i16(),
        }
    }
}

/// Number of switchable EPS output rails
pub const EPS_OUTPUTS: usize = 6;
/// Number of EPS temperature sensors
pub const EPS_TEMPS: usize = 4;

/// Power subsystem rails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpsHk {
    /// Battery voltage, mV
    pub vbatt: u16,
    /// Solar input current, mA
    pub cursun: u16,
    /// System draw, mA
    pub cursys: u16,
    /// Per-rail output current, mA
    pub curout: [u16; EPS_OUTPUTS],
    pub temp: [i16; EPS_TEMPS],
    pub batt_mode: u8,
}

impl Section for EpsHk {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("vbatt", Kind::U16),
        Field::new("cursun", Kind::U16),
        Field::new("cursys", Kind::U16),
        Field::array("curout", Kind::U16, EPS_OUTPUTS),
        Field::array("temp", Kind::I16, EPS_TEMPS),
        Field::new("batt_mode", Kind::U8),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u16(self.vbatt);
        p.u16(self.cursun);
        p.u16(self.cursys);
        for v in self.curout {
            p.u16(v);
        }
        for v in self.temp {
            p.i16(v);
        }
        p.u8(self.batt_mode);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        let vbatt = u.u16();
        let cursun = u.u16();
        let cursys = u.u16();
        let curout = core::array::from_fn(|_| u.u16());
        let temp = core::array::from_fn(|_| u.i16());
        Self {
            vbatt,
            cursun,
            cursys,
            curout,
            temp,
            batt_mode: u.u8(),
        }
    }
}

/// Camera payload and on-board detection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraHk {
    pub images: u16,
    pub detections: u16,
    /// UNIX time of the most recent detection
    pub last_detection: u32,
    pub temp: i16,
}

impl Section for CameraHk {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("images", Kind::U16),
        Field::new("detections", Kind::U16),
        Field::new("last_detection", Kind::U32),
        Field::new("temp", Kind::I16),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u16(self.images);
        p.u16(self.detections);
        p.u32(self.last_detection);
        p.i16(self.temp);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        Self {
            images: u.u16(),
            detections: u.u16(),
            last_detection: u.u32(),
            temp: u.i16(),
        }
    }
}

/// Number of burn channels on the deployment hub
pub const HUB_CHANNELS: usize = 4;

/// Antenna/panel deployment hub state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubHk {
    /// One bit per deployed element
    pub deploy_status: u8,
    /// Raw sense-switch bits
    pub switch_status: u8,
    pub burn_tries: [u8; HUB_CHANNELS],
    pub temp: i16,
}

impl Section for HubHk {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("deploy_status", Kind::U8),
        Field::new("switch_status", Kind::U8),
        Field::array("burn_tries", Kind::U8, HUB_CHANNELS),
        Field::new("temp", Kind::I16),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u8(self.deploy_status);
        p.u8(self.switch_status);
        p.bytes(&self.burn_tries);
        p.i16(self.temp);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        Self {
            deploy_status: u.u8(),
            switch_status: u.u8(),
            burn_tries: u.bytes(),
            temp: u.i16(),
        }
    }
}

/// Short attitude state carried in every housekeeping beacon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdcsHk {
    pub mode: u8,
    pub fault_flags: u8,
    /// Body rates, milli-degrees per second
    pub rate: [i16; 3],
    /// Magnetometer, tens of nT
    pub mag: [i16; 3],
}

impl Section for AdcsHk {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("mode", Kind::U8),
        Field::new("fault_flags", Kind::U8),
        Field::array("rate", Kind::I16, 3),
        Field::array("mag", Kind::I16, 3),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u8(self.mode);
        p.u8(self.fault_flags);
        for v in self.rate.iter().chain(self.mag.iter()) {
            p.i16(*v);
        }
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        let mode = u.u8();
        let fault_flags = u.u8();
        let rate = core::array::from_fn(|_| u.i16());
        let mag = core::array::from_fn(|_| u.i16());
        Self {
            mode,
            fault_flags,
            rate,
            mag,
        }
    }
}

/// Extended attitude determination and control state (beacon type B)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdcsExt {
    pub mode: u8,
    pub filter_status: u8,
    /// Estimated attitude quaternion, scalar last
    pub q_est: [f32; 4],
    /// Estimated body rate, rad/s
    pub rate_est: [f32; 3],
    /// Measured magnetic field, body frame, T
    pub mag_field: [f32; 3],
    /// Sun vector, body frame, unit
    pub sun_vec: [f32; 3],
    /// Commanded torque, N·m
    pub torque: [f32; 3],
    /// Filter innovation residual
    pub residual: f32,
}

impl Section for AdcsExt {
    const SCHEMA: Schema = Schema::new(&[
        Field::new("mode", Kind::U8),
        Field::new("filter_status", Kind::U8),
        Field::array("q_est", Kind::F32, 4),
        Field::array("rate_est", Kind::F32, 3),
        Field::array("mag_field", Kind::F32, 3),
        Field::array("sun_vec", Kind::F32, 3),
        Field::array("torque", Kind::F32, 3),
        Field::new("residual", Kind::F32),
    ]);

    fn pack(&self, p: &mut Packer<'_>) {
        p.u8(self.mode);
        p.u8(self.filter_status);
        let vectors = self
            .q_est
            .iter()
            .chain(&self.rate_est)
            .chain(&self.mag_field)
            .chain(&self.sun_vec)
            .chain(&self.torque);
        for v in vectors {
            p.f32(*v);
        }
        p.f32(self.residual);
    }

    fn unpack(u: &mut Unpacker<'_>) -> Self {
        let mode = u.u8();
        let filter_status = u.u8();
        let q_est = core::array::from_fn(|_| u.f32());
        let rate_est = core::array::from_fn(|_| u.f32());
        let mag_field = core::array::from_fn(|_| u.f32());
        let sun_vec = core::array::from_fn(|_| u.f32());
        let torque = core::array::from_fn(|_| u.f32());
        Self {
            mode,
            filter_status,
            q_est,
            rate_est,
            mag_field,
            sun_vec,
            torque,
            residual: u.f32(),
        }
    }
}

/// Housekeeping beacon payload (type A)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingA {
    pub obc: ObcHk,
    pub com: ComHk,
    pub eps: EpsHk,
    pub camera: CameraHk,
    pub hub: HubHk,
    pub adcs: AdcsHk,
}

impl HousekeepingA {
    pub const SIZE: usize =
        ObcHk::SIZE + ComHk::SIZE + EpsHk::SIZE + CameraHk::SIZE + HubHk::SIZE + AdcsHk::SIZE;
}

/// Extended attitude beacon payload (type B)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttitudeB {
    pub adcs: AdcsExt,
}

impl AttitudeB {
    pub const SIZE: usize = AdcsExt::SIZE;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_sizes() {
        assert_eq!(ObcHk::SIZE, 11);
        assert_eq!(ComHk::SIZE, 16);
        assert_eq!(EpsHk::SIZE, 27);
        assert_eq!(CameraHk::SIZE, 10);
        assert_eq!(HubHk::SIZE, 8);
        assert_eq!(AdcsHk::SIZE, 14);
        assert_eq!(HousekeepingA::SIZE, 86);
        assert_eq!(AttitudeB::SIZE, 70);
    }
}
