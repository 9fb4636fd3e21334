//! Locally attached sensors and the real-time clock.
//!
//! These are read directly by the collector without a network hop.

use core::future::Future;

use thiserror_no_std::Error;

use crate::beacon::ObcHk;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: read failed")]
    ReadFailed { sensor: &'static str },
    #[error("{sensor}: not ready")]
    NotReady { sensor: &'static str },
}

/// Typed readings of the OBC board sensors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardReadings {
    /// Tenths of a degree C
    pub temp_a: i16,
    /// Tenths of a degree C
    pub temp_b: i16,
    pub boot_count: u16,
    pub boot_cause: u8,
    pub uptime: u32,
}

impl From<BoardReadings> for ObcHk {
    fn from(r: BoardReadings) -> Self {
        Self {
            temp_a: r.temp_a,
            temp_b: r.temp_b,
            boot_count: r.boot_count,
            boot_cause: r.boot_cause,
            uptime: r.uptime,
        }
    }
}

/// Sensors on the CDH board itself
pub trait BoardSensors {
    fn read(&mut self) -> impl Future<Output = Result<BoardReadings, SensorError>>;
}

/// Source of UNIX time
pub trait Clock {
    /// Seconds since epoch
    fn now(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> u32 {
        (**self).now()
    }
}
