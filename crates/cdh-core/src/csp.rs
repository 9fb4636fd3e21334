//! Network collaborator interfaces (CSP).
//!
//! The routing/transport layer itself is external. The beacon subsystem only
//! needs two things from it: a client-side "transact with timeout" to pull
//! telemetry from other nodes, and a server-side listener handing out one
//! connection per inbound request.

use core::future::Future;

use embassy_time::Duration;
use embedded_io_async::{Read, Write};
use thiserror_no_std::Error;

/// CONF port: configuration get/set/load/save/restore
pub const PORT_CONF: u8 = 10;
/// BEACON_LOG port: historical beacon query
pub const PORT_BEACON_LOG: u8 = 11;
/// BEACON_STORE port: export a beacon selection to a file
pub const PORT_BEACON_STORE: u8 = 12;

/// Default timeout for one telemetry transaction
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("no reply within timeout")]
    Timeout,
    #[error("short reply: expected {expected} bytes, got {actual}")]
    ShortReply { expected: usize, actual: usize },
    #[error("link error")]
    Link,
}

/// Remote subsystems polled for housekeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Eps,
    Com,
    Camera,
    Hub,
    Adcs,
}

impl Subsystem {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eps => "EPS",
            Self::Com => "COM",
            Self::Camera => "CAM",
            Self::Hub => "HUB",
            Self::Adcs => "ADCS",
        }
    }
}

/// CSP addresses of the peripheral boards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMap {
    pub eps: u8,
    pub adcs: u8,
    pub com: u8,
    pub camera: u8,
    pub hub: u8,
}

impl NodeMap {
    pub const DEFAULT: Self = Self {
        eps: 2,
        adcs: 4,
        com: 5,
        camera: 6,
        hub: 7,
    };

    pub const fn node(&self, subsystem: Subsystem) -> u8 {
        match subsystem {
            Subsystem::Eps => self.eps,
            Subsystem::Com => self.com,
            Subsystem::Camera => self.camera,
            Subsystem::Hub => self.hub,
            Subsystem::Adcs => self.adcs,
        }
    }
}

impl Default for NodeMap {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Client side of the bus: one request, one reply, bounded in time
pub trait Transport {
    /// Send `request` to `node:port` and wait up to `timeout` for a reply.
    ///
    /// Returns the number of reply bytes written into `reply`.
    fn transact(
        &mut self,
        node: u8,
        port: u8,
        request: &[u8],
        reply: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize, TransportError>>;
}

/// An accepted inbound connection
///
/// Dropping or closing the connection ends the exchange; there is no
/// end-of-stream marker in any of the reply formats.
pub trait Connection: Read + Write {
    /// Destination port the peer connected to
    fn port(&self) -> u8;

    /// Source node address of the peer
    fn peer(&self) -> u8;

    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Server side of the bus
pub trait Listener {
    type Connection: Connection;
    type Error: core::fmt::Debug;

    fn accept(&mut self) -> impl Future<Output = Result<Self::Connection, Self::Error>>;
}
