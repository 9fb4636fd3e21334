//! Simulated spacecraft: remote subsystems, board sensors and clock.

use std::time::{Duration as StdDuration, Instant, SystemTime, UNIX_EPOCH};

use cdh_core::beacon::{AdcsExt, AdcsHk, CameraHk, ComHk, EpsHk, HubHk};
use cdh_core::collector::RemoteSection;
use cdh_core::csp::{NodeMap, Subsystem, Transport, TransportError};
use cdh_core::sensors::{BoardReadings, BoardSensors, Clock, SensorError};
use cdh_core::wire::ByteOrder;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

// ---------------------------------------------------------------------------
// Remote subsystems
// ---------------------------------------------------------------------------

/// In-process stand-in for the CSP bus and the boards behind it.
///
/// Telemetry varies slowly with time so stored beacons are distinguishable.
/// Subsystems listed as offline never answer and cost the full timeout.
pub struct SimulatedBus {
    nodes: NodeMap,
    offline: Vec<Subsystem>,
    started: Instant,
    requests: u32,
}

fn answers<R: RemoteSection>(subsystem: Subsystem, port: u8, request: &[u8]) -> bool {
    subsystem == R::SUBSYSTEM && port == R::PORT && request == R::REQUEST
}

fn encode<R: RemoteSection>(section: R, reply: &mut [u8]) -> Result<usize, TransportError> {
    if reply.len() < R::SIZE {
        return Err(TransportError::Link);
    }
    section.encode_into(reply, ByteOrder::Network);
    Ok(R::SIZE)
}

impl SimulatedBus {
    pub fn new(nodes: NodeMap, offline: Vec<Subsystem>) -> Self {
        Self {
            nodes,
            offline,
            started: Instant::now(),
            requests: 0,
        }
    }

    fn subsystem(&self, node: u8) -> Option<Subsystem> {
        [
            Subsystem::Eps,
            Subsystem::Com,
            Subsystem::Camera,
            Subsystem::Hub,
            Subsystem::Adcs,
        ]
        .into_iter()
        .find(|&s| self.nodes.node(s) == node)
    }

    fn eps(&self, t: f64) -> EpsHk {
        // Orbit-period sunlight: positive half of a 90 minute sine
        let sun = (t / 5400.0 * std::f64::consts::TAU).sin().max(0.0);
        EpsHk {
            vbatt: (7800.0 + 400.0 * sun) as u16,
            cursun: (900.0 * sun) as u16,
            cursys: (280.0 + 20.0 * (t / 37.0).cos()) as u16,
            curout: [40, 0, 120, 15, 0, 60],
            temp: [
                (200.0 + 60.0 * sun) as i16,
                (190.0 + 50.0 * sun) as i16,
                (150.0 + 80.0 * sun) as i16,
                (140.0 + 80.0 * sun) as i16,
            ],
            batt_mode: if sun > 0.0 { 4 } else { 3 },
        }
    }

    fn com(&self) -> ComHk {
        ComHk {
            rx_count: self.requests / 7,
            tx_count: self.requests / 11,
            last_rssi: -104,
            bgnd_rssi: -121,
            temp_board: 245,
            temp_pa: 290,
        }
    }

    fn camera(&self, t: f64) -> CameraHk {
        CameraHk {
            images: (t / 600.0) as u16,
            detections: (t / 1800.0) as u16,
            last_detection: 0,
            temp: (180.0 + 20.0 * (t / 300.0).sin()) as i16,
        }
    }

    fn hub(&self) -> HubHk {
        HubHk {
            deploy_status: 0b0000_0011,
            switch_status: 0b0000_0101,
            burn_tries: [1, 1, 0, 0],
            temp: 210,
        }
    }

    fn adcs(&self, t: f64) -> AdcsHk {
        let w = |phase: f64| (50.0 * (t / 60.0 + phase).sin()) as i16;
        AdcsHk {
            mode: 2,
            fault_flags: 0,
            rate: [w(0.0), w(2.1), w(4.2)],
            mag: [
                (2200.0 * (t / 2700.0).cos()) as i16,
                (2200.0 * (t / 2700.0).sin()) as i16,
                -3100,
            ],
        }
    }

    fn adcs_ext(&self, t: f64) -> AdcsExt {
        let half = (t / 600.0) as f32 * 0.5;
        AdcsExt {
            mode: 3,
            filter_status: 1,
            q_est: [0.0, 0.0, half.sin(), half.cos()],
            rate_est: [0.001, -0.002, 0.0005],
            mag_field: [22.0e-6, 1.5e-6, -31.0e-6],
            sun_vec: [half.cos(), half.sin(), 0.0],
            torque: [0.0, 1.0e-5, 0.0],
            residual: 0.02,
        }
    }
}

impl Transport for SimulatedBus {
    async fn transact(
        &mut self,
        node: u8,
        port: u8,
        request: &[u8],
        reply: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.requests = self.requests.wrapping_add(1);
        let t = self.started.elapsed().as_secs_f64();

        let Some(subsystem) = self.subsystem(node) else {
            return Err(TransportError::Link);
        };
        if self.offline.contains(&subsystem) {
            std::thread::sleep(StdDuration::from_millis(timeout.as_millis()));
            return Err(TransportError::Timeout);
        }

        if answers::<EpsHk>(subsystem, port, request) {
            encode(self.eps(t), reply)
        } else if answers::<ComHk>(subsystem, port, request) {
            encode(self.com(), reply)
        } else if answers::<CameraHk>(subsystem, port, request) {
            encode(self.camera(t), reply)
        } else if answers::<HubHk>(subsystem, port, request) {
            encode(self.hub(), reply)
        } else if answers::<AdcsHk>(subsystem, port, request) {
            encode(self.adcs(t), reply)
        } else if answers::<AdcsExt>(subsystem, port, request) {
            encode(self.adcs_ext(t), reply)
        } else {
            Err(TransportError::Timeout)
        }
    }
}

// ---------------------------------------------------------------------------
// Local board
// ---------------------------------------------------------------------------

pub struct MockBoard {
    started: Instant,
    boot_count: u16,
}

impl MockBoard {
    pub fn new(boot_count: u16) -> Self {
        Self {
            started: Instant::now(),
            boot_count,
        }
    }
}

impl BoardSensors for MockBoard {
    async fn read(&mut self) -> Result<BoardReadings, SensorError> {
        let t = self.started.elapsed().as_secs_f64();
        Ok(BoardReadings {
            temp_a: (230.0 + 30.0 * (t / 120.0).sin()) as i16,
            temp_b: (225.0 + 25.0 * (t / 140.0).cos()) as i16,
            boot_count: self.boot_count,
            boot_cause: 1,
            uptime: t as u32,
        })
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32
    }
}

/// Blocking delay; each simulator task runs on its own thread
pub struct StdDelay;

impl DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(StdDuration::from_nanos(ns as u64));
    }

    async fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(StdDuration::from_millis(ms as u64));
    }
}
