//! Hardware-independent core of the NanoMind CDH housekeeping beacon subsystem
//!
//! This crate contains the platform-agnostic logic of the beacon subsystem:
//! the fixed-layout wire codec, the persistent ring store, the configuration
//! store, the periodic sample collector, the beacon query service and the
//! network dispatcher that routes CSP ports to them.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on the flight
//! computer as well as on desktop hosts (for the simulator and tests). All
//! hardware and network access goes through the collaborator traits in
//! [`csp`], [`storage`] and [`sensors`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app_state;
pub mod beacon;
pub mod collector;
pub mod config;
pub mod csp;
pub mod query;
pub mod sensors;
pub mod server;
pub mod storage;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;
