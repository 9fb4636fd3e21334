//! Desktop simulator and ground client for the CDH beacon subsystem.
//!
//! `cdh-sim run` stands in for the flight computer: it boots the beacon
//! subsystem against files in a data directory, runs the sample collector
//! against a simulated subsystem bus and serves CSP requests over TCP.
//!
//! The remaining subcommands are the ground side:
//!
//! | Command                                                    | Port         |
//! |------------------------------------------------------------|--------------|
//! | `beacon <from> <to> <min_interval> <max_count> <mask> <timeout_ms>` | BEACON_LOG   |
//! | `store <from> <to> <interval> <path>`                      | BEACON_STORE |
//! | `conf get\|set\|load\|save\|restore`                       | CONF         |

mod bus;
mod fs;
mod net;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use embassy_futures::block_on;
use log::{info, warn};

use cdh_core::app_state::{BootState, CdhState, RING_CAPACITY, StoragePaths};
use cdh_core::beacon::{BEACON_SIZE, BeaconRecord};
use cdh_core::collector::{CollectorSettings, SampleCollector};
use cdh_core::config::{BeaconIntervals, ConfigRecord};
use cdh_core::csp::{NodeMap, PORT_BEACON_LOG, PORT_BEACON_STORE, PORT_CONF, Subsystem};
use cdh_core::query::{BeaconRequest, StoreRequest};
use cdh_core::server::{CdhServer, ConfRequest, Status};
use cdh_core::storage::Path;
use cdh_core::wire::{ByteOrder, Section};

use crate::bus::{MockBoard, SimulatedBus, StdDelay, SystemClock};
use crate::fs::StdFs;
use crate::net::TcpCspListener;

const DEFAULT_ADDR: &str = "127.0.0.1:7100";

#[derive(Parser, Debug)]
#[command(name = "cdh-sim", about = "NanoMind CDH beacon subsystem simulator")]
struct Args {
    /// Address of the simulated node (client commands)
    #[arg(long, global = true, default_value = DEFAULT_ADDR)]
    connect: String,

    /// Reply timeout in milliseconds for `store` and `conf`
    #[arg(long, global = true, default_value_t = 2000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the simulated flight computer
    Run {
        /// Directory holding the ring store, configuration and exports
        #[arg(long, default_value = "sim-data")]
        data_dir: PathBuf,

        #[arg(long, default_value = DEFAULT_ADDR)]
        listen: String,

        /// Subsystems that never answer, e.g. `--offline com,cam`
        #[arg(long, value_delimiter = ',')]
        offline: Vec<String>,

        /// Ring store capacity used when formatting a new store
        #[arg(long, default_value_t = RING_CAPACITY)]
        capacity: u32,
    },
    /// Query stored beacons
    Beacon {
        from: u32,
        to: u32,
        min_interval: u16,
        max_count: u16,
        /// Type mask: 1 = A, 2 = B, 3 = both
        mask: u8,
        /// Milliseconds to wait for the reply stream
        timeout: u64,
    },
    /// Export a beacon selection to a file on the node
    Store {
        from: u32,
        to: u32,
        interval: u16,
        path: String,
    },
    /// Read or change the beacon configuration
    Conf {
        #[command(subcommand)]
        op: ConfOp,
    },
}

#[derive(Subcommand, Debug)]
enum ConfOp {
    Get,
    Set {
        collect_interval: u16,
        a_store: u16,
        a_transmit: u16,
        b_store: u16,
        b_transmit: u16,
        /// Capture beacon B instead of A (0 or 1)
        force_beacon_b: u8,
    },
    Load {
        path: String,
    },
    Save {
        path: String,
    },
    Restore,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout_ms);

    match args.command {
        Command::Run {
            data_dir,
            listen,
            offline,
            capacity,
        } => run(data_dir, &listen, &offline, capacity),
        Command::Beacon {
            from,
            to,
            min_interval,
            max_count,
            mask,
            timeout,
        } => beacon(
            &args.connect,
            &BeaconRequest {
                from,
                to,
                min_interval,
                max_count,
                mask,
            },
            Duration::from_millis(timeout),
        ),
        Command::Store {
            from,
            to,
            interval,
            path,
        } => {
            let request = StoreRequest {
                from,
                to,
                interval,
                path: device_path(&path)?,
            };
            let reply =
                net::request(&args.connect, PORT_BEACON_STORE, &request.to_bytes(), timeout)?;
            report_status(&reply)
        }
        Command::Conf { op } => conf(&args.connect, op, timeout),
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

fn parse_subsystem(name: &str) -> Result<Subsystem> {
    match name.trim().to_ascii_lowercase().as_str() {
        "eps" => Ok(Subsystem::Eps),
        "com" => Ok(Subsystem::Com),
        "cam" | "camera" => Ok(Subsystem::Camera),
        "hub" => Ok(Subsystem::Hub),
        "adcs" => Ok(Subsystem::Adcs),
        other => bail!("unknown subsystem {other:?}"),
    }
}

fn run(data_dir: PathBuf, listen: &str, offline: &[String], capacity: u32) -> Result<()> {
    let offline = offline
        .iter()
        .map(|s| parse_subsystem(s))
        .collect::<Result<Vec<_>>>()?;

    info!("Starting CDH simulator, data in {}", data_dir.display());
    let fs = StdFs::new(&data_dir)
        .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;
    let paths = StoragePaths {
        ring_capacity: capacity,
        ..StoragePaths::default()
    };
    let state = CdhState::new(fs, paths);

    if block_on(state.boot()) == BootState::StorageDegraded {
        warn!("Continuing without beacon storage");
    }

    let mut listener =
        TcpCspListener::bind(listen).with_context(|| format!("cannot listen on {listen}"))?;
    info!("Listening on {}", listener.local_addr()?);
    if !offline.is_empty() {
        info!("Offline subsystems: {:?}", offline);
    }

    thread::scope(|s| {
        s.spawn(|| collect_forever(&state, offline));
        serve_forever(&state, &mut listener);
    });
    Ok(())
}

fn collect_forever(state: &CdhState<StdFs>, offline: Vec<Subsystem>) {
    let mut collector = SampleCollector::new(
        state,
        SimulatedBus::new(NodeMap::DEFAULT, offline),
        MockBoard::new(1),
        SystemClock,
        CollectorSettings::default(),
    );
    block_on(collector.run(&mut StdDelay))
}

fn serve_forever(state: &CdhState<StdFs>, listener: &mut TcpCspListener) {
    block_on(CdhServer::new(state).serve(listener))
}

// ---------------------------------------------------------------------------
// Ground client
// ---------------------------------------------------------------------------

fn device_path(path: &str) -> Result<Path> {
    Path::try_from(path).map_err(|_| anyhow!("path longer than 50 bytes: {path}"))
}

fn beacon(addr: &str, request: &BeaconRequest, timeout: Duration) -> Result<()> {
    let reply = net::request(addr, PORT_BEACON_LOG, &request.to_bytes(), timeout)?;

    let frames = reply.chunks_exact(BEACON_SIZE);
    if !frames.remainder().is_empty() {
        warn!("Discarding {} trailing bytes", frames.remainder().len());
    }
    let mut count = 0;
    for frame in frames {
        let record = BeaconRecord::decode(frame, ByteOrder::Network)
            .map_err(|e| anyhow!("bad beacon frame: {e}"))?;
        println!("{record}");
        count += 1;
    }
    println!("{count} beacon(s)");
    Ok(())
}

fn report_status(reply: &[u8]) -> Result<()> {
    match reply.first().copied().and_then(Status::from_byte) {
        Some(Status::Ok) => {
            println!("ok");
            Ok(())
        }
        Some(status) => bail!("node replied {status:?}"),
        None => bail!("no status in reply ({} bytes)", reply.len()),
    }
}

fn conf(addr: &str, op: ConfOp, timeout: Duration) -> Result<()> {
    let request = match op {
        ConfOp::Get => ConfRequest::Get,
        ConfOp::Set {
            collect_interval,
            a_store,
            a_transmit,
            b_store,
            b_transmit,
            force_beacon_b,
        } => ConfRequest::Set(ConfigRecord {
            collect_interval,
            beacon_a: BeaconIntervals {
                store: a_store,
                transmit: a_transmit,
            },
            beacon_b: BeaconIntervals {
                store: b_store,
                transmit: b_transmit,
            },
            force_beacon_b: force_beacon_b != 0,
        }),
        ConfOp::Load { path } => ConfRequest::Load(device_path(&path)?),
        ConfOp::Save { path } => ConfRequest::Save(device_path(&path)?),
        ConfOp::Restore => ConfRequest::Restore,
    };

    let (raw, len) = request.to_bytes();
    let reply = net::request(addr, PORT_CONF, &raw[..len], timeout)?;

    if request != ConfRequest::Get {
        return report_status(&reply);
    }
    let record = ConfigRecord::decode_from(&reply, ByteOrder::Network)
        .map_err(|e| anyhow!("bad configuration reply: {e}"))?;
    println!("collect_interval  {} s", record.collect_interval);
    println!(
        "beacon A          store {} s, transmit {} s",
        record.beacon_a.store, record.beacon_a.transmit
    );
    println!(
        "beacon B          store {} s, transmit {} s",
        record.beacon_b.store, record.beacon_b.transmit
    );
    println!("force_beacon_b    {}", record.force_beacon_b);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subsystem_names() {
        assert_eq!(parse_subsystem("EPS").unwrap(), Subsystem::Eps);
        assert_eq!(parse_subsystem(" cam").unwrap(), Subsystem::Camera);
        assert!(parse_subsystem("obc").is_err());
    }

    #[test]
    fn test_cli_parses_beacon_query() {
        let args = Args::try_parse_from(["cdh-sim", "beacon", "0", "100", "15", "5", "3", "500"])
            .unwrap();
        assert!(matches!(
            args.command,
            Command::Beacon {
                min_interval: 15,
                max_count: 5,
                mask: 3,
                timeout: 500,
                ..
            }
        ));
        assert_eq!(args.connect, DEFAULT_ADDR);
    }

    #[test]
    fn test_device_path_length_limit() {
        assert!(device_path("export.bin").is_ok());
        assert!(device_path(&"x".repeat(51)).is_err());
    }
}
