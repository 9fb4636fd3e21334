//! Network dispatcher.
//!
//! Accepts one connection at a time, routes it by destination port to the
//! beacon query, beacon export or configuration handler and closes it when
//! the handler returns, whatever the outcome. Malformed requests are dropped
//! without a reply.

pub mod conf;

pub use conf::{ConfReply, ConfRequest};

use embedded_io_async::Write;
use log::{debug, error, info, warn};

use crate::app_state::CdhState;
use crate::csp::{Connection, Listener, PORT_BEACON_LOG, PORT_BEACON_STORE, PORT_CONF};
use crate::query::{self, BeaconRequest, QueryError};
#[cfg(feature = "beacon-store")]
use crate::query::StoreRequest;
use crate::storage::FileSystem;
#[cfg(feature = "beacon-store")]
use crate::storage::StorageError;
use crate::wire::Section;

/// Single-byte reply status for CONF and BEACON_STORE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Failed = 1,
    NotFound = 2,
    Disabled = 3,
}

impl Status {
    pub const fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Ok => &[0],
            Self::Failed => &[1],
            Self::NotFound => &[2],
            Self::Disabled => &[3],
        }
    }

    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Ok),
            1 => Some(Self::Failed),
            2 => Some(Self::NotFound),
            3 => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// How a connection was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Reply sent (possibly empty, e.g. a query with no matches)
    Served,
    /// Request could not be parsed; no reply
    Malformed,
    /// Handler failed mid-reply or the link broke
    Failed,
    /// No service on the destination port
    UnknownPort,
}

pub struct CdhServer<'a, FS: FileSystem> {
    state: &'a CdhState<FS>,
}

impl<'a, FS: FileSystem> CdhServer<'a, FS> {
    pub fn new(state: &'a CdhState<FS>) -> Self {
        Self { state }
    }

    /// Accept and handle connections forever
    pub async fn serve<L: Listener>(&self, listener: &mut L) -> ! {
        info!("CDH dispatcher listening");
        loop {
            if let Err(e) = self.serve_one(listener).await {
                warn!("Accept failed: {:?}", e);
            }
        }
    }

    /// Accept and handle a single connection
    pub async fn serve_one<L: Listener>(&self, listener: &mut L) -> Result<Dispatch, L::Error> {
        let conn = listener.accept().await?;
        Ok(self.handle(conn).await)
    }

    pub async fn handle<C: Connection>(&self, mut conn: C) -> Dispatch {
        let port = conn.port();
        debug!("Connection from node {} on port {}", conn.peer(), port);

        let outcome = match port {
            PORT_BEACON_LOG => self.beacon_log(&mut conn).await,
            PORT_BEACON_STORE => self.beacon_store(&mut conn).await,
            PORT_CONF => self.conf(&mut conn).await,
            other => {
                warn!("No service on port {}", other);
                Dispatch::UnknownPort
            }
        };

        conn.close();
        outcome
    }

    async fn beacon_log<C: Connection>(&self, conn: &mut C) -> Dispatch {
        let mut raw = [0u8; BeaconRequest::SIZE];
        if conn.read_exact(&mut raw).await.is_err() {
            warn!("Short BEACON_LOG request");
            return Dispatch::Malformed;
        }
        let request = match BeaconRequest::from_bytes(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("Malformed BEACON_LOG request: {}", e);
                return Dispatch::Malformed;
            }
        };

        match query::serve_beacons(&self.state.ring, conn, &request).await {
            Ok(_) => Dispatch::Served,
            Err(QueryError::Storage(e)) => {
                error!("Beacon query failed: {}", e);
                Dispatch::Failed
            }
            Err(QueryError::Link) => {
                warn!("Beacon query aborted, connection lost");
                Dispatch::Failed
            }
        }
    }

    #[cfg(feature = "beacon-store")]
    async fn beacon_store<C: Connection>(&self, conn: &mut C) -> Dispatch {
        let mut raw = [0u8; StoreRequest::SIZE];
        if conn.read_exact(&mut raw).await.is_err() {
            warn!("Short BEACON_STORE request");
            return Dispatch::Malformed;
        }
        let request = match StoreRequest::from_bytes(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!("Malformed BEACON_STORE request: {}", e);
                return Dispatch::Malformed;
            }
        };

        if self.state.paths.is_live(&request.path) {
            warn!("Refusing to export over {}", request.path);
            return reply(conn, Status::Failed.as_bytes()).await;
        }

        let status = match query::export(&self.state.ring, &self.state.fs, &request).await {
            Ok(n) => {
                info!("Exported {} beacons to {}", n, request.path);
                Status::Ok
            }
            Err(StorageError::NotFound) => Status::NotFound,
            Err(e) => {
                error!("Beacon export to {} failed: {}", request.path, e);
                Status::Failed
            }
        };
        reply(conn, status.as_bytes()).await
    }

    #[cfg(not(feature = "beacon-store"))]
    async fn beacon_store<C: Connection>(&self, conn: &mut C) -> Dispatch {
        reply(conn, Status::Disabled.as_bytes()).await
    }

    async fn conf<C: Connection>(&self, conn: &mut C) -> Dispatch {
        let mut raw = [0u8; conf::MAX_REQUEST_SIZE];
        if conn.read_exact(&mut raw[..1]).await.is_err() {
            warn!("Empty CONF request");
            return Dispatch::Malformed;
        }
        let Some(len) = ConfRequest::payload_len(raw[0]) else {
            warn!("Unknown CONF command {}", raw[0]);
            return Dispatch::Malformed;
        };
        if conn.read_exact(&mut raw[1..1 + len]).await.is_err() {
            warn!("Short CONF request");
            return Dispatch::Malformed;
        }
        let request = match ConfRequest::from_bytes(&raw[..1 + len]) {
            Ok(r) => r,
            Err(e) => {
                warn!("Malformed CONF request: {}", e);
                return Dispatch::Malformed;
            }
        };

        let state = self.state;
        let response = conf::apply(&state.config, &state.fs, &state.paths, &request);
        reply(conn, response.as_bytes()).await
    }
}

async fn reply<W: Write>(conn: &mut W, bytes: &[u8]) -> Dispatch {
    match conn.write_all(bytes).await {
        Ok(()) => match conn.flush().await {
            Ok(()) => Dispatch::Served,
            Err(_) => Dispatch::Failed,
        },
        Err(_) => {
            warn!("Failed to send reply");
            Dispatch::Failed
        }
    }
}
