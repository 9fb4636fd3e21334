//! Test doubles for the collaborator traits

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use embassy_time::Duration;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

use crate::collector::RemoteSection;
use crate::csp::{Connection, Listener, NodeMap, Transport, TransportError};
use crate::sensors::{BoardReadings, BoardSensors, Clock, SensorError};
use crate::wire::ByteOrder;

#[derive(Debug, Clone)]
pub enum Response {
    Reply(Vec<u8>),
    Timeout,
}

struct Route {
    node: u8,
    port: u8,
    request: Option<Vec<u8>>,
    response: Response,
}

/// Scripted bus; unrouted destinations time out
#[derive(Default)]
pub struct MockTransport {
    routes: Vec<Route>,
    pub requests: Vec<(u8, u8, Vec<u8>)>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the section's request on its node with its network encoding
    pub fn serve<R: RemoteSection>(&mut self, nodes: &NodeMap, section: R) {
        let mut reply = vec![0u8; R::SIZE];
        section.encode_into(&mut reply, ByteOrder::Network);
        self.routes.push(Route {
            node: nodes.node(R::SUBSYSTEM),
            port: R::PORT,
            request: Some(R::REQUEST.to_vec()),
            response: Response::Reply(reply),
        });
    }

    /// Answer any request to `node:port`; overrides earlier routes
    pub fn respond(&mut self, node: u8, port: u8, response: Response) {
        self.routes.push(Route {
            node,
            port,
            request: None,
            response,
        });
    }
}

impl Transport for MockTransport {
    async fn transact(
        &mut self,
        node: u8,
        port: u8,
        request: &[u8],
        reply: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.requests.push((node, port, request.to_vec()));
        let route = self.routes.iter().rev().find(|r| {
            r.node == node
                && r.port == port
                && r.request.as_deref().is_none_or(|req| req == request)
        });
        match route.map(|r| &r.response) {
            Some(Response::Reply(data)) => {
                let n = data.len().min(reply.len());
                reply[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Response::Timeout) | None => Err(TransportError::Timeout),
        }
    }
}

pub struct MockSensors {
    fail: bool,
}

impl MockSensors {
    pub const READINGS: BoardReadings = BoardReadings {
        temp_a: 231,
        temp_b: 228,
        boot_count: 14,
        boot_cause: 2,
        uptime: 86_400,
    };

    pub fn ok() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl BoardSensors for MockSensors {
    async fn read(&mut self) -> Result<BoardReadings, SensorError> {
        if self.fail {
            Err(SensorError::ReadFailed { sensor: "LM71" })
        } else {
            Ok(Self::READINGS)
        }
    }
}

pub struct FixedClock(Cell<u32>);

impl FixedClock {
    pub fn new(now: u32) -> Self {
        Self(Cell::new(now))
    }

    pub fn set(&self, now: u32) {
        self.0.set(now);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u32 {
        self.0.get()
    }
}

/// Inbound connection with a fixed request and a captured reply
pub struct MockConnection {
    port: u8,
    input: Vec<u8>,
    pos: usize,
    output: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
    write_budget: Option<usize>,
}

/// Handle to inspect a [`MockConnection`] after it was consumed
#[derive(Clone)]
pub struct Peer {
    output: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
}

impl Peer {
    pub fn received(&self) -> Vec<u8> {
        self.output.borrow().clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.get()
    }
}

impl MockConnection {
    pub fn new(port: u8, request: &[u8]) -> (Self, Peer) {
        let output = Rc::new(RefCell::new(Vec::new()));
        let closed = Rc::new(Cell::new(false));
        let conn = Self {
            port,
            input: request.to_vec(),
            pos: 0,
            output: output.clone(),
            closed: closed.clone(),
            write_budget: None,
        };
        (conn, Peer { output, closed })
    }

    /// Fail writes once `bytes` have been accepted
    pub fn break_after(mut self, bytes: usize) -> Self {
        self.write_budget = Some(bytes);
        self
    }
}

impl ErrorType for MockConnection {
    type Error = ErrorKind;
}

impl Read for MockConnection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.input.len() - self.pos);
        buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MockConnection {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let n = match self.write_budget {
            Some(0) => return Err(ErrorKind::BrokenPipe),
            Some(budget) => {
                let n = buf.len().min(budget);
                self.write_budget = Some(budget - n);
                n
            }
            None => buf.len(),
        };
        self.output.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for MockConnection {
    fn port(&self) -> u8 {
        self.port
    }

    fn peer(&self) -> u8 {
        1
    }

    fn close(self) {
        self.closed.set(true);
    }
}

#[derive(Default)]
pub struct MockListener {
    pending: VecDeque<MockConnection>,
}

impl MockListener {
    pub fn push(&mut self, conn: MockConnection) {
        self.pending.push_back(conn);
    }
}

impl Listener for MockListener {
    type Connection = MockConnection;
    type Error = ();

    async fn accept(&mut self) -> Result<MockConnection, ()> {
        self.pending.pop_front().ok_or(())
    }
}
