//! CSP over TCP.
//!
//! Each TCP connection carries one CSP exchange. The client sends the
//! destination port as a single preamble byte, then the request; the server
//! replies and closes.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use cdh_core::csp::{Connection, Listener};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use log::debug;

/// Node address reported for TCP peers
pub const GROUND_NODE: u8 = 9;

/// How long the server waits for a request to arrive
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TcpCspListener {
    inner: TcpListener,
}

impl TcpCspListener {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self {
            inner: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Listener for TcpCspListener {
    type Connection = TcpConnection;
    type Error = io::Error;

    async fn accept(&mut self) -> io::Result<TcpConnection> {
        let (mut stream, addr) = self.inner.accept()?;
        stream.set_read_timeout(Some(REQUEST_TIMEOUT))?;
        let mut port = [0u8; 1];
        io::Read::read_exact(&mut stream, &mut port)?;
        debug!("Accepted {} for port {}", addr, port[0]);
        Ok(TcpConnection {
            stream,
            port: port[0],
        })
    }
}

pub struct TcpConnection {
    stream: TcpStream,
    port: u8,
}

fn kind(e: io::Error) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::TimedOut,
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
        io::ErrorKind::ConnectionAborted => ErrorKind::ConnectionAborted,
        _ => ErrorKind::Other,
    }
}

impl ErrorType for TcpConnection {
    type Error = ErrorKind;
}

impl Read for TcpConnection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        io::Read::read(&mut self.stream, buf).map_err(kind)
    }
}

impl Write for TcpConnection {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        io::Write::write(&mut self.stream, buf).map_err(kind)
    }

    async fn flush(&mut self) -> Result<(), ErrorKind> {
        io::Write::flush(&mut self.stream).map_err(kind)
    }
}

impl Connection for TcpConnection {
    fn port(&self) -> u8 {
        self.port
    }

    fn peer(&self) -> u8 {
        GROUND_NODE
    }

    fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Send one request to `port` and collect the reply until the server closes
pub fn request(addr: &str, port: u8, payload: &[u8], timeout: Duration) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(timeout))?;
    io::Write::write_all(&mut stream, &[port])?;
    io::Write::write_all(&mut stream, payload)?;
    io::Write::flush(&mut stream)?;

    let mut reply = Vec::new();
    io::Read::read_to_end(&mut stream, &mut reply)?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::thread;

    #[test]
    fn test_request_reply_over_tcp() {
        let mut listener = TcpCspListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = thread::spawn(move || {
            request(&addr, 11, &[1, 2, 3], Duration::from_secs(2)).unwrap()
        });

        block_on(async {
            let mut conn = listener.accept().await.unwrap();
            assert_eq!(conn.port(), 11);
            let mut buf = [0u8; 3];
            conn.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, [1, 2, 3]);
            conn.write_all(&[4, 5]).await.unwrap();
            conn.close();
        });

        assert_eq!(client.join().unwrap(), vec![4, 5]);
    }
}
