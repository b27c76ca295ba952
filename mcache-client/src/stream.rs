//! # Deadline-Capable Streams
//!
//! Purpose: Abstract the raw byte stream under a pooled connection so that
//! absolute deadlines can be applied right before each blocking call.
//!
//! ## Design Principles
//! 1. **Deadline Before Use**: Callers set a deadline immediately before I/O;
//!    no per-connection timer exists.
//! 2. **Absolute, Not Idle**: `DeadlineSocket` stores the deadline instant and
//!    recomputes the remaining time before every syscall, so a peer that
//!    drips bytes cannot extend a buffered read or a `write_all`.
//! 3. **Trait Seam**: `Connection` is generic over `DeadlineStream`, so tests
//!    can substitute a recording stub for a socket.
//! 4. **Best-Effort Close**: `close` reports errors, but the connection only
//!    logs them.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use mcache_common::{Config, McResult};
use tracing::debug;

/// Bidirectional byte stream that accepts absolute read/write deadlines.
pub trait DeadlineStream: Read + Write {
    /// Bounds subsequent reads so they fail once `deadline` passes.
    fn set_read_deadline(&mut self, deadline: Instant) -> io::Result<()>;

    /// Bounds subsequent writes so they fail once `deadline` passes.
    fn set_write_deadline(&mut self, deadline: Instant) -> io::Result<()>;

    /// Closes the stream in both directions.
    fn close(&mut self) -> io::Result<()>;
}

/// Socket types whose per-syscall timeouts `DeadlineSocket` drives.
pub trait SocketTimeouts: Read + Write {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn shutdown(&self, how: Shutdown) -> io::Result<()>;
}

impl SocketTimeouts for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        TcpStream::shutdown(self, how)
    }
}

#[cfg(unix)]
impl SocketTimeouts for std::os::unix::net::UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, how)
    }
}

/// Socket wrapper enforcing absolute read/write deadlines.
///
/// Each `read`/`write` syscall gets only the time left until the stored
/// deadline; once it has passed the call fails with `TimedOut` without
/// touching the socket.
#[derive(Debug)]
pub struct DeadlineSocket<T> {
    stream: T,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

/// TCP stream with absolute deadlines, as returned by [`dial`].
pub type DeadlineTcpStream = DeadlineSocket<TcpStream>;

#[cfg(unix)]
pub type DeadlineUnixStream = DeadlineSocket<std::os::unix::net::UnixStream>;

impl<T: SocketTimeouts> DeadlineSocket<T> {
    /// Wraps `stream` with no deadlines set.
    pub fn new(stream: T) -> Self {
        DeadlineSocket {
            stream,
            read_deadline: None,
            write_deadline: None,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

/// Time left until `deadline`, or a `TimedOut` error once it has passed.
fn remaining(deadline: Instant) -> io::Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
    }
    Ok(left)
}

impl<T: SocketTimeouts> Read for DeadlineSocket<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(deadline) = self.read_deadline {
            self.stream.set_read_timeout(Some(remaining(deadline)?))?;
        }
        self.stream.read(buf)
    }
}

impl<T: SocketTimeouts> Write for DeadlineSocket<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(deadline) = self.write_deadline {
            self.stream.set_write_timeout(Some(remaining(deadline)?))?;
        }
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl<T: SocketTimeouts> DeadlineStream for DeadlineSocket<T> {
    fn set_read_deadline(&mut self, deadline: Instant) -> io::Result<()> {
        self.read_deadline = Some(deadline);
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Instant) -> io::Result<()> {
        self.write_deadline = Some(deadline);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

/// Opens a TCP stream to one configured server.
///
/// A positive write timeout also bounds the connect attempt for each resolved
/// address. Nagle is disabled since requests are small and latency-bound.
pub fn dial(addr: &str, config: &Config) -> McResult<DeadlineTcpStream> {
    let stream = match config.write_deadline_timeout() {
        Some(timeout) => connect_timeout(addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    stream.set_nodelay(true)?;
    debug!(addr, "dialed memcached server");
    Ok(DeadlineSocket::new(stream))
}

fn connect_timeout(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for socket_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn socket_pair() -> (DeadlineTcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (DeadlineSocket::new(client), server)
    }

    fn past() -> Instant {
        Instant::now()
            .checked_sub(Duration::from_millis(10))
            .unwrap_or_else(Instant::now)
    }

    #[test]
    fn expired_read_deadline_fails_without_reading() {
        let (mut client, mut server) = socket_pair();
        server.write_all(b"VERSION 1.6\r\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        client.set_read_deadline(past()).unwrap();
        let mut buf = [0u8; 16];
        let err = client.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // Data stayed on the socket for a later, fresh deadline.
        client
            .set_read_deadline(Instant::now() + Duration::from_secs(1))
            .unwrap();
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"VERSION 1.6\r\n");
    }

    #[test]
    fn expired_write_deadline_fails_without_writing() {
        let (mut client, _server) = socket_pair();
        client.set_write_deadline(past()).unwrap();
        let err = client.write(b"version\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn unset_deadline_leaves_socket_unbounded() {
        let (mut client, mut server) = socket_pair();
        client.write_all(b"version\r\n").unwrap();
        let mut buf = [0u8; 9];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"version\r\n");
        assert_eq!(client.get_ref().read_timeout().unwrap(), None);
    }

    #[test]
    fn dial_rejects_unresolvable_address() {
        let mut config = Config::new();
        config.write_timeout = 100;
        assert!(dial("not-an-address", &config).is_err());
    }
}
