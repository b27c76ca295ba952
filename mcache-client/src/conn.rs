//! # Transport Connection
//!
//! Purpose: Wrap one raw stream to a memcached server with buffered I/O,
//! per-call deadlines, a protocol-aware liveness probe, and one-shot teardown.
//!
//! ## Design Principles
//! 1. **Deadline Before Use**: Read/write deadlines are applied immediately
//!    before each blocking call, never ahead of time.
//! 2. **Owned-Option Teardown**: Stream, buffers, and config live together in
//!    one `Option`, so they are present or absent as a unit.
//! 3. **Fail Fast After Close**: Every I/O call on a closed connection returns
//!    `McError::Closed` without touching the stream.
//! 4. **Single Owner**: No internal locking; the pool serializes access.
//!
//! ## Structure Overview
//!
//! ```text
//! Connection<S>
//!   ├── index: usize            (pool slot, informational)
//!   └── live: Option<Live<S>>   (None once closed)
//!         ├── reader: BufReader<S>   (owns the stream)
//!         ├── write_buf: Vec<u8>     (staged writes)
//!         ├── config: Arc<Config>
//!         └── protocol: Protocol     (selected at construction)
//! ```

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::Arc;
use std::time::Instant;

use mcache_common::{Config, McError, McResult, Protocol};
use tracing::{debug, trace, warn};

use crate::stream::DeadlineStream;

/// Capacity of the buffered reader.
pub const READ_BUF_CAPACITY: usize = 4096;

/// Staged writes drain to the stream once they reach this many bytes.
pub const WRITE_BUF_CAPACITY: usize = 4096;

/// Stream and per-connection state that is released on close.
struct Live<S: DeadlineStream> {
    // The reader owns the stream; writes go through `get_mut`.
    reader: BufReader<S>,
    write_buf: Vec<u8>,
    config: Arc<Config>,
    protocol: Protocol,
}

impl<S: DeadlineStream> Live<S> {
    fn apply_read_deadline(&mut self, index: usize) -> io::Result<()> {
        if let Some(timeout) = self.config.read_deadline_timeout() {
            let deadline = Instant::now() + timeout;
            trace!(index, ?timeout, "applying read deadline");
            self.reader.get_mut().set_read_deadline(deadline)?;
        }
        Ok(())
    }

    fn apply_write_deadline(&mut self, index: usize) -> io::Result<()> {
        if let Some(timeout) = self.config.write_deadline_timeout() {
            let deadline = Instant::now() + timeout;
            trace!(index, ?timeout, "applying write deadline");
            self.reader.get_mut().set_write_deadline(deadline)?;
        }
        Ok(())
    }

    fn stage(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_buf.len() + buf.len() > WRITE_BUF_CAPACITY {
            self.drain()?;
        }
        if buf.len() >= WRITE_BUF_CAPACITY {
            // Too large to stage; the buffer is already empty.
            self.reader.get_mut().write_all(buf)?;
        } else {
            self.write_buf.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn drain(&mut self) -> io::Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let result = self.reader.get_mut().write_all(&self.write_buf);
        // Partially written frames are never resent.
        self.write_buf.clear();
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.reader.get_mut().flush()
    }
}

/// Buffered, deadline-aware connection to a single memcached server.
///
/// Created by the pool around an already established stream. The pool calls
/// [`Connection::connected`] to decide whether to keep a slot and
/// [`Connection::close`] when retiring it; dropping the connection closes it
/// as well.
pub struct Connection<S: DeadlineStream> {
    index: usize,
    live: Option<Live<S>>,
}

impl<S: DeadlineStream> Connection<S> {
    /// Wraps `stream` for pool slot `index`.
    pub fn new(stream: S, config: Arc<Config>, index: usize) -> Self {
        let protocol = config.protocol();
        Connection {
            index,
            live: Some(Live {
                reader: BufReader::with_capacity(READ_BUF_CAPACITY, stream),
                write_buf: Vec::with_capacity(WRITE_BUF_CAPACITY),
                config,
                protocol,
            }),
        }
    }

    /// Pool slot this connection occupies.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns true once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.live.is_none()
    }

    /// Configuration snapshot, or `None` after close.
    pub fn config(&self) -> Option<&Config> {
        self.live.as_ref().map(|live| live.config.as_ref())
    }

    /// Wire protocol selected at construction, or `None` after close.
    pub fn protocol(&self) -> Option<Protocol> {
        self.live.as_ref().map(|live| live.protocol)
    }

    fn live(&mut self) -> McResult<&mut Live<S>> {
        self.live.as_mut().ok_or(McError::Closed)
    }

    /// Sets the read deadline to now + read timeout when the timeout is positive.
    ///
    /// A non-positive timeout leaves whatever deadline the stream already has.
    pub fn apply_read_deadline(&mut self) -> McResult<()> {
        let index = self.index;
        self.live()?.apply_read_deadline(index)?;
        Ok(())
    }

    /// Sets the write deadline to now + write timeout when the timeout is positive.
    pub fn apply_write_deadline(&mut self) -> McResult<()> {
        let index = self.index;
        self.live()?.apply_write_deadline(index)?;
        Ok(())
    }

    /// Writes `buf` and flushes it to the server.
    ///
    /// Returns the number of bytes accepted. A flush failure is reported even
    /// though the bytes were buffered.
    pub fn write(&mut self, buf: &[u8]) -> McResult<usize> {
        let index = self.index;
        let live = self.live()?;
        live.apply_write_deadline(index)?;
        let written = live.stage(buf)?;
        live.flush()?;
        Ok(written)
    }

    /// Stages `buf` without flushing, for batching several writes.
    pub fn write_to_buffer(&mut self, buf: &[u8]) -> McResult<usize> {
        let index = self.index;
        let live = self.live()?;
        live.apply_write_deadline(index)?;
        Ok(live.stage(buf)?)
    }

    /// Writes any staged bytes to the stream.
    pub fn flush(&mut self) -> McResult<()> {
        self.live()?.flush()?;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> McResult<usize> {
        let index = self.index;
        let live = self.live()?;
        live.apply_read_deadline(index)?;
        Ok(live.reader.read(buf)?)
    }

    /// Reads up to and including the first `delim`.
    ///
    /// Bytes past the delimiter stay buffered for the next read. Fails with
    /// `UnexpectedEof` if the stream ends first.
    pub fn read_string(&mut self, delim: u8) -> McResult<String> {
        let index = self.index;
        let live = self.live()?;
        live.apply_read_deadline(index)?;

        let mut line = Vec::new();
        live.reader.read_until(delim, &mut line)?;
        if line.last() != Some(&delim) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended before delimiter",
            )
            .into());
        }
        String::from_utf8(line)
            .map_err(|err| McError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// Reads exactly one byte.
    pub fn read_byte(&mut self) -> McResult<u8> {
        let index = self.index;
        let live = self.live()?;
        live.apply_read_deadline(index)?;

        let mut byte = [0u8; 1];
        live.reader.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Liveness probe used by the pool to keep or evict this slot.
    ///
    /// Returns false once closed or when the probe request cannot be written.
    /// The text probe then drains one reply line but ignores a read failure,
    /// so a server that accepts writes and never answers still counts as
    /// alive. The binary probe never reads the reply.
    pub fn connected(&mut self) -> bool {
        let protocol = match self.live.as_ref() {
            Some(live) => live.protocol,
            None => return false,
        };

        if let Err(err) = self.write(protocol.probe_request()) {
            debug!(index = self.index, %protocol, error = %err, "liveness probe write failed");
            return false;
        }

        if protocol.awaits_probe_reply() {
            if let Err(err) = self.read_string(b'\n') {
                debug!(index = self.index, %protocol, error = %err, "ignoring liveness probe reply error");
            }
        }

        true
    }

    /// Closes the stream and releases buffers and the config reference.
    ///
    /// A close error from the stream is logged, never returned. Later calls
    /// are no-ops.
    pub fn close(&mut self) {
        let Some(mut live) = self.live.take() else {
            return;
        };
        if let Err(err) = live.reader.get_mut().close() {
            warn!(index = self.index, error = %err, "failed to close memcached stream");
        }
        debug!(index = self.index, "connection closed");
    }
}

impl<S: DeadlineStream> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}
