//! # Memcached Client Transport
//!
//! Purpose: Provide the pooled connection primitive used by a memcached
//! client: buffered I/O over one server stream with per-call deadlines, a
//! liveness probe for the configured wire protocol, and idempotent close.
//!
//! ## Design Principles
//! 1. **Deadline Before Use**: Timeouts become absolute deadlines set right
//!    before each blocking read or write.
//! 2. **Strategy by Protocol**: The text or binary probe is chosen once from
//!    the configuration snapshot.
//! 3. **Shared Immutable Config**: Connections hold an `Arc<Config>` that is
//!    never mutated.
//! 4. **Fail Fast**: Closed connections reject I/O with `McError::Closed`.

mod conn;
mod stream;

pub use conn::{Connection, READ_BUF_CAPACITY, WRITE_BUF_CAPACITY};
pub use mcache_common::{Config, McError, McResult, Protocol};
pub use stream::{dial, DeadlineSocket, DeadlineStream, DeadlineTcpStream, SocketTimeouts};
#[cfg(unix)]
pub use stream::DeadlineUnixStream;
