//! # Wire Protocol Selection
//!
//! Purpose: Describe which memcached wire format a connection speaks and the
//! frames used to probe a pooled connection for liveness.
//!
//! ## Design Principles
//!
//! 1. **Selected Once**: The protocol is derived from the configuration
//!    snapshot when a connection is built; there is no auto-detection.
//! 2. **Static Frames**: Probe requests are compile-time constants, so a probe
//!    never allocates.
//! 3. **Variant-Owned Behavior**: Each variant knows both the request it sends
//!    and whether a reply must be drained afterwards.
//!
//! ## Memory Layout Example
//!
//! ```text
//! Text probe (9 bytes total):
//! +-----------------------+
//! | "version\r\n"         |
//! +-----------------------+
//!
//! Binary probe (25 bytes total, 24B header + 1B key):
//! +-------+--------+-----------+-----------+-----------+----------+
//! | magic | opcode | key_len   | extras:1B | dtype:1B  | vb:2B    |
//! | 0x80  | 0x09   | 0x0001 2B | 0x00      | 0x00      | 0x0000   |
//! +-------+--------+-----------+-----------+-----------+----------+
//! | body_len:4B = 1  | opaque:4B = 0 | cas:8B = 0     | key: 'a' |
//! +------------------+---------------+----------------+----------+
//! ```

use std::fmt;

/// Magic byte marking a binary protocol request.
pub const BINARY_REQUEST_MAGIC: u8 = 0x80;

/// Binary protocol opcode for `stat`.
pub const BINARY_OPCODE_STAT: u8 = 0x09;

/// Size of the fixed binary request header.
pub const BINARY_HEADER_LEN: usize = 24;

/// Liveness probe for the text protocol.
pub const TEXT_PROBE: &[u8] = b"version\r\n";

/// Liveness probe for the binary protocol: a `stat` request for the key `a`.
pub const BINARY_PROBE: [u8; BINARY_HEADER_LEN + 1] = binary_probe();

const fn binary_probe() -> [u8; BINARY_HEADER_LEN + 1] {
    let mut frame = [0u8; BINARY_HEADER_LEN + 1];
    frame[0] = BINARY_REQUEST_MAGIC;
    frame[1] = BINARY_OPCODE_STAT;
    // key length (big endian u16) = 1
    frame[3] = 0x01;
    // total body length (big endian u32) = 1
    frame[11] = 0x01;
    frame[BINARY_HEADER_LEN] = b'a';
    frame
}

/// Wire format spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Line-oriented ASCII protocol.
    #[default]
    Text,
    /// Fixed-header binary framing protocol.
    Binary,
}

impl Protocol {
    /// Maps the numeric `TextOrBinary` selector: 0 is text, anything else binary.
    pub const fn from_selector(selector: i64) -> Self {
        if selector == 0 {
            Protocol::Text
        } else {
            Protocol::Binary
        }
    }

    /// Request written by the liveness probe.
    pub const fn probe_request(self) -> &'static [u8] {
        match self {
            Protocol::Text => TEXT_PROBE,
            Protocol::Binary => &BINARY_PROBE,
        }
    }

    /// Whether the probe drains one reply line after a successful write.
    ///
    /// The binary probe is write-only; its reply is never read.
    pub const fn awaits_probe_reply(self) -> bool {
        matches!(self, Protocol::Text)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Text => f.write_str("text"),
            Protocol::Binary => f.write_str("binary"),
        }
    }
}
