// mcache-common - Shared configuration and wire definitions for the memcached client
//
// This crate defines the configuration snapshot shared by every pooled
// connection, the text/binary protocol selector, and the error taxonomy.

pub mod config;
pub mod error;
pub mod protocol;

// Re-export for convenience
pub use config::*;
pub use error::*;
pub use protocol::*;
