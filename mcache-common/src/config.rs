//! # Configuration Snapshot
//!
//! Purpose: Hold the immutable settings shared by every pooled connection.
//!
//! ## Usage Notes
//!
//! - Build with `Config::new()` (or `Default`) and override fields, or load
//!   with `Config::from_json_str`; missing JSON keys keep their defaults.
//! - Wrap the result in an `Arc` before handing it to connections. It is
//!   never mutated afterwards, so no locking is required.
//! - Timeouts are milliseconds; zero or negative means no deadline is set.
//! - `number_of_replicas` and `refresh_hash_interval_in_second` are consumed
//!   by the hash ring, never by the transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{McError, McResult};
use crate::protocol::Protocol;

/// Default connections opened per server.
pub const DEFAULT_INIT_CONNS: u16 = 15;

/// Default replica weight of each server on the hash ring.
pub const DEFAULT_NUMBER_OF_REPLICAS: usize = 20;

/// Default hash ring refresh interval in seconds.
pub const DEFAULT_REFRESH_HASH_INTERVAL_IN_SECOND: u64 = 10;

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// Memcached servers as "host:port".
    pub servers: Vec<String>,
    /// Connection pool size of each server.
    pub init_conns: u16,
    /// Read timeout in milliseconds.
    pub read_timeout: i64,
    /// Write timeout in milliseconds.
    pub write_timeout: i64,
    /// Number of replicas of each server on the hash ring.
    pub number_of_replicas: usize,
    /// Hash ring refresh interval in seconds.
    pub refresh_hash_interval_in_second: u64,
    /// 0 selects the text protocol, anything else binary.
    pub text_or_binary: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            servers: Vec::new(),
            init_conns: DEFAULT_INIT_CONNS,
            read_timeout: 0,
            write_timeout: 0,
            number_of_replicas: DEFAULT_NUMBER_OF_REPLICAS,
            refresh_hash_interval_in_second: DEFAULT_REFRESH_HASH_INTERVAL_IN_SECOND,
            text_or_binary: 0,
        }
    }
}

impl Config {
    /// Creates a configuration with default pool and ring settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and validates a JSON configuration.
    pub fn from_json_str(input: &str) -> McResult<Self> {
        let config: Config = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Wire protocol selected by `text_or_binary`.
    pub fn protocol(&self) -> Protocol {
        Protocol::from_selector(self.text_or_binary)
    }

    /// Read timeout, or `None` when reads are unbounded.
    pub fn read_deadline_timeout(&self) -> Option<Duration> {
        positive_millis(self.read_timeout)
    }

    /// Write timeout, or `None` when writes are unbounded.
    pub fn write_deadline_timeout(&self) -> Option<Duration> {
        positive_millis(self.write_timeout)
    }

    /// Hash ring refresh interval.
    pub fn refresh_hash_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_hash_interval_in_second)
    }

    /// Checks the settings the pool and ring depend on.
    ///
    /// Timeouts are not checked: non-positive values are meaningful.
    pub fn validate(&self) -> McResult<()> {
        if self.init_conns == 0 {
            return Err(McError::InvalidConfig("InitConns must be positive".into()));
        }
        if self.number_of_replicas == 0 {
            return Err(McError::InvalidConfig(
                "NumberOfReplicas must be positive".into(),
            ));
        }
        if self.refresh_hash_interval_in_second == 0 {
            return Err(McError::InvalidConfig(
                "RefreshHashIntervalInSecond must be positive".into(),
            ));
        }
        for server in &self.servers {
            validate_server(server)?;
        }
        Ok(())
    }
}

fn positive_millis(millis: i64) -> Option<Duration> {
    if millis > 0 {
        Some(Duration::from_millis(millis as u64))
    } else {
        None
    }
}

fn validate_server(server: &str) -> McResult<()> {
    let invalid = || McError::InvalidConfig(format!("invalid server address: {:?}", server));
    let (host, port) = server.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(())
}
