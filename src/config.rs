//! Gateway configuration.
//!
//! Loaded from JSON or built in code:
//!
//! ```
//! use gatewire::config::GatewayConfig;
//!
//! let config = GatewayConfig::from_json_str(r#"{
//!     "tcp_addr": "127.0.0.1:3563",
//!     "len_msg_len": 4,
//!     "max_msg_len": 65536
//! }"#).unwrap();
//!
//! assert_eq!(config.max_conn_num, 100);
//! assert!(config.validate().is_ok());
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::protocol::{ByteOrder, LengthPrefix, PrefixWidth, ENVELOPE_HEADER_SIZE};
use crate::writer::WriterConfig;

/// Default connection cap per listener.
pub const DEFAULT_MAX_CONN_NUM: usize = 100;

/// Default queued writes per session.
pub const DEFAULT_PENDING_WRITE_NUM: usize = 100;

/// Default largest envelope in bytes.
pub const DEFAULT_MAX_MSG_LEN: u32 = 4096;

/// Listener, framing and limit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Live connections per listener; extra connections are closed.
    pub max_conn_num: usize,
    /// Queued outbound envelopes per session.
    pub pending_write_num: usize,
    /// Largest envelope accepted or sent.
    pub max_msg_len: u32,

    /// TCP listen address, e.g. `"0.0.0.0:3563"`.
    pub tcp_addr: Option<String>,
    /// Width of the TCP length prefix: 1, 2 or 4.
    pub len_msg_len: u8,
    /// Byte order of the TCP length prefix.
    pub little_endian: bool,

    /// WebSocket listen address.
    pub ws_addr: Option<String>,
    /// WebSocket handshake timeout.
    pub http_timeout_ms: u64,

    /// How long a sender waits for room in a full write queue.
    pub write_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_conn_num: DEFAULT_MAX_CONN_NUM,
            pending_write_num: DEFAULT_PENDING_WRITE_NUM,
            max_msg_len: DEFAULT_MAX_MSG_LEN,
            tcp_addr: None,
            len_msg_len: 2,
            little_endian: false,
            ws_addr: None,
            http_timeout_ms: 10_000,
            write_timeout_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tcp_addr.is_none() && self.ws_addr.is_none() {
            return Err(GatewayError::Config(
                "no listen address: set tcp_addr or ws_addr".to_string(),
            ));
        }
        PrefixWidth::try_from(self.len_msg_len)?;
        if (self.max_msg_len as usize) < ENVELOPE_HEADER_SIZE {
            return Err(GatewayError::Config(format!(
                "max_msg_len {} cannot hold the {}-byte envelope header",
                self.max_msg_len, ENVELOPE_HEADER_SIZE
            )));
        }
        if self.max_conn_num == 0 {
            return Err(GatewayError::Config(
                "max_conn_num must be positive".to_string(),
            ));
        }
        if self.pending_write_num == 0 {
            return Err(GatewayError::Config(
                "pending_write_num must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// TCP length prefix built from `len_msg_len`, `little_endian` and `max_msg_len`.
    pub fn length_prefix(&self) -> Result<LengthPrefix> {
        Ok(LengthPrefix::new(
            PrefixWidth::try_from(self.len_msg_len)?,
            ByteOrder::from_little_endian(self.little_endian),
            self.max_msg_len,
        ))
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.pending_write_num,
            write_timeout: self.write_timeout(),
        }
    }

    #[inline]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    #[inline]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
