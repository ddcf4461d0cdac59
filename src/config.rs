//! Codec and heartbeat configuration.
//!
//! Both configs follow the same shape: a `Default` built from the `DEFAULT_*`
//! constants, consuming builder setters, and `serde` deserialization with
//! every field optional so a runtime can load them from JSON:
//!
//! ```
//! use tpwire::config::HeartbeatConfig;
//!
//! let cfg = HeartbeatConfig::from_json_str(r#"{"rate": 10, "mode": "pull"}"#).unwrap();
//! assert_eq!(cfg.rate.as_secs(), 10);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::heartbeat::{HEARTBEAT_URI, MIN_RATE_SECOND};

/// Default maximum encoded frame size (16 MB).
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

/// Default size of the buffered reader wrapped around the read half.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Default prober rate.
pub const DEFAULT_HEARTBEAT_RATE: Duration = Duration::from_secs(60);

/// Default rate assumed by a responder before the peer declares one.
pub const DEFAULT_RESPONDER_RATE: Duration = Duration::from_secs(60);

/// Lowest accepted rate floor.
pub const MIN_RATE_FLOOR: Duration = Duration::from_secs(1);

/// Configuration for a [`FrameCodec`](crate::protocol::FrameCodec).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Upper bound on the encoded size of one frame, checked on both pack
    /// and unpack.
    pub max_packet_size: u32,
    /// Capacity of the buffered reader.
    pub read_buffer_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl CodecConfig {
    /// Set the maximum frame size.
    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Set the read buffer capacity.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// How the prober checks an idle session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingMode {
    /// One-way probe; only a failed send counts as failure.
    #[default]
    Push,
    /// Request/reply probe; a missing or failed reply counts as failure.
    Pull,
}

/// Configuration for the heartbeat prober and responder.
///
/// Rates are whole seconds in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Prober sweep and probe rate.
    #[serde(with = "secs")]
    pub rate: Duration,
    /// Floor every rate is clamped up to. Never below [`MIN_RATE_FLOOR`].
    #[serde(serialize_with = "secs::serialize", deserialize_with = "secs::deserialize_floor")]
    pub min_rate: Duration,
    /// Rate a responder assumes for a session until the peer declares one.
    #[serde(with = "secs")]
    pub responder_initial_rate: Duration,
    /// Reserved heartbeat path used by the prober.
    pub uri: String,
    /// Probe mode.
    pub mode: PingMode,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_HEARTBEAT_RATE,
            min_rate: Duration::from_secs(MIN_RATE_SECOND),
            responder_initial_rate: DEFAULT_RESPONDER_RATE,
            uri: HEARTBEAT_URI.to_string(),
            mode: PingMode::Push,
        }
    }
}

impl HeartbeatConfig {
    /// Set the prober rate.
    pub fn rate(mut self, rate: Duration) -> Self {
        self.rate = rate;
        self
    }

    /// Set the rate floor, raised to [`MIN_RATE_FLOOR`] if lower.
    pub fn min_rate(mut self, rate: Duration) -> Self {
        self.min_rate = rate.max(MIN_RATE_FLOOR);
        self
    }

    /// Effective rate floor, even for a floor set directly on the field.
    pub fn rate_floor(&self) -> Duration {
        self.min_rate.max(MIN_RATE_FLOOR)
    }

    /// Set the responder's initial per-session rate.
    pub fn responder_initial_rate(mut self, rate: Duration) -> Self {
        self.responder_initial_rate = rate;
        self
    }

    /// Set the heartbeat path the prober addresses.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Set the probe mode.
    pub fn mode(mut self, mode: PingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Clamp a rate up to the configured floor.
    pub fn clamp(&self, rate: Duration) -> Duration {
        rate.max(self.rate_floor())
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::MIN_RATE_FLOOR;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }

    pub fn deserialize_floor<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(deserialize(d)?.max(MIN_RATE_FLOOR))
    }
}
