//! Session configuration and JSON persistence.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use simwire_proto::DEFAULT_PORT;

/// Connection settings for a [`SimulationSession`](crate::SimulationSession).
///
/// Defaults: `localhost:5923`, 5 s connect timeout, no socket I/O timeout,
/// 10 ms between result polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[must_use]
pub struct SessionConfig {
    /// Engine address (`host:port`).
    pub address: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Socket read/write timeout in milliseconds. `None` blocks indefinitely.
    pub io_timeout_ms: Option<u64>,
    /// Pause between result polls while an analysis is running.
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: format!("localhost:{DEFAULT_PORT}"),
            connect_timeout_ms: 5_000,
            io_timeout_ms: None,
            poll_interval_ms: 10,
        }
    }
}

impl SessionConfig {
    /// Default settings for the given address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Loads settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Persists settings to a JSON file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Sets the engine address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis(timeout);
        self
    }

    /// Sets the socket read/write timeout.
    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout_ms = timeout.map(millis);
        self
    }

    /// Sets the pause between result polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis(interval);
        self
    }

    pub(crate) const fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn io_timeout_duration(&self) -> Option<Duration> {
        self.io_timeout_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    pub(crate) const fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Whole milliseconds, saturating.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_engine() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.address, "localhost:5923");
        assert_eq!(cfg.connect_timeout_duration(), Duration::from_secs(5));
        assert_eq!(cfg.io_timeout_duration(), None);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "address": "sim.lab:6000", "io_timeout_ms": 250 }"#).unwrap();

        let cfg = SessionConfig::load(&path).unwrap();
        assert_eq!(cfg.address, "sim.lab:6000");
        assert_eq!(cfg.io_timeout_duration(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.poll_interval_ms, 10);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = SessionConfig::new("10.0.0.2:5923")
            .connect_timeout(Duration::from_millis(1500))
            .poll_interval(Duration::from_millis(2));
        cfg.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn malformed_file_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = SessionConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
