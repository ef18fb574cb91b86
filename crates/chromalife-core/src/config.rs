//! Configuration loading and typed config structures for the Chromalife server.
//!
//! The canonical configuration lives in `chromalife-config.yaml` in the
//! working directory. This module defines strongly-typed structs that
//! mirror the YAML structure and a loader that reads and validates it.
//! Every field has a default, so an empty document is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::codec::{Compression, MAX_DELTA_DIMENSION, Packing, WireCodec};

/// Largest color count whose ids still fit bits 1..7 of the cell byte.
pub const MAX_COLORS: u8 = 127;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChromalifeConfig {
    /// Listener and transport settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Grid dimensions.
    #[serde(default)]
    pub grid: GridConfig,

    /// Player settings.
    #[serde(default)]
    pub game: GameConfig,

    /// Cadences of the scheduler and the input gate.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Frame packing and compression.
    #[serde(default)]
    pub wire: WireConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ChromalifeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for the listener:
    /// - `CHROMALIFE_HOST` overrides `server.host`
    /// - `CHROMALIFE_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.server.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// and no validation are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Check every value against the limits of the grid and the wire
    /// format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if self.grid.width == 0 || self.grid.height == 0 {
            return invalid(format!(
                "grid dimensions must be non-zero (got {}x{})",
                self.grid.width, self.grid.height
            ));
        }
        if self.grid.width > MAX_DELTA_DIMENSION || self.grid.height > MAX_DELTA_DIMENSION {
            return invalid(format!(
                "grid dimensions must be at most {MAX_DELTA_DIMENSION} (got {}x{})",
                self.grid.width, self.grid.height
            ));
        }
        if self.game.num_colors == 0 || self.game.num_colors > MAX_COLORS {
            return invalid(format!(
                "num_colors must be between 1 and {MAX_COLORS} (got {})",
                self.game.num_colors
            ));
        }

        let intervals = [
            ("timing.tick_interval_ms", self.timing.tick_interval_ms),
            ("timing.full_sync_interval_ms", self.timing.full_sync_interval_ms),
            ("timing.round_duration_seconds", self.timing.round_duration_seconds),
            ("timing.input_interval_ms", self.timing.input_interval_ms),
            ("server.send_timeout_ms", self.server.send_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return invalid(format!("{name} must be at least 1"));
        }

        if self.server.outbound_buffer == 0 {
            return invalid("server.outbound_buffer must be at least 1".to_owned());
        }
        if !(1..=22).contains(&self.wire.zstd_level) {
            return invalid(format!(
                "wire.zstd_level must be between 1 and 22 (got {})",
                self.wire.zstd_level
            ));
        }
        Ok(())
    }
}

/// Listener and transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Milliseconds a single frame write may take before the connection
    /// is dropped.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Frames queued per connection before it is considered stalled.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl ServerSection {
    /// Apply `CHROMALIFE_HOST` / `CHROMALIFE_PORT` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. An unparseable port is
    /// ignored with a warning.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("CHROMALIFE_HOST") {
            self.host = host;
        }
        if let Some(raw) = lookup("CHROMALIFE_PORT") {
            match raw.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(e) => tracing::warn!(value = %raw, error = %e, "ignoring invalid CHROMALIFE_PORT"),
            }
        }
    }

    /// The send timeout as a [`Duration`].
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            send_timeout_ms: default_send_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Grid dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GridConfig {
    /// Number of columns.
    #[serde(default = "default_grid_dimension")]
    pub width: u16,

    /// Number of rows.
    #[serde(default = "default_grid_dimension")]
    pub height: u16,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_dimension(),
            height: default_grid_dimension(),
        }
    }
}

/// Player settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    /// Number of distinct player colors handed out round-robin.
    #[serde(default = "default_num_colors")]
    pub num_colors: u8,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            num_colors: default_num_colors(),
        }
    }
}

/// Scheduler and input cadences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// Milliseconds between simulation ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Milliseconds between full-sync broadcasts.
    #[serde(default = "default_full_sync_interval_ms")]
    pub full_sync_interval_ms: u64,

    /// Length of a round in seconds.
    #[serde(default = "default_round_duration_seconds")]
    pub round_duration_seconds: u64,

    /// Minimum milliseconds between accepted submissions per client.
    #[serde(default = "default_input_interval_ms")]
    pub input_interval_ms: u64,
}

impl TimingConfig {
    /// Tick period.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Full-sync period.
    pub const fn full_sync_interval(&self) -> Duration {
        Duration::from_millis(self.full_sync_interval_ms)
    }

    /// Round length.
    pub const fn round_duration(&self) -> Duration {
        Duration::from_secs(self.round_duration_seconds)
    }

    /// Input rate-limit window.
    pub const fn input_interval(&self) -> Duration {
        Duration::from_millis(self.input_interval_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            full_sync_interval_ms: default_full_sync_interval_ms(),
            round_duration_seconds: default_round_duration_seconds(),
            input_interval_ms: default_input_interval_ms(),
        }
    }
}

/// Compression selector as written in YAML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// No compression.
    None,
    /// zstd at `wire.zstd_level`.
    #[default]
    Zstd,
}

/// Frame format settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireConfig {
    /// Full-sync packing (`bytes` or `bitset`).
    #[serde(default)]
    pub packing: Packing,

    /// Payload compression (`none` or `zstd`).
    #[serde(default)]
    pub compression: CompressionKind,

    /// zstd level used when compression is `zstd`.
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
}

impl WireConfig {
    /// Build the codec described by this section.
    pub const fn codec(&self) -> WireCodec {
        let compression = match self.compression {
            CompressionKind::None => Compression::None,
            CompressionKind::Zstd => Compression::Zstd {
                level: self.zstd_level,
            },
        };
        WireCodec::new(self.packing, compression)
    }
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            packing: Packing::default(),
            compression: CompressionKind::default(),
            zstd_level: default_zstd_level(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error). `RUST_LOG`
    /// takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    5502
}

const fn default_send_timeout_ms() -> u64 {
    2_000
}

const fn default_outbound_buffer() -> usize {
    64
}

const fn default_grid_dimension() -> u16 {
    256
}

const fn default_num_colors() -> u8 {
    16
}

const fn default_tick_interval_ms() -> u64 {
    50
}

const fn default_full_sync_interval_ms() -> u64 {
    10_000
}

const fn default_round_duration_seconds() -> u64 {
    120
}

const fn default_input_interval_ms() -> u64 {
    2_000
}

const fn default_zstd_level() -> i32 {
    3
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ChromalifeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 5502);
        assert_eq!((config.grid.width, config.grid.height), (256, 256));
        assert_eq!(config.game.num_colors, 16);
        assert_eq!(config.timing.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.timing.round_duration(), Duration::from_secs(120));
        assert_eq!(
            config.wire.codec(),
            WireCodec::new(Packing::Bytes, Compression::Zstd { level: 3 })
        );
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let yaml = include_str!("../../../chromalife-config.yaml");
        let config = ChromalifeConfig::parse(yaml).unwrap();
        assert_eq!(config, ChromalifeConfig::default());
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = ChromalifeConfig::parse("").unwrap();
        assert_eq!(config, ChromalifeConfig::default());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9000
  send_timeout_ms: 500
  outbound_buffer: 8

grid:
  width: 128
  height: 64

game:
  num_colors: 4

timing:
  tick_interval_ms: 100
  full_sync_interval_ms: 5000
  round_duration_seconds: 60
  input_interval_ms: 500

wire:
  packing: bitset
  compression: none

logging:
  level: debug
  format: json
"#;
        let config = ChromalifeConfig::parse(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.send_timeout(), Duration::from_millis(500));
        assert_eq!(config.grid.height, 64);
        assert_eq!(config.game.num_colors, 4);
        assert_eq!(config.timing.input_interval(), Duration::from_millis(500));
        assert_eq!(
            config.wire.codec(),
            WireCodec::new(Packing::Bitset, Compression::None)
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = ChromalifeConfig::parse("grid:\n  width: 32\n").unwrap();
        assert_eq!(config.grid.width, 32);
        assert_eq!(config.grid.height, 256);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            ChromalifeConfig::parse("grid: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let cases = [
            "grid:\n  width: 0\n",
            "grid:\n  height: 300\n",
            "game:\n  num_colors: 0\n",
            "game:\n  num_colors: 200\n",
            "timing:\n  tick_interval_ms: 0\n",
            "server:\n  outbound_buffer: 0\n",
            "wire:\n  zstd_level: 40\n",
        ];
        for yaml in cases {
            let config = ChromalifeConfig::parse(yaml).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "expected {yaml:?} to be rejected"
            );
        }
    }

    #[test]
    fn env_overrides_replace_host_and_port() {
        let mut server = ServerSection::default();
        server.apply_overrides_from(|key| match key {
            "CHROMALIFE_HOST" => Some("127.0.0.1".to_owned()),
            "CHROMALIFE_PORT" => Some("7000".to_owned()),
            _ => None,
        });
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 7000);
    }

    #[test]
    fn unparseable_port_override_is_ignored() {
        let mut server = ServerSection::default();
        server.apply_overrides_from(|key| (key == "CHROMALIFE_PORT").then(|| "abc".to_owned()));
        assert_eq!(server.port, 5502);
    }
}
