//! TOML-based configuration for the mirroring client.
//!
//! Reads `AppConfig` from an explicit path or from the platform config file:
//! - Windows:  `%APPDATA%\MirrorLink\config.toml`
//! - Linux:    `~/.config/mirrorlink/config.toml`
//! - macOS:    `~/Library/Application Support/MirrorLink/config.toml`
//!
//! Example:
//!
//! ```toml
//! [stream]
//! host = "127.0.0.1"
//! port = 27183
//! ingress = "packetized"
//! codec = "h264"
//!
//! [session]
//! fallback_timeout_ms = 5000
//!
//! [input]
//! move_throttle_ms = 50
//!
//! [adb]
//! path = "adb"
//!
//! [server]
//! enabled = true
//! jar = "/opt/scrcpy/scrcpy-server"
//! max_size = 1280
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a missing file, a
//! missing section, or a missing key all fall back to the built-in value.
//! Old config files keep working when new keys are added.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mirror_core::{
    ChunkAlignment, GestureConfig, ReassemblerConfig, ReassemblyMode, ScrollConfig,
    StreamHeaderOptions, VideoCodec,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::session::SessionConfig;
use crate::infrastructure::adb::ServerConfig;
use crate::infrastructure::transport::TcpTransportConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub adb: AdbSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub log: LogSection,
}

/// How video arrives on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressMode {
    /// Framed packets tagged configuration/data.
    Packetized,
    /// A raw Annex-B byte stream.
    AnnexB,
}

/// Video socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ingress")]
    pub ingress: IngressMode,
    #[serde(default = "default_codec")]
    pub codec: VideoCodec,
    /// Only used with `ingress = "annexb"`.
    #[serde(default = "default_alignment")]
    pub alignment: ChunkAlignment,
    #[serde(default = "default_buffer_cap")]
    pub buffer_cap_bytes: usize,
    #[serde(default = "default_max_pending_packets")]
    pub max_pending_packets: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
    #[serde(default = "default_true")]
    pub send_dummy_byte: bool,
    #[serde(default = "default_true")]
    pub send_device_meta: bool,
    #[serde(default = "default_true")]
    pub send_codec_meta: bool,
}

/// Lifecycle timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
    #[serde(default = "default_decoder_grace_ms")]
    pub decoder_grace_ms: u64,
    #[serde(default = "default_max_decoder_resets")]
    pub max_decoder_resets: u32,
    #[serde(default = "default_reset_debounce_ms")]
    pub reset_debounce_ms: u64,
}

/// Pointer and wheel tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSection {
    #[serde(default = "default_move_throttle_ms")]
    pub move_throttle_ms: u64,
    #[serde(default = "default_tap_max_distance_px")]
    pub tap_max_distance_px: f64,
    #[serde(default = "default_tap_max_duration_ms")]
    pub tap_max_duration_ms: u64,
    #[serde(default = "default_scroll_quiet_ms")]
    pub scroll_quiet_ms: u64,
    /// Weight of the newest pointer position in the scroll anchor average.
    #[serde(default = "default_scroll_smoothing")]
    pub scroll_smoothing: f64,
    #[serde(default = "default_scroll_distance_factor")]
    pub scroll_distance_factor: f64,
    #[serde(default = "default_swipe_ms_per_px")]
    pub swipe_ms_per_px: f64,
    #[serde(default = "default_swipe_min_ms")]
    pub swipe_min_ms: u64,
    #[serde(default = "default_swipe_max_ms")]
    pub swipe_max_ms: u64,
}

/// `adb` location and default device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSection {
    #[serde(default = "default_adb_path")]
    pub path: PathBuf,
    /// Serial to connect to at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// The stream server pushed to and started on the device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// When `false`, something else runs the server and sets up the forward.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_jar")]
    pub jar: PathBuf,
    #[serde(default = "default_server_version")]
    pub version: String,
    /// Longest edge of the encoded video, in pixels.
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[serde(default = "default_bit_rate")]
    pub bit_rate: u32,
    #[serde(default = "default_max_fps")]
    pub max_fps: u32,
    #[serde(default = "default_keyframe_interval_s")]
    pub keyframe_interval_s: u32,
    #[serde(default = "default_server_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_server_startup_wait_ms")]
    pub startup_wait_ms: u64,
    #[serde(default = "default_server_retry_ms")]
    pub retry_ms: u64,
    #[serde(default = "default_launch_attempts")]
    pub launch_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSection {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    27183
}
fn default_ingress() -> IngressMode {
    IngressMode::Packetized
}
fn default_codec() -> VideoCodec {
    VideoCodec::H264
}
fn default_alignment() -> ChunkAlignment {
    ChunkAlignment::Unaligned
}
fn default_buffer_cap() -> usize {
    mirror_core::protocol::reassembly::DEFAULT_BUFFER_CAP
}
fn default_max_pending_packets() -> usize {
    mirror_core::protocol::reassembly::DEFAULT_MAX_PENDING_PACKETS
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_connect_attempts() -> u32 {
    5
}
fn default_connect_retry_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_fallback_timeout_ms() -> u64 {
    5_000
}
fn default_reconnect_base_ms() -> u64 {
    1_000
}
fn default_reconnect_max_ms() -> u64 {
    10_000
}
fn default_decoder_grace_ms() -> u64 {
    100
}
fn default_max_decoder_resets() -> u32 {
    3
}
fn default_reset_debounce_ms() -> u64 {
    1_000
}
fn default_move_throttle_ms() -> u64 {
    50
}
fn default_tap_max_distance_px() -> f64 {
    10.0
}
fn default_tap_max_duration_ms() -> u64 {
    200
}
fn default_scroll_quiet_ms() -> u64 {
    150
}
fn default_scroll_smoothing() -> f64 {
    0.3
}
fn default_scroll_distance_factor() -> f64 {
    1.0
}
fn default_swipe_ms_per_px() -> f64 {
    0.5
}
fn default_swipe_min_ms() -> u64 {
    100
}
fn default_swipe_max_ms() -> u64 {
    400
}
fn default_adb_path() -> PathBuf {
    PathBuf::from("adb")
}
fn default_server_jar() -> PathBuf {
    PathBuf::from("scrcpy-server")
}
fn default_server_version() -> String {
    "3.3.3".to_string()
}
fn default_max_size() -> u32 {
    1280
}
fn default_bit_rate() -> u32 {
    1_000_000
}
fn default_max_fps() -> u32 {
    20
}
fn default_keyframe_interval_s() -> u32 {
    1
}
fn default_server_settle_ms() -> u64 {
    2_000
}
fn default_server_startup_wait_ms() -> u64 {
    2_000
}
fn default_server_retry_ms() -> u64 {
    2_000
}
fn default_launch_attempts() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ingress: default_ingress(),
            codec: default_codec(),
            alignment: default_alignment(),
            buffer_cap_bytes: default_buffer_cap(),
            max_pending_packets: default_max_pending_packets(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_attempts: default_connect_attempts(),
            connect_retry_ms: default_connect_retry_ms(),
            send_dummy_byte: true,
            send_device_meta: true,
            send_codec_meta: true,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            fallback_timeout_ms: default_fallback_timeout_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            decoder_grace_ms: default_decoder_grace_ms(),
            max_decoder_resets: default_max_decoder_resets(),
            reset_debounce_ms: default_reset_debounce_ms(),
        }
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            move_throttle_ms: default_move_throttle_ms(),
            tap_max_distance_px: default_tap_max_distance_px(),
            tap_max_duration_ms: default_tap_max_duration_ms(),
            scroll_quiet_ms: default_scroll_quiet_ms(),
            scroll_smoothing: default_scroll_smoothing(),
            scroll_distance_factor: default_scroll_distance_factor(),
            swipe_ms_per_px: default_swipe_ms_per_px(),
            swipe_min_ms: default_swipe_min_ms(),
            swipe_max_ms: default_swipe_max_ms(),
        }
    }
}

impl Default for AdbSection {
    fn default() -> Self {
        Self {
            path: default_adb_path(),
            device: None,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            jar: default_server_jar(),
            version: default_server_version(),
            max_size: default_max_size(),
            bit_rate: default_bit_rate(),
            max_fps: default_max_fps(),
            keyframe_interval_s: default_keyframe_interval_s(),
            settle_ms: default_server_settle_ms(),
            startup_wait_ms: default_server_startup_wait_ms(),
            retry_ms: default_server_retry_ms(),
            launch_attempts: default_launch_attempts(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Rejects values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, reason: &str| ConfigError::Invalid {
            key,
            reason: reason.to_string(),
        };
        if self.stream.port == 0 {
            return Err(invalid("stream.port", "must be non-zero"));
        }
        if self.stream.buffer_cap_bytes == 0 {
            return Err(invalid("stream.buffer_cap_bytes", "must be non-zero"));
        }
        if self.stream.ingress == IngressMode::AnnexB && !self.stream.codec.supports_annex_b() {
            return Err(invalid("stream.ingress", "annexb requires h264 or h265"));
        }
        if self.session.reconnect_base_ms > self.session.reconnect_max_ms {
            return Err(invalid("session.reconnect_base_ms", "exceeds reconnect_max_ms"));
        }
        if !(0.0..=1.0).contains(&self.input.scroll_smoothing) {
            return Err(invalid("input.scroll_smoothing", "must be within 0.0..=1.0"));
        }
        if self.input.swipe_min_ms > self.input.swipe_max_ms {
            return Err(invalid("input.swipe_min_ms", "exceeds swipe_max_ms"));
        }
        if self.stream.connect_attempts == 0 {
            return Err(invalid("stream.connect_attempts", "must be at least 1"));
        }
        if self.server.enabled && self.server.launch_attempts == 0 {
            return Err(invalid("server.launch_attempts", "must be at least 1"));
        }
        Ok(())
    }

    pub fn header_options(&self) -> StreamHeaderOptions {
        StreamHeaderOptions {
            send_dummy_byte: self.stream.send_dummy_byte,
            send_device_meta: self.stream.send_device_meta,
            send_codec_meta: self.stream.send_codec_meta,
            send_frame_meta: self.stream.ingress == IngressMode::Packetized,
            codec: self.stream.codec,
        }
    }

    pub fn reassembler_config(&self) -> ReassemblerConfig {
        let mode = match self.stream.ingress {
            IngressMode::Packetized => ReassemblyMode::Packetized,
            IngressMode::AnnexB => ReassemblyMode::AnnexB {
                alignment: self.stream.alignment,
            },
        };
        ReassemblerConfig {
            mode,
            codec: self.stream.codec,
            buffer_cap: self.stream.buffer_cap_bytes,
            max_pending_packets: self.stream.max_pending_packets,
        }
    }

    pub fn transport_config(&self) -> TcpTransportConfig {
        TcpTransportConfig {
            host: self.stream.host.clone(),
            port: self.stream.port,
            connect_timeout: Duration::from_millis(self.stream.connect_timeout_ms),
            connect_attempts: self.stream.connect_attempts,
            connect_retry_delay: Duration::from_millis(self.stream.connect_retry_ms),
            header: self.header_options(),
        }
    }

    /// Launcher settings.  The forward targets the port the video socket
    /// connects to.
    pub fn server_config(&self) -> ServerConfig {
        let s = &self.server;
        ServerConfig {
            jar: s.jar.clone(),
            version: s.version.clone(),
            local_port: self.stream.port,
            max_size: s.max_size,
            bit_rate: s.bit_rate,
            max_fps: s.max_fps,
            keyframe_interval_s: s.keyframe_interval_s,
            header: self.header_options(),
            settle: Duration::from_millis(s.settle_ms),
            startup_wait: Duration::from_millis(s.startup_wait_ms),
            retry_delay: Duration::from_millis(s.retry_ms),
            launch_attempts: s.launch_attempts,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let s = &self.session;
        SessionConfig {
            reassembler: self.reassembler_config(),
            fallback_timeout: Duration::from_millis(s.fallback_timeout_ms),
            reconnect_base: Duration::from_millis(s.reconnect_base_ms),
            reconnect_max: Duration::from_millis(s.reconnect_max_ms),
            decoder_grace: Duration::from_millis(s.decoder_grace_ms),
            max_decoder_resets: s.max_decoder_resets,
            reset_debounce: Duration::from_millis(s.reset_debounce_ms),
        }
    }

    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            move_throttle: Duration::from_millis(self.input.move_throttle_ms),
            tap_max_distance: self.input.tap_max_distance_px,
            tap_max_duration: Duration::from_millis(self.input.tap_max_duration_ms),
        }
    }

    pub fn scroll_config(&self) -> ScrollConfig {
        ScrollConfig {
            quiet_period: Duration::from_millis(self.input.scroll_quiet_ms),
            smoothing: self.input.scroll_smoothing,
            distance_factor: self.input.scroll_distance_factor,
            ms_per_px: self.input.swipe_ms_per_px,
            min_duration_ms: self.input.swipe_min_ms,
            max_duration_ms: self.input.swipe_max_ms,
        }
    }
}

// ── File access ───────────────────────────────────────────────────────────────

/// Returns the platform-specific configuration directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `explicit`, or from the default location.
///
/// A missing file at the default location yields `AppConfig::default()`; a
/// missing explicit file is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors, [`ConfigError::Parse`]
/// if the TOML is malformed and [`ConfigError::Invalid`] for out-of-range
/// values.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (config_file_path()?, false),
    };

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => AppConfig::default(),
        Err(e) => return Err(ConfigError::Io { path, source: e }),
    };
    config.validate()?;
    Ok(config)
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MirrorLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("mirrorlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MirrorLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("mirror_test_{}", Uuid::new_v4()))
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.stream.port, 27183);
        assert_eq!(cfg.stream.ingress, IngressMode::Packetized);
        assert_eq!(cfg.session.fallback_timeout_ms, 5_000);
        assert_eq!(cfg.input.move_throttle_ms, 50);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_section_overrides_defaults() {
        // Arrange
        let toml_str = r#"
            [stream]
            port = 30000
            ingress = "annexb"
            alignment = "aligned"

            [input]
            scroll_smoothing = 0.5
        "#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();

        // Assert
        assert_eq!(cfg.stream.port, 30000);
        assert_eq!(cfg.stream.host, "127.0.0.1");
        assert_eq!(cfg.stream.ingress, IngressMode::AnnexB);
        assert_eq!(cfg.input.scroll_smoothing, 0.5);
        assert_eq!(cfg.input.move_throttle_ms, 50);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, _> = toml::from_str("[stream\nport = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_smoothing() {
        let mut cfg = AppConfig::default();
        cfg.input.scroll_smoothing = 1.5;

        let err = cfg.validate().unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "input.scroll_smoothing", .. }));
    }

    #[test]
    fn test_validate_rejects_annexb_for_av1() {
        let mut cfg = AppConfig::default();
        cfg.stream.ingress = IngressMode::AnnexB;
        cfg.stream.codec = VideoCodec::Av1;

        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_annexb_ingress_disables_frame_meta() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.stream.ingress = IngressMode::AnnexB;
        cfg.stream.alignment = ChunkAlignment::Aligned;

        // Act
        let header = cfg.header_options();
        let reassembler = cfg.reassembler_config();

        // Assert
        assert!(!header.send_frame_meta);
        assert_eq!(
            reassembler.mode,
            ReassemblyMode::AnnexB {
                alignment: ChunkAlignment::Aligned
            }
        );
    }

    #[test]
    fn test_session_config_converts_milliseconds() {
        let cfg = AppConfig::default();
        let session = cfg.session_config();

        assert_eq!(session.fallback_timeout, Duration::from_secs(5));
        assert_eq!(session.reconnect_max, Duration::from_secs(10));
        assert_eq!(session.reassembler.mode, ReassemblyMode::Packetized);
    }

    #[test]
    fn test_server_config_forwards_the_stream_port() {
        // Arrange
        let toml_str = r#"
            [stream]
            port = 30000
            send_dummy_byte = false

            [server]
            jar = "/opt/scrcpy/scrcpy-server"
            max_fps = 30
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();

        // Act
        let server = cfg.server_config();
        let transport = cfg.transport_config();

        // Assert
        assert!(cfg.server.enabled);
        assert_eq!(server.local_port, 30000);
        assert_eq!(server.jar, PathBuf::from("/opt/scrcpy/scrcpy-server"));
        assert_eq!(server.max_fps, 30);
        assert_eq!(server.max_size, 1280);
        assert!(!server.header.send_dummy_byte);
        assert_eq!(server.launch_attempts, 3);
        assert_eq!(transport.connect_attempts, 5);
        assert_eq!(transport.connect_retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_zero_connect_attempts() {
        let mut cfg = AppConfig::default();
        cfg.stream.connect_attempts = 0;

        let err = cfg.validate().unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "stream.connect_attempts", .. }));
    }

    #[test]
    fn test_load_config_missing_explicit_file_is_an_error() {
        let path = temp_dir().join("config.toml");

        let result = load_config(Some(&path));

        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.stream.port = 12345;
        cfg.adb.device = Some("emulator-5554".to_string());
        cfg.log.level = "debug".to_string();

        // Act
        save_config(&cfg, &path).unwrap();
        let loaded = load_config(Some(&path)).unwrap();

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
    }
}
