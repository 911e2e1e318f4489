//! Configuration schema for the sink, loaded from a TOML file with
//! `#[serde(default)]` fallbacks for every field so a missing/partial file
//! still produces a usable config (mirrors the original's `settings.ini`
//! section layout: `[network]`, `[p2p]`, `[player]`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub p2p: P2pConfig,
    #[serde(default)]
    pub capability: CapabilityConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            network: NetworkConfig::default(),
            p2p: P2pConfig::default(),
            capability: CapabilityConfig::default(),
            player: PlayerConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl SinkConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Validate configuration semantics, returning issues prefixed
    /// `ERROR:` (fatal) or `WARNING:` (advisory). Mirrors the teacher's
    /// `BeamConfig::validate`.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.network.rtsp_port == 0 {
            issues.push("ERROR: network.rtsp_port must be nonzero".to_string());
        }
        if self.network.rtp_port == 0 {
            issues.push("ERROR: network.rtp_port must be nonzero".to_string());
        }
        if self.network.rtsp_port == self.network.rtp_port {
            issues.push("ERROR: network.rtsp_port and network.rtp_port must differ".to_string());
        }
        if self.network.peer_address.parse::<std::net::Ipv4Addr>().is_err() {
            issues.push(format!("ERROR: network.peer_address '{}' is not a valid IPv4 address", self.network.peer_address));
        }
        if self.p2p.pin.len() != 8 || !self.p2p.pin.chars().all(|c| c.is_ascii_digit()) {
            issues.push(format!("WARNING: p2p.pin '{}' is not an 8-digit WPS PIN", self.p2p.pin));
        }
        if self.supervisor.connect_max_attempts == 0 {
            issues.push("WARNING: supervisor.connect_max_attempts is 0, Connector will fail immediately".to_string());
        }
        if self.supervisor.watchdog_threshold_secs == 0 {
            issues.push("WARNING: supervisor.watchdog_threshold_secs is 0, sessions will never idle out gracefully".to_string());
        }

        issues
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_my_address")]
    pub my_address: String,
    #[serde(default = "default_peer_address")]
    pub peer_address: String,
    #[serde(default = "default_netmask")]
    pub netmask: String,
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,
    #[serde(default = "default_rtp_port")]
    pub rtp_port: u16,
    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            my_address: default_my_address(),
            peer_address: default_peer_address(),
            netmask: default_netmask(),
            rtsp_port: default_rtsp_port(),
            rtp_port: default_rtp_port(),
            lease_timeout_secs: default_lease_timeout_secs(),
        }
    }
}

fn default_my_address() -> String {
    "192.168.173.1".to_string()
}
fn default_peer_address() -> String {
    "192.168.173.80".to_string()
}
fn default_netmask() -> String {
    "255.255.255.0".to_string()
}
fn default_rtsp_port() -> u16 {
    7236
}
fn default_rtp_port() -> u16 {
    1028
}
fn default_lease_timeout_secs() -> u32 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2pConfig {
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_device_type")]
    pub device_type: String,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_pin")]
    pub pin: String,
    #[serde(default = "default_wps_timeout_secs")]
    pub wps_timeout_secs: u32,
    #[serde(default)]
    pub recreate_group: bool,
}

impl Default for P2pConfig {
    fn default() -> Self {
        P2pConfig {
            device_name: default_device_name(),
            device_type: default_device_type(),
            group_name: default_group_name(),
            pin: default_pin(),
            wps_timeout_secs: default_wps_timeout_secs(),
            recreate_group: false,
        }
    }
}

fn default_device_name() -> String {
    "wfd-sink".to_string()
}
fn default_device_type() -> String {
    "7-0050F204-1".to_string()
}
fn default_group_name() -> String {
    "persistent".to_string()
}
fn default_pin() -> String {
    "12345678".to_string()
}
fn default_wps_timeout_secs() -> u32 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Index into the CEA bitmap of the platform's currently-active mode.
    #[serde(default = "default_native_resolution")]
    pub native_resolution: u8,
    #[serde(default)]
    pub preferred_mode: bool,
    /// Constrained High Profile (0x02) | Constrained Baseline Profile (0x01).
    #[serde(default = "default_h264_profile")]
    pub h264_profile: u8,
    /// H.264 level 3.2 (720p60) by default.
    #[serde(default = "default_h264_level")]
    pub h264_level: u8,
    #[serde(default = "default_audio_codecs")]
    pub audio_codecs: String,
    #[serde(default = "default_rtp_port")]
    pub rtp_port: u16,
    /// Optional command that returns display modes as JSON, e.g.
    /// `tvservice -m CEA -j`. Absent on non-Raspberry-Pi hosts.
    #[serde(default)]
    pub display_probe_command: Option<String>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        CapabilityConfig {
            native_resolution: default_native_resolution(),
            preferred_mode: false,
            h264_profile: default_h264_profile(),
            h264_level: default_h264_level(),
            audio_codecs: default_audio_codecs(),
            rtp_port: default_rtp_port(),
            display_probe_command: None,
        }
    }
}

fn default_native_resolution() -> u8 {
    0x06
}
fn default_h264_profile() -> u8 {
    0x02 | 0x01
}
fn default_h264_level() -> u8 {
    0x02
}
fn default_audio_codecs() -> String {
    "AAC 00000001 00, LPCM 00000002 00".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerBackend {
    Gstreamer,
    Vlc,
    Noop,
}

impl Default for PlayerBackend {
    fn default() -> Self {
        PlayerBackend::Gstreamer
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub backend: PlayerBackend,
    #[serde(default = "default_gst_decoder")]
    pub gst_decoder: String,
    #[serde(default)]
    pub vlc_custom_args: Vec<String>,
    #[serde(default = "default_vlc_log_file")]
    pub vlc_log_file: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            backend: PlayerBackend::default(),
            gst_decoder: default_gst_decoder(),
            vlc_custom_args: Vec::new(),
            vlc_log_file: default_vlc_log_file(),
        }
    }
}

fn default_gst_decoder() -> String {
    "v4l2h264dec".to_string()
}
fn default_vlc_log_file() -> String {
    "/var/log/wfd-sink/vlc.log".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_connect_max_attempts")]
    pub connect_max_attempts: u32,
    #[serde(default = "default_connect_retry_interval_ms")]
    pub connect_retry_interval_ms: u64,
    #[serde(default = "default_connect_backoff_secs")]
    pub connect_backoff_secs: u64,
    #[serde(default = "default_watchdog_threshold_secs")]
    pub watchdog_threshold_secs: u64,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_steady_state_tick_ms")]
    pub steady_state_tick_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            connect_max_attempts: default_connect_max_attempts(),
            connect_retry_interval_ms: default_connect_retry_interval_ms(),
            connect_backoff_secs: default_connect_backoff_secs(),
            watchdog_threshold_secs: default_watchdog_threshold_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            steady_state_tick_ms: default_steady_state_tick_ms(),
        }
    }
}

fn default_connect_max_attempts() -> u32 {
    1200
}
fn default_connect_retry_interval_ms() -> u64 {
    100
}
fn default_connect_backoff_secs() -> u64 {
    30
}
fn default_watchdog_threshold_secs() -> u64 {
    70
}
fn default_handshake_timeout_secs() -> u64 {
    30
}
fn default_steady_state_tick_ms() -> u64 {
    10
}
