//! RunBlueprint - Config Loader 输出
//!
//! 描述一次完整运行的配置：采集序列、照明控制器、相机、远端设备、同步与后处理。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{CfaPattern, Channel, Exposure, Rgb};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的运行配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 采集序列
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// 照明控制器连接
    #[serde(default)]
    pub illumination: IlluminationConfig,

    /// 相机参数
    #[serde(default)]
    pub camera: CameraConfig,

    /// 远端设备
    #[serde(default)]
    pub remote: RemoteConfig,

    /// 主机侧同步
    #[serde(default)]
    pub sync: SyncConfig,

    /// 批处理
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl RunBlueprint {
    /// Number of artifacts a complete dataset contains
    pub fn expected_artifacts(&self) -> usize {
        self.acquisition.positions as usize * self.acquisition.exposures.len()
    }
}

/// 采集序列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Number of illumination positions, visited in order `0..positions`
    #[serde(default = "default_positions")]
    pub positions: u32,

    /// Exposure durations in microseconds, captured in this order for every position
    #[serde(default = "default_exposures")]
    pub exposures: Vec<Exposure>,

    /// Color used for the active position
    #[serde(default = "default_color")]
    pub color: Rgb,

    /// Directory the device writes artifacts into
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Delete stale files from `artifact_dir` before the first capture
    #[serde(default = "default_true")]
    pub clean_artifact_dir: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            positions: default_positions(),
            exposures: default_exposures(),
            color: default_color(),
            artifact_dir: default_artifact_dir(),
            clean_artifact_dir: true,
        }
    }
}

fn default_positions() -> u32 {
    64
}

fn default_exposures() -> Vec<Exposure> {
    [1_000, 5_000, 10_000, 50_000, 100_000]
        .into_iter()
        .filter_map(Exposure::from_micros)
        .collect()
}

fn default_color() -> Rgb {
    Rgb::RED
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("/var/www/fpm_data")
}

fn default_true() -> bool {
    true
}

/// 照明控制器配置（消息代理 + 重发/停滞策略）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IlluminationConfig {
    /// Message broker host
    #[serde(default = "default_broker_host")]
    pub broker_host: String,

    /// Message broker port
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    /// Client id presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// First topic segment
    #[serde(default = "default_setup_id")]
    pub setup_id: String,

    /// Second topic segment
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Interval between checks of the inbound status stream
    #[serde(default = "default_ack_poll_ms")]
    pub ack_poll_ms: u64,

    /// Upper bound on re-publishes of one command (Busy → Ready cycles)
    #[serde(default = "default_max_resends")]
    pub max_resends: u32,

    /// Give up when no status message arrives for this long; 0 disables
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Wait after CLEAR, which the controller does not acknowledge
    #[serde(default = "default_clear_settle_ms")]
    pub clear_settle_ms: u64,
}

impl Default for IlluminationConfig {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            client_id: default_client_id(),
            setup_id: default_setup_id(),
            device_id: default_device_id(),
            ack_poll_ms: default_ack_poll_ms(),
            max_resends: default_max_resends(),
            stall_timeout_ms: default_stall_timeout_ms(),
            clear_settle_ms: default_clear_settle_ms(),
        }
    }
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "fpm-acquisition".to_string()
}

fn default_setup_id() -> String {
    "FPMSCOPE".to_string()
}

fn default_device_id() -> String {
    "LEDMATRIX".to_string()
}

fn default_ack_poll_ms() -> u64 {
    100
}

fn default_max_resends() -> u32 {
    10
}

fn default_stall_timeout_ms() -> u64 {
    30_000
}

fn default_clear_settle_ms() -> u64 {
    2_000
}

/// 相机配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Sensor width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Sensor height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Significant bits per raw sample
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u8,

    /// CFA layout of the sensor
    #[serde(default)]
    pub pattern: CfaPattern,

    /// Fixed analog gain
    #[serde(default = "default_gain")]
    pub analog_gain: f32,

    /// Fixed digital gain
    #[serde(default = "default_gain")]
    pub digital_gain: f32,

    /// External capture command (`{exposure_us}` and `{output}` are substituted);
    /// the synthetic camera is used when unset
    #[serde(default)]
    pub capture_command: Option<String>,

    /// Device check run when the camera is opened; a failure mentioning
    /// "busy" means another process owns the sensor
    #[serde(default)]
    pub probe_command: Option<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            bit_depth: default_bit_depth(),
            pattern: CfaPattern::default(),
            analog_gain: default_gain(),
            digital_gain: default_gain(),
            capture_command: None,
            probe_command: None,
        }
    }
}

fn default_width() -> u32 {
    4056
}

fn default_height() -> u32 {
    3040
}

fn default_bit_depth() -> u8 {
    12
}

fn default_gain() -> f32 {
    1.0
}

/// 远端设备配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Device host name or address
    #[serde(default = "default_remote_host")]
    pub host: String,

    /// Login user
    #[serde(default = "default_user")]
    pub user: String,

    /// Private key used by the command channel (agent/default keys when unset)
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Command that starts the acquisition run on the device
    #[serde(default = "default_launch_command")]
    pub launch_command: String,

    /// Artifact directory on the device, cleared before every run
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Path of the artifact directory on the device's HTTP server
    #[serde(default = "default_http_path")]
    pub http_path: String,

    /// Device HTTP port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Start a new run; when false an existing dataset is synchronized
    #[serde(default = "default_true")]
    pub trigger_run: bool,

    /// Delay between starting the run and the first listing poll
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Delay between listing polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_remote_host(),
            user: default_user(),
            identity_file: None,
            ssh_port: default_ssh_port(),
            launch_command: default_launch_command(),
            artifact_dir: default_artifact_dir(),
            http_path: default_http_path(),
            http_port: default_http_port(),
            trigger_run: true,
            startup_delay_ms: default_startup_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RemoteConfig {
    /// Base URL of the artifact listing
    pub fn listing_url(&self) -> String {
        let path = self.http_path.trim_matches('/');
        if self.http_port == 80 {
            format!("http://{}/{}/", self.host, path)
        } else {
            format!("http://{}:{}/{}/", self.host, self.http_port, path)
        }
    }
}

fn default_remote_host() -> String {
    "fpmscope.local".to_string()
}

fn default_user() -> String {
    "pi".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_launch_command() -> String {
    "fpm-sync acquire".to_string()
}

fn default_http_path() -> String {
    "fpm_data".to_string()
}

fn default_http_port() -> u16 {
    80
}

fn default_startup_delay_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

/// 主机侧同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local dataset directory (normalized images land here)
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Delete files left in `local_dir` by a previous sync before downloading
    #[serde(default = "default_true")]
    pub clean_local_dir: bool,

    /// Floor-and-subtract the dark level from every sample
    #[serde(default = "default_true")]
    pub remove_dark_level: bool,

    /// Dark level in raw counts
    #[serde(default = "default_dark_level")]
    pub dark_level: u16,

    /// Minimum available memory before another worker is admitted
    #[serde(default = "default_sync_memory_threshold")]
    pub memory_threshold_bytes: u64,

    /// Re-check interval while below the memory threshold
    #[serde(default = "default_memory_recheck_ms")]
    pub memory_recheck_ms: u64,

    /// Maximum concurrently running download workers
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Per-request HTTP timeout
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            clean_local_dir: true,
            remove_dark_level: true,
            dark_level: default_dark_level(),
            memory_threshold_bytes: default_sync_memory_threshold(),
            memory_recheck_ms: default_memory_recheck_ms(),
            max_in_flight: default_max_in_flight(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("fpm_data")
}

fn default_dark_level() -> u16 {
    256
}

fn default_sync_memory_threshold() -> u64 {
    512 * 1024 * 1024
}

fn default_memory_recheck_ms() -> u64 {
    1_000
}

fn default_max_in_flight() -> usize {
    16
}

fn default_http_timeout_secs() -> u64 {
    30
}

/// 批处理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Dataset to process (defaults to `sync.local_dir`)
    #[serde(default)]
    pub input_dir: Option<PathBuf>,

    /// Output directory for processed images
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Positions loaded and processed together
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Fuse every burst into an HDR image; otherwise select one exposure
    #[serde(default = "default_true")]
    pub fusion: bool,

    /// Position whose burst calibrates the response curve
    #[serde(default = "default_reference_position")]
    pub reference_position: u32,

    /// Exposure index selected when fusion is disabled
    #[serde(default)]
    pub exposure_chosen_idx: usize,

    /// Only produce this channel (all three when unset)
    #[serde(default)]
    pub channel: Option<Channel>,

    /// Minimum available memory before another image is loaded
    #[serde(default = "default_processing_memory_threshold")]
    pub memory_threshold_bytes: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: default_output_dir(),
            chunk_size: default_chunk_size(),
            fusion: true,
            reference_position: default_reference_position(),
            exposure_chosen_idx: 0,
            channel: None,
            memory_threshold_bytes: default_processing_memory_threshold(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("fpm_processed")
}

fn default_chunk_size() -> usize {
    22
}

fn default_reference_position() -> u32 {
    31
}

fn default_processing_memory_threshold() -> u64 {
    8_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_constants() {
        let bp = RunBlueprint::default();
        assert_eq!(bp.acquisition.positions, 64);
        let micros: Vec<u32> = bp.acquisition.exposures.iter().map(|e| e.micros()).collect();
        assert_eq!(micros, vec![1_000, 5_000, 10_000, 50_000, 100_000]);
        assert_eq!(bp.acquisition.color, Rgb::RED);
        assert_eq!(bp.sync.dark_level, 256);
        assert_eq!(bp.processing.chunk_size, 22);
        assert_eq!(bp.expected_artifacts(), 320);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let bp: RunBlueprint = serde_json::from_str("{}").unwrap();
        assert_eq!(bp.version, ConfigVersion::V1);
        assert_eq!(bp.illumination.max_resends, 10);
        assert_eq!(bp.camera.pattern, CfaPattern::Bggr);
        assert!(bp.remote.trigger_run);
    }

    #[test]
    fn test_listing_url() {
        let mut remote = RemoteConfig {
            host: "10.0.0.5".to_string(),
            ..RemoteConfig::default()
        };
        assert_eq!(remote.listing_url(), "http://10.0.0.5/fpm_data/");

        remote.http_port = 8080;
        remote.http_path = "/data/".to_string();
        assert_eq!(remote.listing_url(), "http://10.0.0.5:8080/data/");
    }
}
