use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub local_index: LocalIndexConfig,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub bandwidth: BandwidthConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL clients use to reach this server. Local stream URLs are
    /// built from it.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Directory holding the database. Defaults to the config file's
    /// directory, or the working directory when there is no config file.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LocalIndexConfig {
    #[serde(default)]
    pub libraries: Vec<LibraryConfig>,

    /// Best local candidate must score at least this on the audio ranker.
    #[serde(default)]
    pub min_audio_score: i32,
}

/// A named directory tree of media files, served under `/media/{name}/`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LibraryConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    2
}
fn default_max_poll_attempts() -> u32 {
    150
}
fn default_max_transient_retries() -> u32 {
    3
}
fn default_request_timeout() -> u64 {
    15
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            poll_interval_secs: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            max_transient_retries: default_max_transient_retries(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl CloudConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_hours() -> u64 {
    48
}
fn default_sweep_interval() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Jobs older than this are reaped regardless of status.
    #[serde(default = "default_job_max_age")]
    pub max_age_secs: u64,

    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

fn default_job_max_age() -> u64 {
    300
}
fn default_reap_interval() -> u64 {
    300
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_job_max_age(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BandwidthConfig {
    #[serde(default = "default_min_reliable_duration")]
    pub min_reliable_duration_ms: u64,

    #[serde(default = "default_min_reliable_bytes")]
    pub min_reliable_bytes: u64,

    #[serde(default = "default_retest_after")]
    pub retest_after_hours: u64,

    #[serde(default = "default_stale_after")]
    pub stale_after_hours: u64,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// A reliable sample below this fraction of the earlier mean suggests a retest.
    #[serde(default = "default_drop_ratio")]
    pub drop_ratio: f64,
}

fn default_min_reliable_duration() -> u64 {
    2000
}
fn default_min_reliable_bytes() -> u64 {
    256 * 1024
}
fn default_retest_after() -> u64 {
    6
}
fn default_stale_after() -> u64 {
    24
}
fn default_history_size() -> usize {
    10
}
fn default_drop_ratio() -> f64 {
    0.5
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            min_reliable_duration_ms: default_min_reliable_duration(),
            min_reliable_bytes: default_min_reliable_bytes(),
            retest_after_hours: default_retest_after(),
            stale_after_hours: default_stale_after(),
            history_size: default_history_size(),
            drop_ratio: default_drop_ratio(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_low_threshold")]
    pub low_threshold: usize,

    #[serde(default = "default_consecutive_threshold")]
    pub consecutive_threshold: usize,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_test_duration")]
    pub test_duration_secs: u64,
}

fn default_low_threshold() -> usize {
    3
}
fn default_consecutive_threshold() -> usize {
    2
}
fn default_window_ms() -> u64 {
    30_000
}
fn default_test_duration() -> u64 {
    5
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            low_threshold: default_low_threshold(),
            consecutive_threshold: default_consecutive_threshold(),
            window_ms: default_window_ms(),
            test_duration_secs: default_test_duration(),
        }
    }
}
