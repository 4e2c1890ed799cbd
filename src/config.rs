use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::error::{Result, ClipsmithError};

fn default_core_binary() -> String {
    "ffmpeg".to_string()
}

fn default_load_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_exec_timeout_secs() -> u64 {
    600
}

fn default_ready_poll_attempts() -> u32 {
    3
}

fn default_ready_poll_backoff_ms() -> u64 {
    5000
}

fn default_max_input_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_gif_max_width() -> u32 {
    1920
}

fn default_gif_max_duration_secs() -> f64 {
    60.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where engine assets are fetched from.
    /// Empty: resolve `core_binary` on the system PATH.
    /// `http://` / `https://`: download assets into the engine's private directory.
    /// Anything else: a local directory containing the assets.
    #[serde(default)]
    pub core_asset_base: String,
    /// File name of the engine executable under `core_asset_base`
    #[serde(default = "default_core_binary")]
    pub core_binary: String,
    /// Additional files fetched alongside the executable (shared libraries, presets)
    #[serde(default)]
    pub extra_assets: Vec<String>,
    /// Upper bound for the whole load procedure
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    /// Upper bound for a metadata probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Upper bound for a single transform
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
    /// How many times a caller polls an in-flight load before giving up
    #[serde(default = "default_ready_poll_attempts")]
    pub ready_poll_attempts: u32,
    /// First poll interval; doubled after every poll
    #[serde(default = "default_ready_poll_backoff_ms")]
    pub ready_poll_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Inputs larger than this are rejected before touching the engine
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,
    #[serde(default = "default_gif_max_width")]
    pub gif_max_width: u32,
    #[serde(default = "default_gif_max_duration_secs")]
    pub gif_max_duration_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            core_asset_base: String::new(),
            core_binary: default_core_binary(),
            extra_assets: Vec::new(),
            load_timeout_secs: default_load_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            exec_timeout_secs: default_exec_timeout_secs(),
            ready_poll_attempts: default_ready_poll_attempts(),
            ready_poll_backoff_ms: default_ready_poll_backoff_ms(),
        }
    }
}

impl EngineConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn ready_poll_backoff(&self) -> Duration {
        Duration::from_millis(self.ready_poll_backoff_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            gif_max_width: default_gif_max_width(),
            gif_max_duration_secs: default_gif_max_duration_secs(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClipsmithError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ClipsmithError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClipsmithError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClipsmithError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
