//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section is optional; missing keys take the defaults below.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Number of recent frames the occupancy voter looks at
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Occupied frames within the window required to trigger
    #[serde(default = "default_min_frames_in_zone")]
    pub min_frames_in_zone: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { window_size: default_window_size(), min_frames_in_zone: default_min_frames_in_zone() }
    }
}

fn default_window_size() -> usize {
    10
}

fn default_min_frames_in_zone() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    /// JSON file with zone polygons
    #[serde(default = "default_zones_file")]
    pub file: String,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self { file: default_zones_file() }
    }
}

fn default_zones_file() -> String {
    "config/zones.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the login call (POST <login_url>/login)
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Base URL for the action call (GET <action_url>/play/<id>/<index>)
    #[serde(default = "default_action_url")]
    pub action_url: String,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    /// Action identifier (audio file on the remote player)
    #[serde(default = "default_action_id")]
    pub action_id: String,
    #[serde(default = "default_action_index")]
    pub action_index: u32,
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts per network call (first try included)
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How long a dispatched zone stays locked
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
    /// The remote player ships with a self-signed certificate
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            action_url: default_action_url(),
            username: default_credential(),
            password: default_credential(),
            action_id: default_action_id(),
            action_index: default_action_index(),
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            cooldown_secs: default_cooldown_secs(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

fn default_login_url() -> String {
    "https://31.148.204.230".to_string()
}

fn default_action_url() -> String {
    "https://31.148.204.230:8443".to_string()
}

fn default_credential() -> String {
    "admin".to_string()
}

fn default_action_id() -> String {
    "1.wav".to_string()
}

fn default_action_index() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Upper bound for `api.cooldown_secs` (one day)
const MAX_COOLDOWN_SECS: f64 = 86_400.0;

fn default_cooldown_secs() -> f64 {
    20.0
}

fn default_accept_invalid_certs() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of the dispatch task queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long shutdown waits for the worker before abandoning it
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DebugConfig {
    /// Simulate the remote calls instead of performing network I/O
    #[serde(default = "default_simulation")]
    pub simulation: bool,
    #[serde(default = "default_simulation_delay_ms")]
    pub simulation_delay_ms: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { simulation: default_simulation(), simulation_delay_ms: default_simulation_delay_ms() }
    }
}

fn default_simulation() -> bool {
    true
}

fn default_simulation_delay_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Status HTTP port (0 to disable)
    #[serde(default)]
    pub status_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), status_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    window_size: usize,
    min_frames_in_zone: usize,
    zones_file: String,
    login_url: String,
    action_url: String,
    username: String,
    password: String,
    action_id: String,
    action_index: u32,
    request_timeout: Duration,
    retry_count: u32,
    retry_delay: Duration,
    cooldown: Duration,
    accept_invalid_certs: bool,
    queue_capacity: usize,
    shutdown_timeout: Duration,
    simulation: bool,
    simulation_delay: Duration,
    metrics_interval_secs: u64,
    status_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::build(TomlConfig::default(), "default")
    }
}

impl Config {
    /// Config path used when none is given on the command line:
    /// `CONFIG_FILE` if set, else `config/dev.toml`
    pub fn default_config_path() -> String {
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)?;
        Self::from_toml(toml_config, source)
    }

    fn from_toml(toml_config: TomlConfig, source: &str) -> anyhow::Result<Self> {
        Self::validate(&toml_config)?;
        Ok(Self::build(toml_config, source))
    }

    fn validate(toml_config: &TomlConfig) -> anyhow::Result<()> {
        let TomlConfig { detection, api, dispatch, .. } = toml_config;

        if detection.window_size == 0 {
            bail!("detection.window_size must be at least 1");
        }
        if detection.min_frames_in_zone == 0 {
            bail!("detection.min_frames_in_zone must be at least 1");
        }
        if api.retry_count == 0 {
            bail!("api.retry_count must be at least 1");
        }
        if dispatch.queue_capacity == 0 {
            bail!("dispatch.queue_capacity must be at least 1");
        }
        if !(0.0..=MAX_COOLDOWN_SECS).contains(&api.cooldown_secs) {
            bail!(
                "api.cooldown_secs must be between 0 and {MAX_COOLDOWN_SECS}, got {}",
                api.cooldown_secs
            );
        }
        if detection.min_frames_in_zone > detection.window_size {
            warn!(
                window_size = %detection.window_size,
                min_frames_in_zone = %detection.min_frames_in_zone,
                "min_frames_exceeds_window_trigger_unreachable"
            );
        }
        Ok(())
    }

    fn build(toml_config: TomlConfig, source: &str) -> Self {
        let TomlConfig { detection, zones, api, dispatch, debug, metrics } = toml_config;

        Self {
            window_size: detection.window_size,
            min_frames_in_zone: detection.min_frames_in_zone,
            zones_file: zones.file,
            login_url: api.login_url.trim_end_matches('/').to_string(),
            action_url: api.action_url.trim_end_matches('/').to_string(),
            username: api.username,
            password: api.password,
            action_id: api.action_id,
            action_index: api.action_index,
            request_timeout: Duration::from_millis(api.timeout_ms),
            retry_count: api.retry_count,
            retry_delay: Duration::from_millis(api.retry_delay_ms),
            cooldown: Duration::from_secs_f64(api.cooldown_secs),
            accept_invalid_certs: api.accept_invalid_certs,
            queue_capacity: dispatch.queue_capacity,
            shutdown_timeout: Duration::from_millis(dispatch.shutdown_timeout_ms),
            simulation: debug.simulation,
            simulation_delay: Duration::from_millis(debug.simulation_delay_ms),
            metrics_interval_secs: metrics.interval_secs.max(1),
            status_port: metrics.status_port,
            config_file: source.to_string(),
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn min_frames_in_zone(&self) -> usize {
        self.min_frames_in_zone
    }

    pub fn zones_file(&self) -> &str {
        &self.zones_file
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub fn action_url(&self) -> &str {
        &self.action_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn action_index(&self) -> u32 {
        self.action_index
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn simulation(&self) -> bool {
        self.simulation
    }

    pub fn simulation_delay(&self) -> Duration {
        self.simulation_delay
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn status_port(&self) -> u16 {
        self.status_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Force simulation mode on or off (CLI override)
    pub fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    /// Builder for tests and embedders that point the client at another endpoint
    pub fn with_endpoints(mut self, login_url: &str, action_url: &str) -> Self {
        self.login_url = login_url.trim_end_matches('/').to_string();
        self.action_url = action_url.trim_end_matches('/').to_string();
        self
    }

    /// Builder for the retry policy
    pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Builder for the debounce window
    pub fn with_window(mut self, window_size: usize, min_frames_in_zone: usize) -> Self {
        self.window_size = window_size.max(1);
        self.min_frames_in_zone = min_frames_in_zone;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_simulation_delay(mut self, delay: Duration) -> Self {
        self.simulation_delay = delay;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}
