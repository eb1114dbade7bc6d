use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Remote catalog endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Path under `host` serving both the manifest and the files.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_username")]
    pub username: String,
    /// Properties file providing `BASIC_AUTH_PASS`.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Local mirror of the catalog, laid out by manifest path.
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
    /// Last-known manifest, read before any network call.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
    /// Looping tuning noise for the static channel.
    #[serde(default = "default_static_sound")]
    pub static_sound: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Dial polling period. 100 ms is 10 Hz.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Check for the end of the current track every N polls.
    #[serde(default = "default_track_check_every")]
    pub track_check_every: u32,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Back-off after a sync whose remote fetch failed.
    #[serde(default = "default_sync_retry_secs")]
    pub sync_retry_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StationChoice {
    /// Pick a random station from the bucket on every tune.
    #[default]
    Reroll,
    /// Remember the first pick per frequency until the index changes.
    Pinned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Static volume change applied per fade step (per poll).
    #[serde(default = "default_fade_step")]
    pub fade_step: f32,
    /// Residual static level while tuned next to a station.
    #[serde(default = "default_nearby_static_volume")]
    pub nearby_static_volume: f32,
    #[serde(default)]
    pub station_choice: StationChoice,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_path: default_base_path(),
            username: default_username(),
            credentials_file: default_credentials_file(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            manifest_file: default_manifest_file(),
            static_sound: default_static_sound(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            track_check_every: default_track_check_every(),
            sync_interval_secs: default_sync_interval_secs(),
            sync_retry_secs: default_sync_retry_secs(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fade_step: default_fade_step(),
            nearby_static_volume: default_nearby_static_volume(),
            station_choice: StationChoice::default(),
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn sync_retry(&self) -> Duration {
        Duration::from_secs(self.sync_retry_secs)
    }
}

fn default_host() -> String {
    "https://francoise.fm".to_string()
}

fn default_base_path() -> String {
    "audio/radio".to_string()
}

fn default_username() -> String {
    "Melville".to_string()
}

fn default_credentials_file() -> PathBuf {
    platform::config_dir().join("server.properties")
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_recordings_dir() -> PathBuf {
    platform::data_dir().join("recordings")
}

fn default_manifest_file() -> PathBuf {
    platform::data_dir().join("stations.json")
}

fn default_static_sound() -> PathBuf {
    platform::data_dir().join("sound").join("radiotuning.ogg")
}

fn default_log_dir() -> PathBuf {
    platform::data_dir()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_track_check_every() -> u32 {
    10
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_sync_retry_secs() -> u64 {
    10
}

fn default_fade_step() -> f32 {
    0.1
}

fn default_nearby_static_volume() -> f32 {
    0.1
}

impl Config {
    /// Load from `path`, writing the defaults there first if it does not
    /// exist yet.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.remote.host, "https://francoise.fm");
        assert_eq!(config.remote.base_path, "audio/radio");
        assert_eq!(config.timing.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.timing.track_check_every, 10);
        assert_eq!(config.timing.sync_retry(), Duration::from_secs(10));
        assert_eq!(config.playback.station_choice, StationChoice::Reroll);
        assert!((config.playback.nearby_static_volume - 0.1).abs() < f32::EPSILON);
        assert!(config.paths.manifest_file.ends_with("dialfm/stations.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [remote]
            host = "http://localhost:9090"

            [playback]
            station_choice = "pinned"
            fade_step = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.remote.host, "http://localhost:9090");
        assert_eq!(config.remote.username, "Melville");
        assert_eq!(config.playback.station_choice, StationChoice::Pinned);
        assert_eq!(config.timing.sync_interval_secs, 300);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cfg").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        let again = Config::load_from(&path).unwrap();
        assert_eq!(again.remote.host, config.remote.host);
        assert_eq!(again.paths.recordings_dir, config.paths.recordings_dir);
    }
}
