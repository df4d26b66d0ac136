use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON file holding every recorded project
    pub store_path: PathBuf,
    pub playback: PlaybackConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between replayed frames
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Quiet period before a changed project is written
    pub debounce_ms: u64,
    /// Replay short typing bursts one character at a time
    pub interpolate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: Self::expand_path(Path::new("~/.local/share/screencast/projects.json"))
                .unwrap_or_else(|| PathBuf::from("projects.json")),
            playback: PlaybackConfig::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 80,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            interpolate: true,
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl RecordingConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Expand shell variables and tilde in the loaded store path
        config.store_path = Self::expand_path(&config.store_path).unwrap_or(config.store_path);

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// [`Self::load`], falling back to defaults when there is no file
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/screencast");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let config_path = Config::config_path();
        let path_str = config_path.to_string_lossy();

        // Should not contain tilde anymore
        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/screencast/config.toml"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert!(!config.store_path.to_string_lossy().starts_with('~'));
        assert!(config.store_path.ends_with(".local/share/screencast/projects.json"));
        assert_eq!(config.playback.tick_interval(), Duration::from_millis(80));
        assert_eq!(config.recording.debounce_window(), Duration::from_millis(500));
        assert!(config.recording.interpolate);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "store_path = \"/data/projects.json\"\n\n[playback]\ntick_interval_ms = 20\n",
        )
        .unwrap();

        let config = Config::load_from_path(&config_path).unwrap().unwrap();

        assert_eq!(config.store_path, PathBuf::from("/data/projects.json"));
        assert_eq!(config.playback.tick_interval_ms, 20);
        assert_eq!(config.recording, RecordingConfig::default());
    }

    #[test]
    fn test_expand_path_with_env_var() {
        unsafe {
            env::set_var("SCREENCAST_TEST_DIR", "/test/env/path");
        }

        let path = PathBuf::from("$SCREENCAST_TEST_DIR/projects.json");
        let expanded = Config::expand_path(&path);

        assert_eq!(expanded, Some(PathBuf::from("/test/env/path/projects.json")));

        unsafe {
            env::remove_var("SCREENCAST_TEST_DIR");
        }
    }

    #[test]
    fn test_expand_path_with_undefined_var() {
        let path = PathBuf::from("$SCREENCAST_SURELY_UNDEFINED/x");
        assert_eq!(Config::expand_path(&path), None);
    }

    #[test]
    fn test_load_from_nonexistent_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let result = Config::load_from_path(&config_path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_invalid_toml_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[playback\ntick_interval_ms = ").unwrap();

        let error = Config::load_from_path(&config_path).unwrap_err();

        match error {
            ConfigError::ConfigParseError {
                config_path: path, ..
            } => assert_eq!(path, config_path),
            other => panic!("expected ConfigParseError, got {other:?}"),
        }
    }
}
