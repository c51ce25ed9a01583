//! Runner configuration. Values come from an optional TOML file; command line flags override them.

use std::error::Error;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wall-clock speed multiplier. Only the reported pacing changes.
    pub speed: f32,
    /// Audio samples per emulated second. Zero disables audio.
    pub sample_rate: u32,
    /// The number of rewind snapshots kept. Zero disables rewinding.
    pub rewind_slots: usize,
    /// Frames between two rewind snapshots.
    pub snapshot_interval: u64,
    /// One of `off`, `error`, `warn`, `info`, `debug` or `trace`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            speed: 1.0,
            sample_rate: 44_100,
            rewind_slots: 64,
            snapshot_interval: 10,
            log_level: "info".to_owned(),
        }
    }
}

impl Config {
    /// Reads the config at `path`, or the defaults when there is no path.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        match path {
            Some(path) => Ok(toml::from_str(&std::fs::read_to_string(path)?)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn level(&self) -> Result<LevelFilter, Box<dyn Error>> {
        Ok(LevelFilter::from_str(&self.log_level)?)
    }
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::Config;

    #[test]
    fn partial_files_keep_defaults() {
        let config: Config = toml::from_str("speed = 2.0\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.speed, 2.0);
        assert_eq!(config.rewind_slots, 64);
        assert_eq!(config.level().unwrap(), LevelFilter::DEBUG);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config {
            sample_rate: 0,
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("wisp-config-{}.toml", std::process::id()));
        let config = Config {
            speed: 0.5,
            rewind_slots: 8,
            ..Config::default()
        };
        config.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn rejects_unknown_levels() {
        let config = Config {
            log_level: "loud".to_owned(),
            ..Config::default()
        };
        assert!(config.level().is_err());
    }
}
