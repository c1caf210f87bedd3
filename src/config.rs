//! # Configuration Module
//!
//! Data directory discovery and the engine's tunables.
//!
//! ## Data Storage
//!
//! Cadence keeps its store and config file in the platform data directory:
//! - Linux: `~/.local/share/cadence/`
//! - macOS: `~/Library/Application Support/cadence/`
//! - Windows: `%APPDATA%\cadence\`
//!
//! ## Config File
//!
//! `config.json` holds an [`EngineConfig`]. Every field has a default, so a
//! partial file is merged over the defaults and a missing file means
//! "all defaults".

use crate::algorithm::TASTE_ALGORITHM_ID;
use crate::features::DEFAULT_FEATURE_CACHE_CAPACITY;
use crate::preferences::DEFAULT_MAX_LISTENS;
use crate::queue::QueueConfig;
use crate::scoring::DEFAULT_SCORE_CACHE_CAPACITY;
use crate::taste::TasteConfig;
use crate::training::DatasetOptions;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "cadence";
const STORE_FILE: &str = "cadence.db";
const CONFIG_FILE: &str = "config.json";

/// Returns the platform data directory for Cadence, creating it if needed.
///
/// # Errors
///
/// Returns an error if the system data directory cannot be determined or the
/// `cadence` subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!("Could not determine system data directory. Please ensure your platform supports standard data directories.")
    })?;

    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create Cadence data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Path of the SQLite key-value store.
///
/// # Errors
///
/// Returns an error if the data directory is unavailable.
pub fn get_store_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(STORE_FILE))
}

/// Path of `config.json`.
///
/// # Errors
///
/// Returns an error if the data directory is unavailable.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(CONFIG_FILE))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Let `tick` start runs on its own.
    pub auto_train: bool,
    pub interval_ms: i64,
    pub min_new_samples: usize,
    pub dataset: DatasetOptions,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            auto_train: true,
            interval_ms: 6 * 60 * 60 * 1000,
            min_new_samples: 20,
            dataset: DatasetOptions::default(),
        }
    }
}

/// All engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub taste: TasteConfig,
    pub queue: QueueConfig,
    pub training: TrainingConfig,
    pub score_cache_capacity: usize,
    pub feature_cache_capacity: usize,
    pub max_listen_records: usize,
    /// Algorithm made active at startup if it is registered.
    pub default_algorithm: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            taste: TasteConfig::default(),
            queue: QueueConfig::default(),
            training: TrainingConfig::default(),
            score_cache_capacity: DEFAULT_SCORE_CACHE_CAPACITY,
            feature_cache_capacity: DEFAULT_FEATURE_CACHE_CAPACITY,
            max_listen_records: DEFAULT_MAX_LISTENS,
            default_algorithm: Some(TASTE_ALGORITHM_ID.to_string()),
        }
    }
}

impl EngineConfig {
    /// Read `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Like [`Self::load`], but falls back to defaults with a warning.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("{e:#}; using default configuration");
            Self::default()
        })
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Set a dotted key such as `queue.max_same_artist` from its textual value.
    ///
    /// The value is parsed as JSON first (`3`, `true`, `"manual"`) and taken
    /// as a plain string otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys or values of the wrong type.
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut tree = serde_json::to_value(&*self).context("Failed to serialize config")?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let mut node = &mut tree;
        for part in key.split('.') {
            node = node
                .as_object_mut()
                .and_then(|map| map.get_mut(part))
                .with_context(|| format!("Unknown config key `{key}`"))?;
        }
        *node = value;

        *self = serde_json::from_value(tree).with_context(|| format!("Invalid value `{raw}` for `{key}`"))?;
        Ok(())
    }

    /// Value at a dotted key, for display.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let tree = serde_json::to_value(self).ok()?;
        key.split('.')
            .try_fold(&tree, |node, part| node.get(part))
            .cloned()
    }
}

/// Where the running binary keeps its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub store_path: PathBuf,
    pub config_path: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store_path: get_store_path().unwrap_or_else(|_| PathBuf::from(STORE_FILE)),
            config_path: get_config_path().unwrap_or_else(|_| PathBuf::from(CONFIG_FILE)),
        }
    }
}

impl RuntimeConfig {
    /// # Errors
    ///
    /// Returns an error if the data directory is unavailable.
    pub fn new() -> Result<Self> {
        Ok(Self {
            store_path: get_store_path()?,
            config_path: get_config_path()?,
        })
    }

    /// Explicit locations, typically from CLI flags.
    #[must_use]
    pub fn with_paths(store_path: PathBuf, config_path: PathBuf) -> Self {
        Self { store_path, config_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueMode;
    use tempfile::TempDir;

    #[test]
    fn test_get_data_dir_is_created() {
        let dir = get_data_dir().expect("Data dir should resolve");
        assert!(dir.exists() && dir.is_dir());
        assert_eq!(dir.file_name().expect("Named directory"), APP_DIR);
        assert!(dir.is_absolute(), "Data dir should be absolute");
    }

    #[test]
    fn test_store_path_structure() {
        let path = get_store_path().expect("Store path should resolve");
        assert!(path.to_string_lossy().ends_with(STORE_FILE));
        assert_eq!(get_store_path().expect("Second call"), path, "Consistent results");
    }

    #[test]
    fn test_partial_config_merges_over_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"queue": {"max_same_artist": 1}, "score_cache_capacity": 50}"#)?;

        let config = EngineConfig::load(&path)?;
        assert_eq!(config.queue.max_same_artist, 1);
        assert_eq!(config.queue.replenish_count, 10);
        assert_eq!(config.score_cache_capacity, 50);
        assert_eq!(config.taste, TasteConfig::default());
        Ok(())
    }

    #[test]
    fn test_missing_and_corrupt_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let missing = temp_dir.path().join("missing.json");
        assert_eq!(EngineConfig::load(&missing)?, EngineConfig::default());

        let corrupt = temp_dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ nope")?;
        assert!(EngineConfig::load(&corrupt).is_err());
        assert_eq!(EngineConfig::load_or_default(&corrupt), EngineConfig::default());
        Ok(())
    }

    #[test]
    fn test_set_value_by_dotted_key() -> Result<()> {
        let mut config = EngineConfig::default();
        config.set_value("queue.mode", "manual")?;
        config.set_value("taste.half_life_days", "14")?;
        config.set_value("training.auto_train", "false")?;
        assert_eq!(config.queue.mode, QueueMode::Manual);
        assert!((config.taste.half_life_days - 14.0).abs() < f64::EPSILON);
        assert!(!config.training.auto_train);
        assert_eq!(config.get_value("queue.mode"), Some(Value::String("manual".into())));

        assert!(config.set_value("queue.nonsense", "1").is_err());
        assert!(config.set_value("queue.max_same_artist", "lots").is_err());
        assert_eq!(config.queue.max_same_artist, 2, "Failed set leaves config unchanged");
        Ok(())
    }

    #[test]
    fn test_save_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.json");
        let mut config = EngineConfig::default();
        config.default_algorithm = None;
        config.save(&path)?;
        assert_eq!(EngineConfig::load(&path)?, config);
        Ok(())
    }
}
