use std::fs;
use std::path::{Path, PathBuf};

use crate::model::config::EngineConfig;

pub const CONFIG_FILE: &str = "plantree.toml";

/// Error type for config discovery and parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// A config together with the directory it is anchored to
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    /// Directory containing `plantree.toml`, or the start directory if none was found
    pub root: PathBuf,
    /// The file the config came from, if any
    pub source: Option<PathBuf>,
}

impl LoadedConfig {
    /// Absolute store directory (`[store] dir` resolved against `root`)
    pub fn store_dir(&self) -> PathBuf {
        self.root.join(&self.config.store.dir)
    }
}

/// Walk up from `start` looking for `plantree.toml`
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

pub fn read_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Discover and read the config for `start`. A missing file is not an
/// error: defaults are used, rooted at `start`.
pub fn load_config(start: &Path) -> Result<LoadedConfig, ConfigError> {
    match find_config(start) {
        Some(path) => {
            let config = read_config(&path)?;
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| start.to_path_buf());
            Ok(LoadedConfig {
                config,
                root,
                source: Some(path),
            })
        }
        None => Ok(LoadedConfig {
            config: EngineConfig::default(),
            root: start.to_path_buf(),
            source: None,
        }),
    }
}
