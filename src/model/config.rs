use serde::{Deserialize, Serialize};

/// Configuration from plantree.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `<TASK_ID>.json` documents, relative to the config file
    #[serde(default = "default_store_dir")]
    pub dir: String,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            dir: default_store_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

fn default_store_dir() -> String {
    "tasks".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

/// Limits enforced on paths arriving at the store boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_path_depth: default_max_path_depth(),
            max_path_len: default_max_path_len(),
        }
    }
}

fn default_max_path_depth() -> usize {
    24
}

fn default_max_path_len() -> usize {
    128
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Status filter applied by `show` when none is given (ALL, TODO, ACTIVE, DONE)
    #[serde(default = "default_filter")]
    pub default_filter: String,
    /// Titles wider than this are truncated with `…`
    #[serde(default = "default_max_title_width")]
    pub max_title_width: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            default_filter: default_filter(),
            max_title_width: default_max_title_width(),
        }
    }
}

fn default_filter() -> String {
    "ALL".to_string()
}

fn default_max_title_width() -> usize {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// tracing-subscriber EnvFilter directive, used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "plantree=warn".to_string()
}
