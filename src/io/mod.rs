pub mod config_io;
pub mod file_store;
pub mod lock;

pub use config_io::{ConfigError, LoadedConfig, load_config};
pub use file_store::{JsonFileStore, StoreError};
pub use lock::{FileLock, LockError};
