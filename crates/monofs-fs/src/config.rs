//! Filesystem configuration, populated from CLI flags by the host
//! process.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the metadata stores.
    pub path: PathBuf,
    /// Directory holding per-file data stores. Defaults to
    /// `<path>/localDataPath` when unset.
    pub local_data_path: Option<PathBuf>,
    /// Exported filesystem name, optionally suffixed `#<snapshot>`.
    pub filesystem_name: String,
    /// Attribute-cache capacity.
    pub cache_size: usize,
    /// Interval of the periodic metadata flush.
    pub flush_interval: Duration,
    /// Mount read-only; enforced by the kernel adapter.
    pub read_only: bool,
    /// Grace period for draining on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/monofs"),
            local_data_path: None,
            filesystem_name: "monofs#head".to_string(),
            cache_size: 100,
            flush_interval: Duration::from_secs(1),
            read_only: false,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// The directory per-file data stores live in.
    pub fn local_data_path(&self) -> PathBuf {
        self.local_data_path
            .clone()
            .unwrap_or_else(|| self.path.join("localDataPath"))
    }

    /// Split `filesystem_name` into `(name, snapshot)`; the snapshot
    /// label defaults to `head`.
    pub fn split_name(&self) -> (String, String) {
        match self.filesystem_name.split_once('#') {
            Some((name, snapshot)) if !snapshot.is_empty() => {
                (name.to_string(), snapshot.to_string())
            }
            Some((name, _)) => (name.to_string(), "head".to_string()),
            None => (self.filesystem_name.clone(), "head".to_string()),
        }
    }
}
