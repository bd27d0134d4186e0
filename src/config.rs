use std::path::PathBuf;
use std::time::Duration;

/// Overrides the default `~/.clipcache` base directory.
pub const HOME_ENV: &str = "CLIPCACHE_HOME";

pub const TAGS_FILE_NAME: &str = "tags.json";
pub const ENTRY_EXTENSION: &str = "json";

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const PAGE_SIZE: usize = 8;

pub struct AppPaths {
    pub base_dir: PathBuf,
    pub history_dir: PathBuf,
    pub tags_file: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl AppPaths {
    pub fn new() -> Self {
        let base = match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(".clipcache"),
        };
        Self::from_base(base)
    }

    pub fn from_base(base: PathBuf) -> Self {
        let history_dir = base.join("history");
        Self {
            tags_file: history_dir.join(TAGS_FILE_NAME),
            history_dir,
            pid_file: base.join("clipcache.pid"),
            log_file: base.join("clipcache.log"),
            base_dir: base,
        }
    }
}
