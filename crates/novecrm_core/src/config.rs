//! Runtime configuration for the CRM core.
//!
//! # Responsibility
//! - Derive on-device paths (database file, log directory) from one data dir.
//! - Name the storage keys of the persisted layout.
//!
//! # Invariants
//! - Record keys are namespaced per owner: `<prefix><username><suffix>`.

use crate::db::{self, DbResult};
use crate::logging;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "novecrm.sqlite3";
pub const LOG_DIR_NAME: &str = "logs";

/// Keys of the persisted layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub users: String,
    pub session: String,
    pub records_prefix: String,
    pub records_suffix: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            users: "novecrm_users_v1".to_string(),
            session: "novecrm_session_v1".to_string(),
            records_prefix: "novecrm_posts_".to_string(),
            records_suffix: "_v1".to_string(),
        }
    }
}

impl StorageKeys {
    /// Key holding one owner's record collection.
    pub fn records_key(&self, owner: &str) -> String {
        format!("{}{owner}{}", self.records_prefix, self.records_suffix)
    }
}

/// Paths and options needed to bootstrap the core on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub keys: StorageKeys,
}

impl CoreConfig {
    /// Config rooted at `data_dir` with build-mode log level and default keys.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            log_level: logging::default_log_level().to_string(),
            keys: StorageKeys::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    /// Opens (and migrates) the database under `data_dir`.
    pub fn open_db(&self) -> DbResult<Connection> {
        db::open_db(self.db_path())
    }

    /// Starts file logging under `data_dir/logs`.
    pub fn init_logging(&self) -> Result<(), String> {
        let log_dir = self.log_dir();
        let log_dir = path_to_str(&log_dir)?;
        logging::init_logging(&self.log_level, log_dir)
    }
}

fn path_to_str(path: &Path) -> Result<&str, String> {
    path.to_str()
        .ok_or_else(|| format!("path `{}` is not valid UTF-8", path.display()))
}
