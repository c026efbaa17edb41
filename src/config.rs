// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::PathError;

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "RSSCAN_DATA_DIR";

const DATABASE_FILENAME: &str = "podcasts.db";
const EPISODES_DIRNAME: &str = "episodes";

/// Resolved locations of everything rsscan keeps on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolve the data directory from [`DATA_DIR_ENV`], falling back to the
    /// current working directory
    pub fn from_env() -> Result<Self, PathError> {
        let cwd = std::env::current_dir().map_err(PathError::DataDirUnavailable)?;
        Ok(Self::resolve(std::env::var_os(DATA_DIR_ENV), cwd))
    }

    fn resolve(env_value: Option<OsString>, cwd: PathBuf) -> Self {
        match env_value {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(cwd),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILENAME)
    }

    pub fn episodes_dir(&self) -> PathBuf {
        self.data_dir.join(EPISODES_DIRNAME)
    }

    /// Create the data directory if it does not exist yet
    pub fn ensure_data_dir(&self) -> Result<&Path, PathError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| PathError::CreateDirectoryFailed {
            path: self.data_dir.clone(),
            source: e,
        })?;
        Ok(&self.data_dir)
    }
}
