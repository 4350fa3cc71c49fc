//! converge.toml
//!
//! ```toml
//! root_directory = "~/managed"
//! jobs = 4
//! delete_orphans = false
//!
//! [configuration]
//! create_directories = "true"
//! ```
//!
//! Command-line flags override values from the file.

use anyhow::{Context, Result};
use declarative::Configuration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvergeConfig {
    /// Directory the file provider manages
    #[serde(default)]
    pub root_directory: Option<String>,
    /// Worker threads for execution
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Delete managed files with no desired counterpart
    #[serde(default)]
    pub delete_orphans: bool,
    /// Provider configuration passed into every reconciliation
    #[serde(default)]
    pub configuration: Configuration,
}

impl ConvergeConfig {
    /// Load the config file, or defaults when it does not exist
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Managed root: `--root`, then `root_directory`, then the current directory
    pub fn root_path(&self, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(root) = flag {
            return Ok(root.to_path_buf());
        }
        match &self.root_directory {
            Some(dir) => Ok(paths::expand(dir)),
            None => std::env::current_dir().context("Could not determine current directory"),
        }
    }
}
