//! XDG-compliant path management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Where configuration, the catalogue cache and logs live
#[derive(Debug, Clone)]
pub struct Paths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl Paths {
    /// Resolve the XDG base directories for modscout
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "modscout")
            .context("Failed to determine project directories")?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
            cache_dir: dirs.cache_dir().to_path_buf(),
        })
    }

    /// Keep everything under one directory
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
        }
    }

    // ========== Config Paths ==========

    /// Config directory: ~/.config/modscout/
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Main config file: ~/.config/modscout/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    // ========== Data Paths ==========

    /// Data directory: ~/.local/share/modscout/
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Catalogue cache: ~/.local/share/modscout/catalogue.db
    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("catalogue.db")
    }

    // ========== Cache Paths ==========

    /// Cache directory: ~/.cache/modscout/
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Log directory: ~/.cache/modscout/logs/
    pub fn log_dir(&self) -> PathBuf {
        self.cache_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("modscout.log")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}
