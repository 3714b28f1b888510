//! Configuration storage operations

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;

/// Reads and writes a JSON configuration file
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load<T>(&self) -> Result<T>
    where
        T: Default + Serialize + DeserializeOwned,
    {
        if !self.path.exists() {
            tracing::info!("Writing default config to {}", self.path.display());
            let config = T::default();
            self.save(&config)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&self.path)?;

        // Handle empty file case
        if content.trim().is_empty() {
            let config = T::default();
            self.save(&config)?;
            return Ok(config);
        }

        let config: T = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save<T: Serialize>(&self, config: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;

        Ok(())
    }
}
