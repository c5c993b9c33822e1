use crate::config::Config;
use crate::errors::{GamdlWebError, Result};
use std::path::PathBuf;

/// Settings management module
/// This module provides a simple interface for loading, editing and saving the configuration
#[derive(Debug, Clone)]
pub struct Settings {
    config: Config,
    source: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the standard locations
    pub fn load() -> Result<Self> {
        let config = Config::load()?;
        Ok(Self { config, source: None })
    }

    /// Load settings from an explicit file
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let config = Config::load_from_path(&path)?;
        Ok(Self { config, source: Some(path) })
    }

    /// Load from `path` when given, otherwise from the standard locations.
    /// When nothing can be read the defaults are returned together with the load error.
    pub fn load_or_default(path: Option<PathBuf>) -> (Self, Option<GamdlWebError>) {
        let loaded = match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        };

        match loaded {
            Ok(settings) => (settings, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Get a reference to the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the settings, keeping the configuration
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration back to where it came from
    pub fn save(&self) -> Result<()> {
        match &self.source {
            Some(path) => self.save_to(path),
            None => {
                self.config.save()?;
                // Keep the local override in sync if one is in use
                let local_json_path = Config::local_json_settings_path()?;
                if local_json_path.exists() {
                    self.save_to(&local_json_path)?;
                }
                Ok(())
            }
        }
    }

    fn save_to(&self, path: &PathBuf) -> Result<()> {
        let is_toml = path.extension().map(|ext| ext == "toml").unwrap_or(false);
        let content = if is_toml {
            toml::to_string_pretty(&self.config)?
        } else {
            serde_json::to_string_pretty(&self.config)?
        };

        std::fs::write(path, content)
            .map_err(|e| GamdlWebError::Settings(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Update the download directory
    pub fn set_download_directory(&mut self, path: PathBuf) -> Result<()> {
        self.config.download_directory = path;
        self.config.ensure_download_directory()?;
        self.save()
    }

    /// Update the default cookies file
    pub fn set_cookies_path(&mut self, path: PathBuf) -> Result<()> {
        self.config.cookies_path = path;
        self.save()
    }

    /// Update the external tool invocation
    pub fn set_tool(&mut self, program: String, base_args: Vec<String>) -> Result<()> {
        if program.trim().is_empty() {
            return Err(GamdlWebError::Settings("Tool program cannot be empty".to_string()));
        }
        self.config.tool.program = program;
        self.config.tool.base_args = base_args;
        self.save()
    }

    /// Reset to default settings
    pub fn reset(&mut self) -> Result<()> {
        self.config = Config::default();
        self.save()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self { config: Config::default(), source: None }
    }
}
