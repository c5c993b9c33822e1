use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::errors::{Result, GamdlWebError};
use url::Url;

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// External download tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable to launch
    pub program: String,
    /// Arguments placed before any option flags
    pub base_args: Vec<String>,
    /// Working directory for the tool process, inherited when unset
    pub working_dir: Option<PathBuf>,
    /// Hard wall-clock limit per job
    pub timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            base_args: vec!["-m".to_string(), "gamdl".to_string()],
            working_dir: None,
            timeout_secs: 600,
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 1080,
            username: None,
            password: None,
        }
    }
}

impl ProxyConfig {
    /// Proxy URL with escaped credentials, or `None` when the proxy is disabled
    pub fn url(&self) -> Result<Option<Url>> {
        if !self.enabled {
            return Ok(None);
        }

        let mut url = Url::parse(&format!("http://{}:{}", self.host, self.port))?;
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            url.set_username(username)
                .and_then(|_| url.set_password(Some(password)))
                .map_err(|_| GamdlWebError::Config(format!("Proxy {} cannot carry credentials", self.host)))?;
        }
        Ok(Some(url))
    }
}

/// Catalog API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Storefront override; the account storefront is used when unset
    pub storefront: Option<String>,
    pub language: String,
    pub request_timeout_secs: u64,
    /// Number of tracks shown per preview record
    pub preview_track_limit: usize,
    pub user_agent: String,
    pub proxy: ProxyConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            storefront: None,
            language: "en-US".to_string(),
            request_timeout_secs: 30,
            preview_track_limit: 15,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string(),
            proxy: ProxyConfig::default(),
        }
    }
}

/// Finished job retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_finished_jobs: usize,
    pub finished_ttl_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_finished_jobs: 500,
            finished_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub download_directory: PathBuf,
    /// Default credentials file, also where uploaded cookies are stored
    pub cookies_path: PathBuf,
    pub tool: ToolConfig,
    pub catalog: CatalogConfig,
    pub retention: RetentionConfig,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            download_directory: PathBuf::from("downloads"),
            cookies_path: PathBuf::from("cookies.txt"),
            tool: ToolConfig::default(),
            catalog: CatalogConfig::default(),
            retention: RetentionConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| GamdlWebError::Config("Could not find config directory".to_string()))
            .map(|dir| dir.join("gamdl-web"))
    }

    /// Get the settings file path (TOML format)
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.toml"))
    }

    /// Get the JSON settings file path
    pub fn json_settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Get the local JSON settings file path (in the working directory)
    pub fn local_json_settings_path() -> Result<PathBuf> {
        Ok(std::env::current_dir()?.join("settings.json"))
    }

    /// Load configuration (local JSON, then config-dir JSON, then TOML)
    pub fn load() -> Result<Self> {
        if let Ok(local_json_path) = Self::local_json_settings_path() {
            if local_json_path.exists() {
                return Self::load_from_path(&local_json_path);
            }
        }

        if let Ok(json_path) = Self::json_settings_path() {
            if json_path.exists() {
                return Self::load_from_path(&json_path);
            }
        }

        let settings_path = Self::settings_path()?;
        if !settings_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        Self::load_from_path(&settings_path)
    }

    /// Load configuration from an explicit file, picking the format by extension
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GamdlWebError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            toml::from_str(&content)
                .map_err(|e| GamdlWebError::Config(format!("Failed to parse {}: {}", path.display(), e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| GamdlWebError::Config(format!("Failed to parse {}: {}", path.display(), e)))
        }
    }

    /// Save configuration to the config directory (both JSON and TOML)
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| GamdlWebError::Config(format!("Failed to create config directory: {}", e)))?;

        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(Self::settings_path()?, toml_content)
            .map_err(|e| GamdlWebError::Config(format!("Failed to write TOML settings file: {}", e)))?;

        let json_content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::json_settings_path()?, json_content)
            .map_err(|e| GamdlWebError::Config(format!("Failed to write JSON settings file: {}", e)))?;

        Ok(())
    }

    /// Ensure download directory exists
    pub fn ensure_download_directory(&self) -> Result<()> {
        std::fs::create_dir_all(&self.download_directory)
            .map_err(|e| GamdlWebError::Config(format!("Failed to create download directory: {}", e)))?;
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
