use thiserror::Error;

/// Main error type for the gamdl web panel
#[derive(Error, Debug)]
pub enum GamdlWebError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Catalog API error: {0}")]
    Catalog(String),

    #[error("Cookies error: {0}")]
    Cookies(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, GamdlWebError>;

impl GamdlWebError {
    /// Whether the error was caused by the caller's input rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GamdlWebError::InvalidUrl(_) | GamdlWebError::InvalidOption(_) | GamdlWebError::Cookies(_)
        )
    }
}
