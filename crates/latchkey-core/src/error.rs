use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identifier errors
    #[error("Invalid badge UID: {0}")]
    InvalidBadgeUid(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidConfigValue { key: String, message: String },

    #[error("Failed to parse configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid configuration value error.
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
