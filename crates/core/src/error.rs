//! Error types for droid-sdkmanager core
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the core crate
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Io(e) => format!("File operation failed: {}", e),
            CoreError::Config(msg) => format!("Configuration error: {}", msg),
            CoreError::TomlParse(e) => format!("Config file is not valid TOML: {}", e),
            CoreError::InvalidVersion { input, .. } => {
                format!("'{}' is not a version like 25.2.5", input)
            }
            _ => self.to_string(),
        }
    }
}
