//! droid-sdkmanager core - settings and shared types
//!
//! This crate holds the configuration model shared by the toolchain crate and
//! the CLI: sdkmanager settings, repository settings, and SDK version numbers.

pub mod config;
pub mod error;
pub mod version;

pub use config::{AppConfig, Channel, ProxyType, RepositoryConfig, SdkManagerSettings};
pub use error::{CoreError, Result};
pub use version::SdkVersion;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
