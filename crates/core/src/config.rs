//! Application Configuration
//!
//! Manages all droid-sdkmanager settings:
//! - sdkmanager invocation settings (SDK root, channel, proxy)
//! - Repository settings for downloading the SDK tools archive

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::version::SdkVersion;

/// Base URL of Google's Android package repository
pub const REPOSITORY_URL_BASE: &str = "https://dl.google.com/android/repository/";

/// Manifest listing every downloadable SDK package
pub const REPOSITORY_URL: &str = "https://dl.google.com/android/repository/repository2-1.xml";

/// Version used when the latest one cannot be resolved
pub const FALLBACK_VERSION: SdkVersion = SdkVersion::new(25, 2, 5);

/// Release channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Beta,
    Dev,
    Canary,
}

impl Channel {
    /// Numeric id used by the repository (`channel-N`) and by `--channel=N`
    pub fn index(self) -> u8 {
        match self {
            Channel::Stable => 0,
            Channel::Beta => 1,
            Channel::Dev => 2,
            Channel::Canary => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Channel::Stable),
            1 => Some(Channel::Beta),
            2 => Some(Channel::Dev),
            3 => Some(Channel::Canary),
            _ => None,
        }
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stable" | "0" => Ok(Channel::Stable),
            "beta" | "1" => Ok(Channel::Beta),
            "dev" | "2" => Ok(Channel::Dev),
            "canary" | "3" => Ok(Channel::Canary),
            other => Err(CoreError::Config(format!("unknown channel '{}'", other))),
        }
    }
}

/// Proxy used by sdkmanager and by the downloader
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    None,
    Http,
    Socks,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyType::None => "none",
            ProxyType::Http => "http",
            ProxyType::Socks => "socks",
        })
    }
}

impl FromStr for ProxyType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ProxyType::None),
            "http" => Ok(ProxyType::Http),
            "socks" => Ok(ProxyType::Socks),
            other => Err(CoreError::Config(format!("unknown proxy type '{}'", other))),
        }
    }
}

/// sdkmanager tool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SdkManagerSettings {
    /// Android SDK root. Default: `$HOME/.android`
    pub sdk_root: PathBuf,
    /// Release channel
    pub channel: Channel,
    /// Include obsolete packages in listings and updates
    pub include_obsolete: bool,
    /// Force plain HTTP
    pub no_https: bool,
    pub proxy_type: ProxyType,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    /// Skip the `--version` check that runs before each invocation
    pub skip_version_check: bool,
    /// Explicit sdkmanager executable, searched first
    pub tool_path: Option<PathBuf>,
}

impl Default for SdkManagerSettings {
    fn default() -> Self {
        Self {
            sdk_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".android"),
            channel: Channel::Stable,
            include_obsolete: false,
            no_https: false,
            proxy_type: ProxyType::None,
            proxy_host: None,
            proxy_port: None,
            skip_version_check: false,
            tool_path: None,
        }
    }
}

impl SdkManagerSettings {
    /// SDK root resolved against the current directory
    pub fn absolute_sdk_root(&self) -> Result<PathBuf> {
        if self.sdk_root.is_absolute() {
            Ok(self.sdk_root.clone())
        } else {
            Ok(std::env::current_dir()?.join(&self.sdk_root))
        }
    }

    /// Proxy URL (`http://host:port` / `socks5://host:port`) when one is configured
    pub fn proxy_url(&self) -> Option<String> {
        let host = self.proxy_host.as_deref().filter(|h| !h.is_empty())?;
        let scheme = match self.proxy_type {
            ProxyType::None => return None,
            ProxyType::Http => "http",
            ProxyType::Socks => "socks5",
        };
        match self.proxy_port.filter(|p| *p > 0) {
            Some(port) => Some(format!("{}://{}:{}", scheme, host, port)),
            None => Some(format!("{}://{}", scheme, host)),
        }
    }
}

/// Where and how the SDK tools archive is fetched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Manifest URL; archive URLs are resolved relative to it
    pub url: String,
    /// `remotePackage` path to resolve
    pub package_path: String,
    /// Version used when the manifest cannot be resolved
    pub fallback_version: Option<SdkVersion>,
    /// `false` disables the fallback so manifest errors propagate
    pub use_fallback: bool,
    /// Directory for downloaded archives. Defaults to the OS temp dir
    pub download_dir: Option<PathBuf>,
    /// Keep the verified archive after extraction so later runs reuse it
    pub keep_archive: bool,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: REPOSITORY_URL.to_string(),
            package_path: "tools".to_string(),
            fallback_version: Some(FALLBACK_VERSION),
            use_fallback: true,
            download_dir: None,
            keep_archive: true,
            timeout_secs: 300,
        }
    }
}

impl RepositoryConfig {
    /// The fallback version, if enabled
    pub fn fallback(&self) -> Option<SdkVersion> {
        self.fallback_version.filter(|_| self.use_fallback)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration version for migrations
    pub version: u32,
    /// sdkmanager settings
    pub sdk: SdkManagerSettings,
    /// Repository and download settings
    pub repository: RepositoryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            sdk: SdkManagerSettings::default(),
            repository: RepositoryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "droid-sdkmanager", "droid-sdkmanager")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the default location, writing defaults on first run
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| CoreError::Config("Cannot determine config path".into()))?;

        if config_file.exists() {
            Self::load_from(&config_file).await
        } else {
            info!("Config file not found, using defaults");
            let config = AppConfig::default();
            config.save_to(&config_file).await?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file. A missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(AppConfig::default());
        }

        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_file = Self::config_file()
            .ok_or_else(|| CoreError::Config("Cannot determine config path".into()))?;
        self.save_to(&config_file).await
    }

    /// Save configuration to an explicit file
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SdkManagerSettings::default();
        assert!(settings.sdk_root.ends_with(".android"));
        assert_eq!(settings.channel, Channel::Stable);
        assert_eq!(settings.proxy_type, ProxyType::None);
        assert!(!settings.include_obsolete);
        assert!(!settings.skip_version_check);
    }

    #[test]
    fn test_default_repository() {
        let repo = RepositoryConfig::default();
        assert_eq!(repo.url, REPOSITORY_URL);
        assert!(repo.url.starts_with(REPOSITORY_URL_BASE));
        assert_eq!(repo.package_path, "tools");
        assert_eq!(repo.fallback_version, Some(SdkVersion::new(25, 2, 5)));
    }

    #[test]
    fn test_channel_parse_and_index() {
        assert_eq!("beta".parse::<Channel>().unwrap(), Channel::Beta);
        assert_eq!("3".parse::<Channel>().unwrap(), Channel::Canary);
        assert!("nightly".parse::<Channel>().is_err());
        assert_eq!(Channel::Dev.index(), 2);
        assert_eq!(Channel::from_index(1), Some(Channel::Beta));
        assert_eq!(Channel::from_index(9), None);
    }

    #[test]
    fn test_proxy_url() {
        let mut settings = SdkManagerSettings::default();
        assert_eq!(settings.proxy_url(), None);

        settings.proxy_type = ProxyType::Http;
        assert_eq!(settings.proxy_url(), None);

        settings.proxy_host = Some("proxy.local".into());
        assert_eq!(settings.proxy_url().as_deref(), Some("http://proxy.local"));

        settings.proxy_type = ProxyType::Socks;
        settings.proxy_port = Some(1080);
        assert_eq!(settings.proxy_url().as_deref(), Some("socks5://proxy.local:1080"));
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [sdk]
            channel = "canary"
            proxy_type = "http"

            [repository]
            fallback_version = "26.1.1"
            "#,
        )
        .unwrap();

        assert_eq!(config.sdk.channel, Channel::Canary);
        assert_eq!(config.sdk.proxy_type, ProxyType::Http);
        assert_eq!(config.repository.fallback_version, Some(SdkVersion::new(26, 1, 1)));
        assert_eq!(config.repository.package_path, "tools");
        assert_eq!(config.version, 1);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.sdk.sdk_root = PathBuf::from("/opt/android-sdk");
        config.sdk.include_obsolete = true;
        config.repository.keep_archive = false;

        config.save_to(&path).await.unwrap();
        let loaded = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_disabled_fallback_survives_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.repository.use_fallback = false;
        config.save_to(&path).await.unwrap();

        let loaded = AppConfig::load_from(&path).await.unwrap();
        assert!(!loaded.repository.use_fallback);
        assert_eq!(loaded.repository.fallback(), None);
        assert_eq!(RepositoryConfig::default().fallback(), Some(FALLBACK_VERSION));
    }

    #[test]
    fn test_use_fallback_from_toml() {
        let config: AppConfig = toml::from_str("[repository]\nuse_fallback = false\n").unwrap();
        assert_eq!(config.repository.fallback(), None);
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(loaded, AppConfig::default());
    }
}
