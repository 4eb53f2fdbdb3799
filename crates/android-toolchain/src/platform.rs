//! Host platform identifiers as used by the Android repository (`host-os`).

use std::fmt;
use std::str::FromStr;

/// Platform errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Invalid platform string '{0}': expected linux, windows or macosx")]
    OutOfRange(String),
    #[error("The current platform is not supported")]
    Unsupported,
}

/// Operating systems the SDK tools are published for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    Linux,
    Windows,
    #[serde(rename = "macosx")]
    MacOsx,
}

impl HostPlatform {
    /// The platform this binary runs on
    pub fn current() -> Result<Self, PlatformError> {
        if cfg!(windows) {
            Ok(HostPlatform::Windows)
        } else if cfg!(target_os = "macos") {
            Ok(HostPlatform::MacOsx)
        } else if cfg!(target_os = "linux") {
            Ok(HostPlatform::Linux)
        } else {
            Err(PlatformError::Unsupported)
        }
    }

    /// Repository `host-os` value
    pub fn as_str(&self) -> &'static str {
        match self {
            HostPlatform::Linux => "linux",
            HostPlatform::Windows => "windows",
            HostPlatform::MacOsx => "macosx",
        }
    }

    /// Suffix of shell wrappers such as `sdkmanager.bat`
    pub fn script_extension(&self) -> &'static str {
        match self {
            HostPlatform::Windows => ".bat",
            _ => "",
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostPlatform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(HostPlatform::Linux),
            "windows" => Ok(HostPlatform::Windows),
            "macosx" => Ok(HostPlatform::MacOsx),
            other => Err(PlatformError::OutOfRange(other.to_string())),
        }
    }
}
