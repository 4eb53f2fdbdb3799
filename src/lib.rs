//! droid-sdkmanager
//!
//! Downloads the Android SDK tools from the official repository manifest and
//! drives the vendor `sdkmanager` to list, install, uninstall and update
//! packages.
//!
//! ## Architecture
//!
//! - `droid-sdkmanager-core`: configuration, settings and version types
//! - `droid-sdkmanager-toolchain`: manifest resolution, verified download,
//!   extraction and the `sdkmanager` wrapper

#![warn(clippy::all)]

pub mod commands;

// Re-export main components for library usage
pub use droid_sdkmanager_core as core;
pub use droid_sdkmanager_toolchain as toolchain;

/// Prelude module for convenient imports
pub mod prelude {
    pub use droid_sdkmanager_core::{
        AppConfig, Channel, ProxyType, RepositoryConfig, SdkManagerSettings, SdkVersion,
    };
    pub use droid_sdkmanager_toolchain::{
        HostPlatform, ListOutputParser, SdkDownloader, SdkManager, SdkManagerList,
    };
}
