//! Android SDK Tools Management
//!
//! Handles download and management of:
//! - The SDK tools archive published in the repository manifest
//! - Packages installed through the vendor `sdkmanager`
//! - License acceptance

pub mod checksum;
pub mod downloader;
pub mod list_parser;
pub mod platform;
pub mod process;
pub mod repository;
pub mod sdk_manager;

pub use checksum::{Checksum, ChecksumKind};
pub use downloader::{build_client, DownloadError, ProgressCallback, SdkDownloader};
pub use list_parser::{
    AvailablePackage, InstalledPackage, ListOutputParser, SdkManagerList, VerboseListParser,
};
pub use platform::{HostPlatform, PlatformError};
pub use repository::{
    ArchiveRecord, ManifestClient, ManifestError, ParseError, RepositoryManifest, ToolsPackage,
};
pub use sdk_manager::{SdkManager, SdkManagerError, MINIMUM_SDKMANAGER_VERSION};

/// Manifest package path of the legacy SDK tools
pub const DEFAULT_PACKAGE_PATH: &str = "tools";
