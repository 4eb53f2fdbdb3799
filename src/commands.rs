//! CLI commands for droid-sdkmanager
//!
//! Provides command-line interface functionality for automation and scripting.

use std::path::PathBuf;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use droid_sdkmanager_core::{RepositoryConfig, SdkManagerSettings, SdkVersion};
use droid_sdkmanager_toolchain::{ProgressCallback, SdkDownloader, SdkManager, SdkManagerList};

/// Download command options
pub struct DownloadCommand {
    pub settings: SdkManagerSettings,
    pub repository: RepositoryConfig,
    pub destination: Option<PathBuf>,
    pub version: Option<SdkVersion>,
    pub show_progress: bool,
}

impl DownloadCommand {
    /// Download and unpack the SDK tools, returning the SDK root used
    pub async fn execute(&self) -> Result<PathBuf> {
        let downloader = SdkDownloader::new(self.settings.clone(), self.repository.clone())
            .context("Failed to set up the SDK downloader")?;

        let progress = if self.show_progress {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("#>-"),
            );
            Some(bar)
        } else {
            None
        };

        let callback = progress.clone().map(|bar| -> ProgressCallback {
            Box::new(move |downloaded, total| {
                if total > 0 && bar.length() != Some(total) {
                    bar.set_length(total);
                }
                bar.set_position(downloaded);
            })
        });

        let result = downloader
            .download_sdk(self.destination.as_deref(), self.version, callback)
            .await;

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        let root = result?;
        println!("Android SDK tools installed to {}", root.display());
        Ok(root)
    }
}

/// Print the latest tools version published in the manifest
pub struct LatestCommand {
    pub settings: SdkManagerSettings,
    pub repository: RepositoryConfig,
}

impl LatestCommand {
    pub async fn execute(&self) -> Result<SdkVersion> {
        let downloader = SdkDownloader::new(self.settings.clone(), self.repository.clone())?;
        let version = downloader.manifest().latest_version().await?;
        println!("{}", version);
        Ok(version)
    }
}

/// Package listing command
pub struct ListCommand {
    pub settings: SdkManagerSettings,
    pub java_home: Option<PathBuf>,
    pub json: bool,
}

impl ListCommand {
    pub async fn execute(&self) -> Result<SdkManagerList> {
        let manager = open_manager(&self.settings, self.java_home.as_ref())?;
        let list = manager.list().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&list)?);
        } else {
            print_list(&list);
        }

        Ok(list)
    }
}

fn print_list(list: &SdkManagerList) {
    if list.installed.is_empty() {
        println!("No packages installed");
    } else {
        println!("Installed packages:");
        for pkg in &list.installed {
            println!("  {:<40} {:<12} {}", pkg.path, pkg.version, pkg.location.display());
        }
    }

    if !list.available.is_empty() {
        println!();
        println!("Available packages:");
        for pkg in &list.available {
            println!("  {:<40} {:<12} {}", pkg.path, pkg.version, pkg.description);
        }
    }
}

/// sdkmanager package operations
pub struct PackagesCommand {
    pub settings: SdkManagerSettings,
    pub java_home: Option<PathBuf>,
    pub action: PackageAction,
}

pub enum PackageAction {
    Install { packages: Vec<String> },
    Uninstall { packages: Vec<String> },
    Update,
    Licenses,
    Help,
}

impl PackagesCommand {
    /// Execute the package command
    pub async fn execute(&self) -> Result<()> {
        let manager = open_manager(&self.settings, self.java_home.as_ref())?;

        match &self.action {
            PackageAction::Install { packages } => {
                manager.install(packages).await?;
                println!("Installed: {}", packages.join(", "));
            }
            PackageAction::Uninstall { packages } => {
                manager.uninstall(packages).await?;
                println!("Uninstalled: {}", packages.join(", "));
            }
            PackageAction::Update => {
                manager.update_all().await?;
                println!("Update complete!");
            }
            PackageAction::Licenses => {
                manager.accept_licenses().await?;
                println!("All licenses accepted");
            }
            PackageAction::Help => {
                for line in manager.help().await? {
                    println!("{}", line);
                }
            }
        }

        Ok(())
    }
}

fn open_manager(settings: &SdkManagerSettings, java_home: Option<&PathBuf>) -> Result<SdkManager> {
    let mut manager = SdkManager::new(settings.clone())?;
    if let Some(java_home) = java_home {
        manager.set_java_home(java_home.clone());
    }
    info!("sdkmanager: {}", manager.executable().display());
    Ok(manager)
}
