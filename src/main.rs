//! droid-sdkmanager
//!
//! Command-line entry point: parses arguments, initializes logging, loads the
//! configuration and dispatches to the command layer.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use droid_sdkmanager::commands::{
    DownloadCommand, LatestCommand, ListCommand, PackageAction, PackagesCommand,
};
use droid_sdkmanager::core::{AppConfig, Channel, CoreError, ProxyType, SdkVersion};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "droid-sdkmanager", version, about = "Android SDK tools downloader and sdkmanager driver")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    /// Use this config file instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings overrides applied on top of the config file
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Android SDK root
    #[arg(long, global = true)]
    sdk_root: Option<PathBuf>,

    /// Release channel (stable, beta, dev, canary or 0-3)
    #[arg(long, global = true)]
    channel: Option<Channel>,

    #[arg(long, global = true)]
    include_obsolete: bool,

    /// Force plain http for all downloads
    #[arg(long, global = true)]
    no_https: bool,

    /// Proxy type (none, http, socks)
    #[arg(long, global = true)]
    proxy: Option<ProxyType>,

    #[arg(long, global = true)]
    proxy_host: Option<String>,

    #[arg(long, global = true)]
    proxy_port: Option<u16>,

    /// Do not require sdkmanager 26.1.1 or later
    #[arg(long, global = true)]
    skip_version_check: bool,

    /// Explicit sdkmanager executable
    #[arg(long, global = true)]
    tool_path: Option<PathBuf>,

    /// JAVA_HOME passed to sdkmanager
    #[arg(long, global = true)]
    java_home: Option<PathBuf>,

    /// Fail instead of falling back to a pinned version when the manifest is unusable
    #[arg(long, global = true)]
    no_fallback: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the SDK tools archive and unpack it into the SDK root
    Download {
        /// Unpack here instead of the SDK root
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Tools version; defaults to the latest published
        #[arg(long)]
        version: Option<SdkVersion>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List installed and available packages
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Install packages, e.g. "platform-tools" "platforms;android-34"
    Install {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Uninstall packages
    Uninstall {
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Update all installed packages
    Update,

    /// Accept all SDK licenses
    Licenses,

    /// Show sdkmanager's own usage text
    #[command(name = "help-tool")]
    HelpTool,

    /// Print the latest tools version in the repository manifest
    Latest,
}

impl Overrides {
    fn apply(self, config: &mut AppConfig) {
        if self.no_fallback {
            config.repository.use_fallback = false;
        }

        let sdk = &mut config.sdk;

        if let Some(sdk_root) = self.sdk_root {
            sdk.sdk_root = sdk_root;
        }
        if let Some(channel) = self.channel {
            sdk.channel = channel;
        }
        if let Some(proxy) = self.proxy {
            sdk.proxy_type = proxy;
        }
        if let Some(host) = self.proxy_host {
            sdk.proxy_host = Some(host);
        }
        if let Some(port) = self.proxy_port {
            sdk.proxy_port = Some(port);
        }
        if let Some(tool_path) = self.tool_path {
            sdk.tool_path = Some(tool_path);
        }

        sdk.include_obsolete |= self.include_obsolete;
        sdk.no_https |= self.no_https;
        sdk.skip_version_check |= self.skip_version_check;
    }
}

/// Main entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(cli.verbose)
        .with_line_number(cli.verbose)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<CoreError>() {
            Some(core) => error!("{}", core.user_message()),
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    debug!("droid-sdkmanager v{} starting...", VERSION);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path).await?,
        None => AppConfig::load().await?,
    };
    let java_home = cli.overrides.java_home.clone();
    cli.overrides.apply(&mut config);

    let settings = config.sdk;
    let repository = config.repository;

    match cli.command {
        Commands::Download {
            dest,
            version,
            no_progress,
        } => {
            DownloadCommand {
                settings,
                repository,
                destination: dest,
                version,
                show_progress: !no_progress,
            }
            .execute()
            .await?;
        }
        Commands::Latest => {
            LatestCommand {
                settings,
                repository,
            }
            .execute()
            .await?;
        }
        Commands::List { json } => {
            ListCommand {
                settings,
                java_home,
                json,
            }
            .execute()
            .await?;
        }
        command => {
            let action = match command {
                Commands::Install { packages } => PackageAction::Install { packages },
                Commands::Uninstall { packages } => PackageAction::Uninstall { packages },
                Commands::Update => PackageAction::Update,
                Commands::Licenses => PackageAction::Licenses,
                _ => PackageAction::Help,
            };

            PackagesCommand {
                settings,
                java_home,
                action,
            }
            .execute()
            .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let cli = Cli::try_parse_from([
            "droid-sdkmanager",
            "--sdk-root",
            "/opt/sdk",
            "--channel",
            "beta",
            "--proxy",
            "socks",
            "--proxy-port",
            "1080",
            "--no-https",
            "list",
            "--json",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::List { json: true }));

        let mut config = AppConfig::default();
        cli.overrides.apply(&mut config);
        assert_eq!(config.sdk.sdk_root, PathBuf::from("/opt/sdk"));
        assert_eq!(config.sdk.channel, Channel::Beta);
        assert_eq!(config.sdk.proxy_type, ProxyType::Socks);
        assert_eq!(config.sdk.proxy_port, Some(1080));
        assert!(config.sdk.no_https);
        assert!(!config.sdk.include_obsolete);
        assert!(config.repository.use_fallback);
    }

    #[test]
    fn test_no_fallback_override() {
        let cli = Cli::try_parse_from(["droid-sdkmanager", "latest", "--no-fallback"]).unwrap();

        let mut config = AppConfig::default();
        cli.overrides.apply(&mut config);
        assert_eq!(config.repository.fallback(), None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "droid-sdkmanager",
            "download",
            "--version",
            "26.1.1",
            "--channel",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Download { version, .. } => {
                assert_eq!(version, Some(SdkVersion::new(26, 1, 1)))
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.overrides.channel, Some(Channel::Canary));
    }

    #[test]
    fn test_install_requires_packages() {
        assert!(Cli::try_parse_from(["droid-sdkmanager", "install"]).is_err());
    }
}
