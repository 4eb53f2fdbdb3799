//! SDK Manager
//!
//! Wraps the vendor `sdkmanager` executable to list, install, uninstall and
//! update SDK packages and to accept licenses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use droid_sdkmanager_core::{Channel, CoreError, ProxyType, SdkManagerSettings, SdkVersion};

use crate::list_parser::{ListOutputParser, SdkManagerList, VerboseListParser};
use crate::platform::HostPlatform;
use crate::process::{ToolOutput, ToolProcess};

/// Oldest legacy `tools` sdkmanager that understands our flags
pub const MINIMUM_SDKMANAGER_VERSION: SdkVersion = SdkVersion::new(26, 1, 1);

/// cmdline-tools restarted numbering at 1.0; anything below this major is
/// that scheme and always new enough
const CMDLINE_TOOLS_MAJOR_CEILING: u32 = 20;

/// How often `y` is sent while accepting licenses
const LICENSE_ANSWER_INTERVAL: Duration = Duration::from_millis(250);

/// SDK Manager errors
#[derive(Debug, thiserror::Error)]
pub enum SdkManagerError {
    #[error("sdkmanager: could not locate executable ({} locations searched)", .searched.len())]
    NotFound { searched: Vec<PathBuf> },
    #[error("sdkmanager is out of date: version {required} or later is required (found {found})")]
    OutOfDate { found: String, required: SdkVersion },
    #[error("Command failed: {0}")]
    CommandFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] CoreError),
}

/// Android SDK Manager wrapper
pub struct SdkManager {
    settings: SdkManagerSettings,
    sdkmanager_path: PathBuf,
    java_home: Option<PathBuf>,
    parser: Box<dyn ListOutputParser>,
}

impl SdkManager {
    /// Locate sdkmanager for these settings
    pub fn new(settings: SdkManagerSettings) -> Result<Self, SdkManagerError> {
        let sdkmanager_path = Self::find_sdkmanager(&settings)?;
        debug!("Using sdkmanager at {:?}", sdkmanager_path);

        Ok(Self {
            settings,
            sdkmanager_path,
            java_home: None,
            parser: Box::new(VerboseListParser),
        })
    }

    /// Replace the `--list` output parser
    pub fn with_parser(mut self, parser: impl ListOutputParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Set the JAVA_HOME for SDK manager operations
    pub fn set_java_home(&mut self, java_home: PathBuf) {
        self.java_home = Some(java_home);
    }

    pub fn executable(&self) -> &Path {
        &self.sdkmanager_path
    }

    fn exe_name() -> String {
        let extension = HostPlatform::current().map_or("", |p| p.script_extension());
        format!("sdkmanager{}", extension)
    }

    /// Executable locations inside one SDK root, most preferred first
    fn sdk_candidates(sdk_root: &Path) -> Vec<PathBuf> {
        let exe_name = Self::exe_name();
        let exe_name = exe_name.as_str();
        let cmdline_tools = sdk_root.join("cmdline-tools");
        let mut candidates = vec![cmdline_tools.join("latest").join("bin").join(exe_name)];

        // cmdline-tools/X.Y, newest first
        if let Ok(entries) = std::fs::read_dir(&cmdline_tools) {
            let mut versioned: Vec<(Option<SdkVersion>, PathBuf)> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir() && !path.ends_with("latest"))
                .map(|path| {
                    let version = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .and_then(parse_tool_version);
                    (version, path)
                })
                .collect();
            versioned.sort_by(|a, b| b.cmp(a));
            candidates.extend(
                versioned
                    .into_iter()
                    .map(|(_, path)| path.join("bin").join(exe_name)),
            );
        }

        // legacy tools directory
        candidates.push(sdk_root.join("tools").join("bin").join(exe_name));
        candidates
    }

    /// Locations derived from the settings, checked before `PATH`
    pub fn candidates(settings: &SdkManagerSettings) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(tool_path) = &settings.tool_path {
            candidates.push(tool_path.clone());
        }

        candidates.extend(Self::sdk_candidates(&settings.sdk_root));
        candidates
    }

    /// Locations under `ANDROID_HOME` / `ANDROID_SDK_ROOT`, checked after `PATH`
    fn env_candidates() -> Vec<PathBuf> {
        ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
            .iter()
            .filter_map(std::env::var_os)
            .flat_map(|root| Self::sdk_candidates(Path::new(&root)))
            .collect()
    }

    /// Find the sdkmanager executable
    pub fn find_sdkmanager(settings: &SdkManagerSettings) -> Result<PathBuf, SdkManagerError> {
        let mut searched = Self::candidates(settings);
        if let Some(found) = searched.iter().find(|path| path.is_file()) {
            return Ok(found.clone());
        }

        for name in ["sdkmanager", "sdkmanager.bat"] {
            if let Ok(found) = which::which(name) {
                return Ok(found);
            }
        }

        let from_env = Self::env_candidates();
        if let Some(found) = from_env.iter().find(|path| path.is_file()) {
            return Ok(found.clone());
        }

        searched.extend(from_env);
        searched.dedup();
        Err(SdkManagerError::NotFound { searched })
    }

    /// Flags appended to every invocation
    pub fn standard_options(&self) -> Result<Vec<String>, SdkManagerError> {
        let settings = &self.settings;
        let mut args = vec!["--verbose".to_string()];

        if settings.channel != Channel::Stable {
            args.push(format!("--channel={}", settings.channel.index()));
        }

        args.push(format!("--sdk_root={}", settings.absolute_sdk_root()?.display()));

        if settings.include_obsolete {
            args.push("--include_obsolete".to_string());
        }

        if settings.no_https {
            args.push("--no_https".to_string());
        }

        if settings.proxy_type != ProxyType::None {
            args.push(format!("--proxy={}", settings.proxy_type));

            if let Some(host) = settings.proxy_host.as_deref().filter(|h| !h.is_empty()) {
                args.push(format!("--proxy_host={}", host));
            }

            if let Some(port) = settings.proxy_port.filter(|p| *p > 0) {
                args.push(format!("--proxy_port={}", port));
            }
        }

        Ok(args)
    }

    /// Create the base command with environment variables
    fn create_command(&self) -> Result<Command, SdkManagerError> {
        let sdk_root = self.settings.absolute_sdk_root()?;
        let mut cmd = Command::new(&self.sdkmanager_path);

        cmd.env("ANDROID_SDK_ROOT", &sdk_root);
        cmd.env("ANDROID_HOME", &sdk_root);

        if let Some(java_home) = &self.java_home {
            cmd.env("JAVA_HOME", java_home);
        }

        Ok(cmd)
    }

    fn spawn(&self, args: &[String]) -> Result<ToolProcess, SdkManagerError> {
        debug!("sdkmanager {:?}", args);
        let mut cmd = self.create_command()?;
        cmd.args(args);
        Ok(ToolProcess::spawn(cmd)?)
    }

    fn args_with_options(&self, leading: &[&str]) -> Result<Vec<String>, SdkManagerError> {
        let mut args: Vec<String> = leading.iter().map(|a| a.to_string()).collect();
        args.extend(self.standard_options()?);
        Ok(args)
    }

    /// Forward `Info:` lines and turn a non-zero exit into an error
    fn finish(&self, operation: &str, output: ToolOutput) -> Result<ToolOutput, SdkManagerError> {
        for line in &output.stdout {
            if line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("info:")) {
                debug!("sdkmanager: {}", line);
            }
        }

        if !output.status.success() {
            let detail = output
                .stderr
                .iter()
                .rev()
                .find(|l| !l.trim().is_empty())
                .or_else(|| output.stdout.iter().rev().find(|l| !l.trim().is_empty()))
                .map(String::as_str)
                .unwrap_or("no output");
            return Err(SdkManagerError::CommandFailed(format!(
                "{} exited with {:?}: {}",
                operation,
                output.status.code(),
                detail
            )));
        }

        Ok(output)
    }

    /// Ensure sdkmanager is new enough, unless the check is disabled
    pub async fn check_version(&self) -> Result<(), SdkManagerError> {
        if self.settings.skip_version_check {
            return Ok(());
        }

        let process = self.spawn(&["--version".to_string()])?;
        let output = self.finish("--version", process.wait().await?)?;

        let found = output
            .stdout
            .iter()
            .find_map(|line| parse_tool_version(line.trim()));

        match found {
            Some(version)
                if version.major < CMDLINE_TOOLS_MAJOR_CEILING
                    || version >= MINIMUM_SDKMANAGER_VERSION =>
            {
                debug!("sdkmanager version {}", version);
                Ok(())
            }
            other => Err(SdkManagerError::OutOfDate {
                found: other.map_or_else(|| "unknown".to_string(), |v| v.to_string()),
                required: MINIMUM_SDKMANAGER_VERSION,
            }),
        }
    }

    /// List installed and available packages
    pub async fn list(&self) -> Result<SdkManagerList, SdkManagerError> {
        self.check_version().await?;
        debug!("Listing SDK packages...");

        let args = self.args_with_options(&["--list"])?;
        let output = self.finish("--list", self.spawn(&args)?.wait().await?)?;

        Ok(self.parser.parse(&output.stdout))
    }

    /// Install SDK packages
    pub async fn install(&self, packages: &[String]) -> Result<(), SdkManagerError> {
        self.install_or_uninstall(true, packages).await
    }

    /// Uninstall SDK packages
    pub async fn uninstall(&self, packages: &[String]) -> Result<(), SdkManagerError> {
        self.install_or_uninstall(false, packages).await
    }

    async fn install_or_uninstall(
        &self,
        install: bool,
        packages: &[String],
    ) -> Result<(), SdkManagerError> {
        self.check_version().await?;

        let verb = if install { "Installing" } else { "Uninstalling" };
        info!("{} SDK packages: {:?}", verb, packages);

        let mut args = Vec::new();
        if !install {
            args.push("--uninstall".to_string());
        }
        args.extend(packages.iter().cloned());
        args.extend(self.standard_options()?);

        let mut process = self.spawn(&args)?;
        process.write_line("y").await?;
        self.finish(if install { "install" } else { "--uninstall" }, process.wait().await?)?;

        info!("SDK packages {}", if install { "installed" } else { "uninstalled" });
        Ok(())
    }

    /// Update all installed packages
    pub async fn update_all(&self) -> Result<(), SdkManagerError> {
        self.check_version().await?;
        info!("Updating all SDK packages...");

        let args = self.args_with_options(&["--update"])?;
        let mut process = self.spawn(&args)?;
        process.write_line("y").await?;
        self.finish("--update", process.wait().await?)?;

        info!("SDK packages updated successfully");
        Ok(())
    }

    /// Accept all licenses which are not yet accepted
    pub async fn accept_licenses(&self) -> Result<(), SdkManagerError> {
        self.check_version().await?;
        info!("Accepting Android SDK licenses...");

        let args = self.args_with_options(&["--licenses"])?;
        let mut process = self.spawn(&args)?;
        let status = process
            .answer_until_exit("y", LICENSE_ANSWER_INTERVAL)
            .await?;
        if !status.success() {
            warn!("License acceptance exited with {:?}", status.code());
        }
        self.finish("--licenses", process.wait().await?)?;

        info!("Licenses accepted");
        Ok(())
    }

    /// Raw usage text of a bare invocation
    pub async fn help(&self) -> Result<Vec<String>, SdkManagerError> {
        let output = self.spawn(&[])?.wait().await?;
        Ok(output.stdout.into_iter().chain(output.stderr).collect())
    }

    /// Check if a package path is installed
    pub async fn is_installed(&self, package: &str) -> Result<bool, SdkManagerError> {
        let list = self.list().await?;
        Ok(list.installed.iter().any(|p| p.path == package))
    }
}

/// Lenient version parse for `--version` output (`26.1.1`, `12.0`)
fn parse_tool_version(text: &str) -> Option<SdkVersion> {
    let parts = text
        .split('.')
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [major] => Some(SdkVersion::new(*major, 0, 0)),
        [major, minor] => Some(SdkVersion::new(*major, *minor, 0)),
        [major, minor, micro] => Some(SdkVersion::new(*major, *minor, *micro)),
        [major, minor, micro, preview] => {
            Some(SdkVersion::new(*major, *minor, *micro).with_preview(*preview))
        }
        _ => None,
    }
}
