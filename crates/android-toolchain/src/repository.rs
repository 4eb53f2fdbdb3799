//! Repository Manifest
//!
//! Fetches Google's `repository2-1.xml`, picks the `remotePackage` nodes for
//! the SDK tools and maps each one to a version and its per-platform archives.
//!
//! Failures are reported as [`ManifestError`], which keeps transport problems
//! apart from malformed documents. Falling back to a pinned version is left to
//! the caller.

use reqwest::{Client, Url};
use roxmltree::{Document, Node};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use droid_sdkmanager_core::{Channel, RepositoryConfig, SdkManagerSettings, SdkVersion};

use crate::checksum::{Checksum, ChecksumKind};
use crate::platform::{HostPlatform, PlatformError};

/// One downloadable variant of a package
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveRecord {
    pub platform: HostPlatform,
    pub size: u64,
    pub checksum: Checksum,
    #[serde(serialize_with = "serialize_url")]
    pub url: Url,
}

/// A published revision of the SDK tools
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ToolsPackage {
    pub version: SdkVersion,
    #[serde(skip)]
    pub channel: Channel,
    pub archives: Vec<ArchiveRecord>,
}

impl ToolsPackage {
    pub fn archive_for(&self, platform: HostPlatform) -> Option<&ArchiveRecord> {
        self.archives.iter().find(|a| a.platform == platform)
    }
}

fn serialize_url<S: serde::Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_str())
}

/// Malformed manifest content
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("Missing <{element}> under <{parent}>")]
    MissingNode { element: &'static str, parent: String },
    #[error("Invalid value '{value}' in <{element}>")]
    InvalidValue { element: &'static str, value: String },
    #[error("Invalid archive URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Manifest resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },
    #[error("Malformed repository manifest: {0}")]
    Parse(#[from] ParseError),
    #[error("No '{0}' packages in the repository manifest")]
    Empty(String),
    #[error("Version {0} is not published")]
    VersionNotFound(SdkVersion),
    #[error("Version {version} has no archive for {platform}")]
    NoArchiveForPlatform {
        version: SdkVersion,
        platform: HostPlatform,
    },
}

impl ManifestError {
    /// The manifest could not be fetched at all
    pub fn is_network(&self) -> bool {
        matches!(self, ManifestError::Network(_) | ManifestError::Status { .. })
    }
}

/// Parsed package table
#[derive(Debug, Clone, Default)]
pub struct RepositoryManifest {
    packages: Vec<ToolsPackage>,
}

impl RepositoryManifest {
    /// Parse a manifest, keeping `package_path` packages published on `channel` or a more stable one.
    /// Relative archive URLs resolve against `base`.
    pub fn parse(
        xml: &str,
        base: &Url,
        package_path: &str,
        channel: Channel,
    ) -> Result<Self, ParseError> {
        let doc = Document::parse(xml)?;

        let mut packages = Vec::new();
        for node in doc
            .descendants()
            .filter(|n| n.has_tag_name("remotePackage") && n.attribute("path") == Some(package_path))
        {
            let package = parse_package(node, base)?;
            if package.channel > channel {
                debug!("Skipping {} on channel {:?}", package.version, package.channel);
                continue;
            }
            packages.push(package);
        }

        Ok(Self { packages })
    }

    pub fn packages(&self) -> &[ToolsPackage] {
        &self.packages
    }

    pub fn latest_version(&self) -> Option<SdkVersion> {
        self.packages.iter().map(|p| p.version).max()
    }

    pub fn package(&self, version: SdkVersion) -> Option<&ToolsPackage> {
        self.packages.iter().find(|p| p.version == version)
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, element: &'static str) -> Result<Node<'a, 'input>, ParseError> {
    node.children()
        .find(|c| c.has_tag_name(element))
        .ok_or_else(|| ParseError::MissingNode {
            element,
            parent: node.tag_name().name().to_string(),
        })
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().map(str::trim).unwrap_or("")
}

fn number<T: std::str::FromStr>(node: Node, element: &'static str) -> Result<T, ParseError> {
    let value = text(child(node, element)?);
    value.parse().map_err(|_| ParseError::InvalidValue {
        element,
        value: value.to_string(),
    })
}

fn parse_revision(revision: Node) -> Result<SdkVersion, ParseError> {
    let mut version = SdkVersion::new(
        number(revision, "major")?,
        number(revision, "minor")?,
        number(revision, "micro")?,
    );
    if revision.children().any(|c| c.has_tag_name("preview")) {
        version = version.with_preview(number(revision, "preview")?);
    }
    Ok(version)
}

fn parse_channel_ref(node: Node) -> Result<Channel, ParseError> {
    let reference = node.attribute("ref").unwrap_or("");
    reference
        .strip_prefix("channel-")
        .and_then(|n| n.parse::<u8>().ok())
        .and_then(Channel::from_index)
        .ok_or_else(|| ParseError::InvalidValue {
            element: "channelRef",
            value: reference.to_string(),
        })
}

fn parse_package(node: Node, base: &Url) -> Result<ToolsPackage, ParseError> {
    let version = parse_revision(child(node, "revision")?)?;

    let channel = match node.children().find(|c| c.has_tag_name("channelRef")) {
        Some(channel_ref) => parse_channel_ref(channel_ref)?,
        None => Channel::Stable,
    };

    child(node, "archives")?;
    let archives = node
        .children()
        .filter(|c| c.has_tag_name("archives"))
        .flat_map(|list| list.children().filter(|c| c.has_tag_name("archive")))
        .map(|archive| parse_archive(archive, base))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ToolsPackage {
        version,
        channel,
        archives,
    })
}

fn parse_archive(archive: Node, base: &Url) -> Result<ArchiveRecord, ParseError> {
    let complete = child(archive, "complete")?;
    let platform: HostPlatform = text(child(archive, "host-os")?).parse()?;
    let size = number(complete, "size")?;

    let checksum_node = child(complete, "checksum")?;
    let digest = text(checksum_node);
    let kind = checksum_node
        .attribute("type")
        .and_then(ChecksumKind::from_attribute)
        .or_else(|| ChecksumKind::from_hex_length(digest.len()))
        .ok_or_else(|| ParseError::InvalidValue {
            element: "checksum",
            value: digest.to_string(),
        })?;

    let href = text(child(complete, "url")?);
    let url = base.join(href).map_err(|e| ParseError::InvalidUrl {
        value: href.to_string(),
        reason: e.to_string(),
    })?;

    Ok(ArchiveRecord {
        platform,
        size,
        checksum: Checksum::new(kind, digest),
        url,
    })
}

/// Fetches the repository manifest once and answers version/archive queries from it
pub struct ManifestClient {
    client: Client,
    url: Url,
    package_path: String,
    channel: Channel,
    cache: OnceCell<RepositoryManifest>,
}

impl ManifestClient {
    /// Create a client for the configured repository
    pub fn new(
        client: Client,
        repository: &RepositoryConfig,
        settings: &SdkManagerSettings,
    ) -> Result<Self, ManifestError> {
        let mut url = Url::parse(&repository.url).map_err(|e| ParseError::InvalidUrl {
            value: repository.url.clone(),
            reason: e.to_string(),
        })?;

        if settings.no_https && url.scheme() == "https" {
            url.set_scheme("http").map_err(|_| ParseError::InvalidUrl {
                value: repository.url.clone(),
                reason: "cannot downgrade to http".to_string(),
            })?;
        }

        Ok(Self {
            client,
            url,
            package_path: repository.package_path.clone(),
            channel: settings.channel,
            cache: OnceCell::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The parsed manifest; fetched on first use, cached only on success
    pub async fn manifest(&self) -> Result<&RepositoryManifest, ManifestError> {
        self.cache.get_or_try_init(|| self.fetch()).await
    }

    async fn fetch(&self) -> Result<RepositoryManifest, ManifestError> {
        info!("Fetching repository manifest from {}", self.url);

        let response = self.client.get(self.url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ManifestError::Status {
                url: self.url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        let manifest = RepositoryManifest::parse(&body, &self.url, &self.package_path, self.channel)?;

        info!(
            "Repository lists {} '{}' packages",
            manifest.packages().len(),
            self.package_path
        );
        Ok(manifest)
    }

    /// Every published tools package on the configured channel
    pub async fn available_tools(&self) -> Result<&[ToolsPackage], ManifestError> {
        Ok(self.manifest().await?.packages())
    }

    /// Highest published version
    pub async fn latest_version(&self) -> Result<SdkVersion, ManifestError> {
        self.manifest()
            .await?
            .latest_version()
            .ok_or_else(|| ManifestError::Empty(self.package_path.clone()))
    }

    /// Archive of `version` for `platform`
    pub async fn archive_for(
        &self,
        version: SdkVersion,
        platform: HostPlatform,
    ) -> Result<ArchiveRecord, ManifestError> {
        let package = self
            .manifest()
            .await?
            .package(version)
            .ok_or(ManifestError::VersionNotFound(version))?;

        package
            .archive_for(platform)
            .cloned()
            .ok_or(ManifestError::NoArchiveForPlatform { version, platform })
    }
}
