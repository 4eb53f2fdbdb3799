//! SDK Tools Downloader
//!
//! Resolves a tools version against the repository manifest, downloads the
//! matching archive with checksum verification, and unpacks it over the SDK
//! root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Proxy, Url};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use droid_sdkmanager_core::{CoreError, RepositoryConfig, SdkManagerSettings, SdkVersion};

use crate::checksum;
use crate::platform::{HostPlatform, PlatformError};
use crate::repository::{ArchiveRecord, ManifestClient, ManifestError};

/// Download progress callback: `(downloaded, total)`; total is 0 when unknown
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Download error types
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status} downloading {url}")]
    Status { url: String, status: u16 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Archive entry escapes the destination: {0}")]
    UnsafeEntry(String),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Config(#[from] CoreError),
}

/// HTTP client with repository-friendly headers, timeout and proxy
pub fn build_client(
    settings: &SdkManagerSettings,
    repository: &RepositoryConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml"),
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("droid-sdkmanager/", env!("CARGO_PKG_VERSION"))),
    );

    let mut builder = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(repository.timeout_secs));

    if let Some(proxy) = settings.proxy_url() {
        debug!("Using proxy {}", proxy);
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// Android SDK tools downloader
pub struct SdkDownloader {
    client: Client,
    manifest: ManifestClient,
    settings: SdkManagerSettings,
    repository: RepositoryConfig,
    platform: HostPlatform,
}

impl SdkDownloader {
    /// Create a downloader for the current platform
    pub fn new(
        settings: SdkManagerSettings,
        repository: RepositoryConfig,
    ) -> Result<Self, DownloadError> {
        let client = build_client(&settings, &repository)?;
        let manifest = ManifestClient::new(client.clone(), &repository, &settings)?;

        Ok(Self {
            client,
            manifest,
            settings,
            repository,
            platform: HostPlatform::current()?,
        })
    }

    /// Download archives for another platform
    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> HostPlatform {
        self.platform
    }

    pub fn manifest(&self) -> &ManifestClient {
        &self.manifest
    }

    /// Pick the version to install.
    ///
    /// An explicit version is used as is. Otherwise the manifest's latest
    /// version is used, or the configured fallback when the manifest cannot be
    /// resolved and a fallback is set.
    pub async fn resolve_version(
        &self,
        specific: Option<SdkVersion>,
    ) -> Result<SdkVersion, DownloadError> {
        if let Some(version) = specific {
            return Ok(version);
        }

        match self.manifest.latest_version().await {
            Ok(version) => {
                info!("Latest SDK tools version is {}", version);
                Ok(version)
            }
            Err(e) => match self.repository.fallback() {
                Some(fallback) if e.is_network() => {
                    warn!("Repository unreachable ({}), falling back to {}", e, fallback);
                    Ok(fallback)
                }
                Some(fallback) => {
                    warn!("Repository manifest unusable ({}), falling back to {}", e, fallback);
                    Ok(fallback)
                }
                None => Err(e.into()),
            },
        }
    }

    /// Deterministic download location for a platform/version pair
    pub fn archive_path(&self, platform: HostPlatform, version: SdkVersion) -> PathBuf {
        self.repository
            .download_dir()
            .join(format!("android-sdk-tools-{}-{}.zip", platform, version))
    }

    /// Make sure a verified copy of `record` is on disk and return its path.
    ///
    /// A previously downloaded file with the right checksum is reused without
    /// touching the network; one with the wrong checksum is deleted first.
    pub async fn fetch_archive(
        &self,
        record: &ArchiveRecord,
        version: SdkVersion,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, DownloadError> {
        let path = self.archive_path(record.platform, version);

        if path.exists() {
            if checksum::verify(&path, &record.checksum).await? {
                info!("Reusing verified archive {:?}", path);
                return Ok(path);
            }
            debug!("Discarding stale archive {:?}", path);
            tokio::fs::remove_file(&path).await?;
        }

        self.download_file(&record.url, &path, progress).await?;

        let actual = checksum::compute(&path, record.checksum.kind).await?;
        if !record.checksum.matches(&actual) {
            tokio::fs::remove_file(&path).await?;
            return Err(DownloadError::ChecksumMismatch {
                path,
                expected: record.checksum.value.clone(),
                actual,
            });
        }

        Ok(path)
    }

    /// Stream a URL to a file with progress reporting
    pub async fn download_file(
        &self,
        url: &Url,
        target: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<(), DownloadError> {
        info!("Downloading {} to {:?}", url, target);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;

        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(ref callback) = progress {
                callback(downloaded, total_size);
            }
        }

        file.flush().await?;

        info!("Download complete: {:?}", target);
        Ok(())
    }

    /// Extract a ZIP archive over `target_dir`, creating directories and
    /// overwriting files. Returns the number of files written.
    pub async fn extract_over(archive: &Path, target_dir: &Path) -> Result<usize, DownloadError> {
        info!("Extracting {:?} to {:?}", archive, target_dir);

        let archive = archive.to_path_buf();
        let target_dir = target_dir.to_path_buf();

        // zip is synchronous
        tokio::task::spawn_blocking(move || -> Result<usize, DownloadError> {
            let file = std::fs::File::open(&archive)?;
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| DownloadError::Extraction(e.to_string()))?;

            let mut written = 0;
            for i in 0..zip.len() {
                let mut entry = zip
                    .by_index(i)
                    .map_err(|e| DownloadError::Extraction(e.to_string()))?;

                let relative = entry
                    .enclosed_name()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| DownloadError::UnsafeEntry(entry.name().to_string()))?;
                let outpath = target_dir.join(relative);

                if entry.is_dir() {
                    std::fs::create_dir_all(&outpath)?;
                    continue;
                }

                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                // a previous extraction may have left it read-only
                match std::fs::remove_file(&outpath) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
                let mut outfile = std::fs::File::create(&outpath)?;
                std::io::copy(&mut entry, &mut outfile)?;
                written += 1;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = entry.unix_mode() {
                        std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
                    }
                }
            }

            Ok(written)
        })
        .await
        .map_err(|e| DownloadError::Extraction(e.to_string()))?
    }

    /// Download the SDK tools and unpack them.
    ///
    /// `destination` defaults to the configured SDK root; `specific` defaults
    /// to the latest published version. Returns the directory extracted into.
    pub async fn download_sdk(
        &self,
        destination: Option<&Path>,
        specific: Option<SdkVersion>,
        progress: Option<ProgressCallback>,
    ) -> Result<PathBuf, DownloadError> {
        let version = self.resolve_version(specific).await?;
        let record = self.manifest.archive_for(version, self.platform).await?;
        let archive = self.fetch_archive(&record, version, progress).await?;

        let root = match destination {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => std::env::current_dir()?.join(dir),
            None => self.settings.absolute_sdk_root()?,
        };
        tokio::fs::create_dir_all(&root).await?;

        let files = Self::extract_over(&archive, &root).await?;

        if !self.repository.keep_archive {
            if let Err(e) = tokio::fs::remove_file(&archive).await {
                warn!("Could not remove {:?}: {}", archive, e);
            }
        }

        info!(
            "Android SDK tools {} ({} files) installed to {:?}",
            version, files, root
        );
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use sha1::{Digest, Sha1};
    use std::io::Write;
    use zip::write::FileOptions;

    fn fixture_zip(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, contents) in entries {
            match contents {
                Some(text) => {
                    zip.start_file(*name, FileOptions::default()).unwrap();
                    zip.write_all(text.as_bytes()).unwrap();
                }
                None => zip.add_directory(*name, FileOptions::default()).unwrap(),
            }
        }
        zip.finish().unwrap().into_inner()
    }

    fn tools_zip() -> Vec<u8> {
        fixture_zip(&[
            ("tools/", None),
            ("tools/bin/", None),
            ("tools/bin/sdkmanager", Some("#!/bin/sh\necho 26.1.1\n")),
            ("tools/source.properties", Some("Pkg.Revision=25.2.5\n")),
        ])
    }

    fn sha1_hex(bytes: &[u8]) -> String {
        hex::encode(Sha1::digest(bytes))
    }

    fn manifest_xml(checksum: &str, size: usize) -> String {
        format!(
            r#"<sdk:sdk-repository xmlns:sdk="http://schemas.android.com/sdk/android/repo/repository2/01">
    <remotePackage path="tools">
        <revision><major>25</major><minor>2</minor><micro>3</micro></revision>
        <archives><archive>
            <complete><size>1</size><checksum>{old}</checksum><url>tools_r25.2.3-linux.zip</url></complete>
            <host-os>linux</host-os>
        </archive></archives>
    </remotePackage>
    <remotePackage path="tools">
        <revision><major>25</major><minor>2</minor><micro>5</micro></revision>
        <archives><archive>
            <complete><size>{size}</size><checksum>{checksum}</checksum><url>tools_r25.2.5-linux.zip</url></complete>
            <host-os>linux</host-os>
        </archive></archives>
    </remotePackage>
</sdk:sdk-repository>"#,
            old = "0".repeat(40),
            size = size,
            checksum = checksum,
        )
    }

    fn downloader(server: &MockServer, download_dir: &Path) -> SdkDownloader {
        let repository = RepositoryConfig {
            url: server.url("/repository2-1.xml"),
            download_dir: Some(download_dir.to_path_buf()),
            ..RepositoryConfig::default()
        };
        SdkDownloader::new(SdkManagerSettings::default(), repository)
            .unwrap()
            .with_platform(HostPlatform::Linux)
    }

    #[tokio::test]
    async fn test_download_verify_and_extract() {
        let archive = tools_zip();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repository2-1.xml");
                then.status(200).body(manifest_xml(&sha1_hex(&archive), archive.len()));
            })
            .await;
        let zip_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/tools_r25.2.5-linux.zip");
                then.status(200).body(&archive);
            })
            .await;

        let downloads = tempfile::tempdir().unwrap();
        let sdk = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, downloads.path());

        let reported = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let seen = reported.clone();
        let progress: ProgressCallback = Box::new(move |done, _total| {
            seen.store(done, std::sync::atomic::Ordering::SeqCst);
        });

        let root = downloader
            .download_sdk(Some(sdk.path()), None, Some(progress))
            .await
            .unwrap();

        assert_eq!(root, sdk.path());
        assert!(sdk.path().join("tools/bin/sdkmanager").is_file());
        assert_eq!(
            std::fs::read_to_string(sdk.path().join("tools/source.properties")).unwrap(),
            "Pkg.Revision=25.2.5\n"
        );
        assert_eq!(
            reported.load(std::sync::atomic::Ordering::SeqCst),
            archive.len() as u64
        );

        let kept = downloader.archive_path(HostPlatform::Linux, SdkVersion::new(25, 2, 5));
        assert!(kept.ends_with("android-sdk-tools-linux-25.2.5.zip"));
        assert!(kept.is_file());
        zip_mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_verified_cached_archive_skips_network() {
        let archive = tools_zip();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repository2-1.xml");
                then.status(200).body(manifest_xml(&sha1_hex(&archive), archive.len()));
            })
            .await;
        let zip_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/tools_r25.2.5-linux.zip");
                then.status(200).body(&archive);
            })
            .await;

        let downloads = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, downloads.path());
        let version = SdkVersion::new(25, 2, 5);
        let cached = downloader.archive_path(HostPlatform::Linux, version);
        std::fs::write(&cached, &archive).unwrap();

        let record = downloader
            .manifest()
            .archive_for(version, HostPlatform::Linux)
            .await
            .unwrap();
        let path = downloader.fetch_archive(&record, version, None).await.unwrap();

        assert_eq!(path, cached);
        zip_mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_stale_cached_archive_is_replaced() {
        let archive = tools_zip();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repository2-1.xml");
                then.status(200).body(manifest_xml(&sha1_hex(&archive), archive.len()));
            })
            .await;
        let zip_mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/tools_r25.2.5-linux.zip");
                then.status(200).body(&archive);
            })
            .await;

        let downloads = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, downloads.path());
        let version = SdkVersion::new(25, 2, 5);
        let cached = downloader.archive_path(HostPlatform::Linux, version);
        std::fs::write(&cached, b"truncated download").unwrap();

        let record = downloader
            .manifest()
            .archive_for(version, HostPlatform::Linux)
            .await
            .unwrap();
        downloader.fetch_archive(&record, version, None).await.unwrap();

        assert_eq!(std::fs::read(&cached).unwrap(), archive);
        zip_mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_checksum_mismatch_aborts_before_extraction() {
        let archive = tools_zip();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repository2-1.xml");
                then.status(200).body(manifest_xml(&"f".repeat(40), archive.len()));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/tools_r25.2.5-linux.zip");
                then.status(200).body(&archive);
            })
            .await;

        let downloads = tempfile::tempdir().unwrap();
        let sdk = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, downloads.path());

        let err = downloader
            .download_sdk(Some(sdk.path()), None, None)
            .await
            .unwrap_err();

        match err {
            DownloadError::ChecksumMismatch { expected, actual, .. } => {
                assert_eq!(expected, "f".repeat(40));
                assert_eq!(actual, sha1_hex(&archive));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!downloader
            .archive_path(HostPlatform::Linux, SdkVersion::new(25, 2, 5))
            .exists());
        assert!(!sdk.path().join("tools").exists());
    }

    #[tokio::test]
    async fn test_fallback_when_repository_unreachable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repository2-1.xml");
                then.status(500);
            })
            .await;

        let downloads = tempfile::tempdir().unwrap();
        let downloader = downloader(&server, downloads.path());
        assert_eq!(
            downloader.resolve_version(None).await.unwrap(),
            SdkVersion::new(25, 2, 5)
        );
        assert_eq!(
            downloader
                .resolve_version(Some(SdkVersion::new(24, 4, 1)))
                .await
                .unwrap(),
            SdkVersion::new(24, 4, 1)
        );
    }

    #[tokio::test]
    async fn test_no_fallback_surfaces_manifest_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repository2-1.xml");
                then.status(200).body("<broken");
            })
            .await;

        let downloads = tempfile::tempdir().unwrap();
        let repository = RepositoryConfig {
            url: server.url("/repository2-1.xml"),
            download_dir: Some(downloads.path().to_path_buf()),
            use_fallback: false,
            ..RepositoryConfig::default()
        };
        let downloader = SdkDownloader::new(SdkManagerSettings::default(), repository).unwrap();

        let err = downloader.resolve_version(None).await.unwrap_err();
        assert!(matches!(err, DownloadError::Manifest(ref e) if !e.is_network()));
    }

    #[tokio::test]
    async fn test_extract_over_existing_tree() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("fixture.zip");
        std::fs::write(
            &archive,
            fixture_zip(&[("a/b.txt", Some("new")), ("a/c/", None)]),
        )
        .unwrap();

        let root = scratch.path().join("root");
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::fs::write(root.join("a/b.txt"), "old").unwrap();
        std::fs::write(root.join("a/keep.txt"), "untouched").unwrap();

        let written = SdkDownloader::extract_over(&archive, &root).await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(std::fs::read_to_string(root.join("a/b.txt")).unwrap(), "new");
        assert!(root.join("a/c").is_dir());
        assert_eq!(
            std::fs::read_to_string(root.join("a/keep.txt")).unwrap(),
            "untouched"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reextract_over_read_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("readonly.zip");
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("tools/NOTICE.txt", FileOptions::default().unix_permissions(0o444))
            .unwrap();
        zip.write_all(b"notice").unwrap();
        std::fs::write(&archive, zip.finish().unwrap().into_inner()).unwrap();

        let root = scratch.path().join("root");
        SdkDownloader::extract_over(&archive, &root).await.unwrap();
        let notice = root.join("tools/NOTICE.txt");
        assert_eq!(
            std::fs::metadata(&notice).unwrap().permissions().mode() & 0o777,
            0o444
        );

        SdkDownloader::extract_over(&archive, &root).await.unwrap();
        assert_eq!(std::fs::read_to_string(&notice).unwrap(), "notice");
    }

    #[tokio::test]
    async fn test_extract_rejects_escaping_entries() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("evil.zip");
        std::fs::write(&archive, fixture_zip(&[("../evil.txt", Some("x"))])).unwrap();

        let root = scratch.path().join("root");
        std::fs::create_dir_all(&root).unwrap();

        let err = SdkDownloader::extract_over(&archive, &root).await.unwrap_err();
        assert!(matches!(err, DownloadError::UnsafeEntry(ref name) if name == "../evil.txt"));
        assert!(!scratch.path().join("evil.txt").exists());
    }
}
