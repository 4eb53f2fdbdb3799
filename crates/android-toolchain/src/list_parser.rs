//! Parsing of `sdkmanager --list --verbose` output.
//!
//! The output format is not a stable contract and changes between sdkmanager
//! releases, so parsing is best-effort and sits behind [`ListOutputParser`].

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// A package sdkmanager reports as installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub path: String,
    pub version: String,
    pub description: String,
    pub location: PathBuf,
}

/// A package available for installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailablePackage {
    pub path: String,
    pub version: String,
    pub description: String,
}

/// Installed and available packages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SdkManagerList {
    pub installed: Vec<InstalledPackage>,
    pub available: Vec<AvailablePackage>,
}

/// Turns captured sdkmanager stdout into a package listing
pub trait ListOutputParser: Send + Sync {
    fn parse(&self, lines: &[String]) -> SdkManagerList;
}

fn description_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\s+Description:\s+(?P<desc>.*?)\s*$").unwrap())
}

fn version_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\s+Version:\s+(?P<ver>.*?)\s*$").unwrap())
}

fn location_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\s+Installed Location:\s+(?P<loc>.*?)\s*$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Installed,
    Available,
    Updates,
}

#[derive(Debug, Default)]
struct PendingPackage {
    path: String,
    version: String,
    description: String,
    location: String,
}

struct ListBuilder {
    section: Section,
    pending: Option<PendingPackage>,
    list: SdkManagerList,
}

impl ListBuilder {
    fn flush(&mut self) {
        let Some(pkg) = self.pending.take() else {
            return;
        };

        match self.section {
            Section::Installed => self.list.installed.push(InstalledPackage {
                path: pkg.path,
                version: pkg.version,
                description: pkg.description,
                location: PathBuf::from(pkg.location),
            }),
            Section::Available => self.list.available.push(AvailablePackage {
                path: pkg.path,
                version: pkg.version,
                description: pkg.description,
            }),
            Section::Preamble | Section::Updates => {}
        }
    }

    fn enter(&mut self, section: Section) {
        self.flush();
        self.section = section;
    }
}

/// Parser for the `--verbose` listing, where each package is a header line
/// followed by indented `Description:` / `Version:` / `Installed Location:`
/// lines and a blank separator.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerboseListParser;

impl ListOutputParser for VerboseListParser {
    fn parse(&self, lines: &[String]) -> SdkManagerList {
        let mut builder = ListBuilder {
            section: Section::Preamble,
            pending: None,
            list: SdkManagerList::default(),
        };

        for raw in lines {
            let line = raw.trim_end();

            if line.starts_with("------") {
                continue;
            }

            let lower = line.to_lowercase();
            if lower.contains("installed packages:") {
                builder.enter(Section::Installed);
                continue;
            } else if lower.contains("available packages:") {
                builder.enter(Section::Available);
                continue;
            } else if lower.contains("available updates:") {
                builder.enter(Section::Updates);
                continue;
            }

            if !matches!(builder.section, Section::Installed | Section::Available) {
                continue;
            }

            let indented = line.starts_with(' ') || line.starts_with('\t');

            let Some(pkg) = builder.pending.as_mut() else {
                if !line.is_empty() && !indented {
                    builder.pending = Some(PendingPackage {
                        path: line.trim().to_string(),
                        ..PendingPackage::default()
                    });
                }
                continue;
            };

            if let Some(caps) = description_regex().captures(line) {
                pkg.description = caps["desc"].to_string();
            } else if let Some(caps) = version_regex().captures(line) {
                pkg.version = caps["ver"].to_string();
            } else if let Some(caps) = location_regex().captures(line) {
                pkg.location = caps["loc"].to_string();
            } else {
                builder.flush();
                // no blank separator: this line already starts the next package
                if !line.is_empty() && !indented {
                    builder.pending = Some(PendingPackage {
                        path: line.trim().to_string(),
                        ..PendingPackage::default()
                    });
                }
            }
        }

        builder.flush();
        builder.list
    }
}
