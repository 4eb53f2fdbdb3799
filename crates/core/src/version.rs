//! SDK revision numbers
//!
//! Repository revisions are `major.minor.micro` with an optional fourth
//! `preview` part. Ordering is numeric on each part.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// A three- or four-part numeric SDK version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SdkVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    /// `None` sorts before any explicit preview number
    pub preview: Option<u32>,
}

impl SdkVersion {
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            preview: None,
        }
    }

    pub const fn with_preview(mut self, preview: u32) -> Self {
        self.preview = Some(preview);
        self
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(preview) = self.preview {
            write!(f, ".{}", preview)?;
        }
        Ok(())
    }
}

impl FromStr for SdkVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidVersion {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<u32>().map_err(|_| invalid("non-numeric component")))
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [major, minor, micro] => Ok(Self::new(*major, *minor, *micro)),
            [major, minor, micro, preview] => {
                Ok(Self::new(*major, *minor, *micro).with_preview(*preview))
            }
            _ => Err(invalid("expected three or four components")),
        }
    }
}

impl Serialize for SdkVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SdkVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
