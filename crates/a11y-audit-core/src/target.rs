use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Absolute `http(s)` URL of the page under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget(Url);

impl ScanTarget {
    /// Parse and validate a target URL.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TargetError::Empty);
        }
        let url = Url::parse(trimmed).map_err(|err| TargetError::Malformed {
            url: trimmed.to_string(),
            reason: err.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(TargetError::UnsupportedScheme {
                    url: trimmed.to_string(),
                    scheme: other.to_string(),
                })
            }
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(TargetError::MissingHost {
                url: trimmed.to_string(),
            });
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl FromStr for ScanTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ScanTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Reasons a scan target is rejected before any browser work starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("scan target must not be blank")]
    Empty,
    #[error("scan target `{url}` is not a valid URL: {reason}")]
    Malformed { url: String, reason: String },
    #[error("scan target `{url}` uses unsupported scheme `{scheme}` (expected http or https)")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("scan target `{url}` has no host")]
    MissingHost { url: String },
}
