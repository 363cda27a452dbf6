use crate::desired::{DesiredState, Ensure, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("configlet.name must not be empty")]
    EmptyName,
    #[error("configlet.name must not have surrounding whitespace: '{0}'")]
    UntrimmedName(String),
    #[error("configlet.containers entries must not be empty")]
    EmptyContainer,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestV1 {
    pub manifest_version: u32,
    pub configlet: ConfigletSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigletSection {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub auto_run: bool,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub ensure: Ensure,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ManifestV1 {
    /// Validate the manifest and turn it into the engine's desired state.
    ///
    /// Duplicate containers collapse to their first occurrence.
    pub fn into_desired(self) -> Result<DesiredState, ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }

        let section = self.configlet;
        if section.name.trim().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        if section.name.trim() != section.name {
            return Err(ManifestError::UntrimmedName(section.name));
        }

        let mut seen = HashSet::new();
        let mut containers = Vec::with_capacity(section.containers.len());
        for c in section.containers {
            let c = c.trim().to_owned();
            if c.is_empty() {
                return Err(ManifestError::EmptyContainer);
            }
            if seen.insert(c.clone()) {
                containers.push(c);
            }
        }

        Ok(DesiredState {
            name: section.name,
            content: section.content,
            containers,
            auto_run: section.auto_run,
            timeout_secs: section.timeout,
            ensure: section.ensure,
        })
    }
}

pub fn parse_manifest_str(input: &str) -> Result<ManifestV1, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ManifestV1, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
