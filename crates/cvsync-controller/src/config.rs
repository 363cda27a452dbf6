use crate::ControllerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit controller config file.
pub const CONF_ENV: &str = "CVSYNC_CONF";

const CONF_FILE_NAME: &str = ".cloudvision.json";
const FLASH_CONF_PATH: &str = "/mnt/flash/cloudvision.json";

/// Controller endpoints and credentials.
///
/// `nodes` are tried in order at login; the first reachable node serves the
/// session. A node is either a host (`192.0.2.101`, implies `https://`) or a
/// full base URL.
#[derive(Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub nodes: Vec<String>,
    pub username: String,
    pub password: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_poll_interval() -> u64 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("nodes", &self.nodes)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

impl ControllerConfig {
    pub fn new(nodes: &[&str], username: &str, password: &str) -> Self {
        Self {
            nodes: nodes.iter().map(|n| (*n).to_owned()).collect(),
            username: username.to_owned(),
            password: password.to_owned(),
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            insecure_tls: false,
        }
    }

    /// Load config from the first existing file on the search path.
    pub fn load_default() -> Result<Self, ControllerError> {
        let conf_env = std::env::var(CONF_ENV).ok();
        let home = std::env::var("HOME").ok();
        let candidates = search_path(conf_env.as_deref(), home.as_deref());
        let found = candidates.iter().find(|p| p.is_file()).ok_or_else(|| {
            ControllerError::Config(format!(
                "no controller config found in search path: {}",
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        tracing::debug!("loading controller config from {}", found.display());
        Self::load(found)
    }

    pub fn load(path: &Path) -> Result<Self, ControllerError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ControllerError::Config(format!("invalid controller config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.nodes.iter().all(|n| n.trim().is_empty()) {
            return Err(ControllerError::Config(
                "at least one controller node is required".to_owned(),
            ));
        }
        if self.username.is_empty() {
            return Err(ControllerError::Config("username must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Base URLs for every configured node, in login order.
    pub fn node_urls(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(|n| {
                if n.starts_with("http://") || n.starts_with("https://") {
                    n.trim_end_matches('/').to_owned()
                } else {
                    format!("https://{n}")
                }
            })
            .collect()
    }
}

/// Candidate config locations, highest priority first.
fn search_path(conf_env: Option<&str>, home: Option<&str>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(explicit) = conf_env.filter(|p| !p.is_empty()) {
        paths.push(PathBuf::from(explicit));
    }
    if let Some(home) = home {
        paths.push(PathBuf::from(home).join(CONF_FILE_NAME));
        paths.push(PathBuf::from(CONF_FILE_NAME));
    }
    paths.push(PathBuf::from(FLASH_CONF_PATH));
    paths
}
