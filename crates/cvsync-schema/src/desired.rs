use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Task-completion deadline applied when the manifest does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Whether the configlet should exist on the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ensure::Present => f.write_str("present"),
            Ensure::Absent => f.write_str("absent"),
        }
    }
}

/// Desired configuration of a single configlet, owned by the caller and
/// passed to the engine per call.
///
/// `containers` keeps declaration order (attach order on create) and holds no
/// duplicates once produced by manifest validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub name: String,
    pub content: String,
    pub containers: Vec<String>,
    pub auto_run: bool,
    pub timeout_secs: u64,
    pub ensure: Ensure,
}

impl DesiredState {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            containers: Vec::new(),
            auto_run: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            ensure: Ensure::Present,
        }
    }

    #[must_use]
    pub fn with_containers<I, S>(mut self, containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.containers = containers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_auto_run(mut self, auto_run: bool) -> Self {
        self.auto_run = auto_run;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_ensure(mut self, ensure: Ensure) -> Self {
        self.ensure = ensure;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
