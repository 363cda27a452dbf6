use cvsync_schema::DesiredState;
use serde::Serialize;
use std::collections::HashSet;

/// Configlet state as read from the controller in one reconciliation pass.
///
/// Never cached: every pass reads it fresh because other actors may change
/// the controller between passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObservedState {
    pub name: String,
    pub exists: bool,
    pub key: String,
    pub content: String,
    pub containers: Vec<String>,
    pub attached_device_count: u32,
}

impl ObservedState {
    pub fn absent(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }
}

/// Containers to attach and detach to converge the attachment set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttachmentDelta {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl AttachmentDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute `desired - observed` and `observed - desired` over container ids.
///
/// Results keep the order of their source list (desired for `to_add`,
/// observed for `to_remove`) and contain no duplicates.
pub fn diff(desired: &DesiredState, observed: &ObservedState) -> AttachmentDelta {
    AttachmentDelta {
        to_add: difference(&desired.containers, &observed.containers),
        to_remove: difference(&observed.containers, &desired.containers),
    }
}

fn difference(from: &[String], minus: &[String]) -> Vec<String> {
    let exclude: HashSet<&str> = minus.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    from.iter()
        .filter(|c| !exclude.contains(c.as_str()) && seen.insert(c.as_str()))
        .cloned()
        .collect()
}

/// Content drift: exact inequality once leading and trailing whitespace is
/// trimmed. Internal whitespace differences count as drift.
pub fn content_drifted(desired: &str, observed: &str) -> bool {
    desired.trim() != observed.trim()
}
