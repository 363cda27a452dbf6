//! Controller records, shaped after the controller's JSON payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigletRecord {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub net_element_count: u32,
}

impl ConfigletRecord {
    pub fn reference(&self) -> ConfigletRef {
        ConfigletRef {
            name: self.name.clone(),
            key: self.key.clone(),
        }
    }
}

/// Name and key pair the controller uses to reference a configlet in
/// attach and detach requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigletRef {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDevice {
    pub host_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    pub work_order_id: String,
}

/// Inventory record of a network element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetElement {
    #[serde(default)]
    pub fqdn: String,
    #[serde(default, rename = "hostname")]
    pub host_name: String,
    #[serde(default)]
    pub system_mac_address: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub task_id_list: Vec<String>,
}

impl NetElement {
    pub fn has_outstanding_tasks(&self) -> bool {
        !self.task_id_list.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.fqdn == name || self.host_name == name
    }
}

/// Reply to an attach or detach. `task_ids` is absent when the controller
/// generated no work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    #[serde(default)]
    pub task_ids: Option<Vec<String>>,
}

impl ApplyResult {
    pub fn with_tasks<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task_ids: Some(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn task_ids(&self) -> &[String] {
        self.task_ids.as_deref().unwrap_or(&[])
    }
}

/// Status of one task as reported by the controller, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub status: String,
}
