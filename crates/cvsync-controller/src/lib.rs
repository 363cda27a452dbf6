//! Controller access for cvsync.
//!
//! This crate defines the capability surface the reconciliation engine needs
//! from a CloudVision controller (`ControllerClient`), the controller record
//! types it exchanges, connection configuration, a blocking HTTP client for the
//! controller's REST service, and an in-memory controller for tests and dry runs.

pub mod config;
pub mod http;
pub mod mock;
pub mod types;

pub use config::ControllerConfig;
pub use types::{
    AppliedDevice, ApplyResult, ConfigletRecord, ConfigletRef, NetElement, PendingTask, TaskInfo,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("controller error {code}: {message}")]
    Api { code: String, message: String },
    #[error("malformed controller response: {0}")]
    Serialization(String),
    #[error("controller config error: {0}")]
    Config(String),
}

impl ControllerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::NotFound(_))
    }
}

/// Operations the reconciliation engine issues against a controller.
///
/// Implementations own transport, session, and retry concerns. `NotFound` is
/// the only error variant callers branch on; everything else is propagated.
pub trait ControllerClient: Send + Sync {
    /// Look up a configlet. Returns `ControllerError::NotFound` when absent.
    fn get_configlet_by_name(&self, name: &str) -> Result<ConfigletRecord, ControllerError>;

    /// List every configlet known to the controller.
    fn get_configlets(&self) -> Result<Vec<ConfigletRecord>, ControllerError>;

    /// Devices the configlet is currently applied to, in controller order.
    fn get_devices_by_configlet(&self, name: &str) -> Result<Vec<AppliedDevice>, ControllerError>;

    /// Pending work orders generated for the named configlet or device.
    fn get_pending_tasks(&self, name: &str) -> Result<Vec<PendingTask>, ControllerError>;

    /// Create a configlet. Returns the controller-assigned key.
    fn add_configlet(&self, name: &str, content: &str) -> Result<String, ControllerError>;

    fn update_configlet(&self, name: &str, key: &str, content: &str)
        -> Result<(), ControllerError>;

    /// Delete a configlet. Returns the controller's status string (`"success"` on success).
    fn delete_configlet(&self, name: &str, key: &str) -> Result<String, ControllerError>;

    fn get_device_by_name(&self, host_name: &str) -> Result<NetElement, ControllerError>;

    fn apply_configlets_to_device(
        &self,
        label: &str,
        device: &NetElement,
        configlets: &[ConfigletRef],
    ) -> Result<ApplyResult, ControllerError>;

    fn remove_configlets_from_device(
        &self,
        label: &str,
        device: &NetElement,
        configlets: &[ConfigletRef],
    ) -> Result<ApplyResult, ControllerError>;

    /// Start execution of a pending task. Returns the controller's raw reply.
    fn execute_task(&self, task_id: &str) -> Result<serde_json::Value, ControllerError>;

    fn get_task_by_id(&self, task_id: &str) -> Result<TaskInfo, ControllerError>;
}
