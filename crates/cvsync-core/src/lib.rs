//! Reconciliation engine for CloudVision configlets.
//!
//! This crate ties the desired state from `cvsync-schema` to a controller from
//! `cvsync-controller`: drift detection between desired and observed state
//! (`drift`), the task-completion state machine (`waiter`), the lifecycle
//! operations (`Engine`), and the reconcile pass that picks which of them to
//! run (`reconcile`).

pub mod drift;
pub mod engine;
pub mod reconcile;
pub mod waiter;

pub use drift::{content_drifted, diff, AttachmentDelta, ObservedState};
pub use engine::{Engine, RunOptions, ATTACH_LABEL, DETACH_LABEL};
pub use reconcile::{plan, Action, Plan, ReconcileReport};
pub use waiter::{
    Clock, ManualClock, StatusClass, SystemClock, Task, TaskStatus, TaskWaiter,
    DEFAULT_POLL_INTERVAL,
};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("controller error: {0}")]
    Controller(#[from] cvsync_controller::ControllerError),
    #[error("manifest error: {0}")]
    Manifest(#[from] cvsync_schema::ManifestError),
    #[error("configlet not found: {0}")]
    ConfigletNotFound(String),
    #[error("failed to create configlet {name}: {reason}")]
    CreationFailed { name: String, reason: String },
    #[error("failed to delete configlet {name}: controller reported '{status}'")]
    DeletionFailed { name: String, status: String },
    #[error(
        "device {device} has outstanding tasks ({}), refusing to detach configlet {configlet}",
        .task_ids.join(", ")
    )]
    BusyTarget {
        device: String,
        configlet: String,
        task_ids: Vec<String>,
    },
    #[error("task {task_id} failed with status '{status}'")]
    TaskFailed { task_id: String, status: String },
    #[error("task {task_id} timed out after {elapsed:?} in status '{last_status}'")]
    TaskTimeout {
        task_id: String,
        elapsed: Duration,
        last_status: String,
    },
}

impl CoreError {
    /// True for failures of controller-side tasks (failed or timed out).
    pub fn is_task_error(&self) -> bool {
        matches!(
            self,
            CoreError::TaskFailed { .. } | CoreError::TaskTimeout { .. }
        )
    }
}
