//! Reconcile pass: read, plan, apply.
//!
//! [`plan`] is pure and decides which lifecycle operations converge the
//! observed state onto the desired one. [`Engine::reconcile`] reads fresh
//! state, plans, and runs the actions in order, stopping at the first error.

use crate::drift::{content_drifted, diff, AttachmentDelta, ObservedState};
use crate::engine::{Engine, RunOptions};
use crate::waiter::Task;
use crate::CoreError;
use cvsync_controller::ControllerClient;
use cvsync_schema::{DesiredState, Ensure};
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Create { containers: Vec<String> },
    Destroy { containers: Vec<String> },
    UpdateContent,
    UpdateAttachments { delta: AttachmentDelta },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create { containers } if containers.is_empty() => f.write_str("create"),
            Action::Create { containers } => write!(f, "create, attach to {}", containers.join(", ")),
            Action::Destroy { containers } if containers.is_empty() => f.write_str("destroy"),
            Action::Destroy { containers } => {
                write!(f, "detach from {}, destroy", containers.join(", "))
            }
            Action::UpdateContent => f.write_str("update content"),
            Action::UpdateAttachments { delta } => {
                f.write_str("update attachments")?;
                if !delta.to_remove.is_empty() {
                    write!(f, ", detach from {}", delta.to_remove.join(", "))?;
                }
                if !delta.to_add.is_empty() {
                    write!(f, ", attach to {}", delta.to_add.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Plan {
    /// True when observed state already matches the desired state.
    pub fn is_converged(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Decide the actions that move `observed` to `desired`.
///
/// Content and attachments are independent: a present configlet may need
/// either, both, or neither.
pub fn plan(desired: &DesiredState, observed: &ObservedState) -> Plan {
    let mut actions = Vec::new();
    match (desired.ensure, observed.exists) {
        (Ensure::Present, false) => actions.push(Action::Create {
            containers: desired.containers.clone(),
        }),
        (Ensure::Absent, true) => actions.push(Action::Destroy {
            containers: observed.containers.clone(),
        }),
        (Ensure::Absent, false) => {}
        (Ensure::Present, true) => {
            if content_drifted(&desired.content, &observed.content) {
                actions.push(Action::UpdateContent);
            }
            let delta = diff(desired, observed);
            if !delta.is_empty() {
                actions.push(Action::UpdateAttachments { delta });
            }
        }
    }
    Plan {
        name: desired.name.clone(),
        actions,
    }
}

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub name: String,
    pub observed: ObservedState,
    pub plan: Plan,
    /// False for dry runs.
    pub applied: bool,
    pub tasks: Vec<Task>,
}

impl<C: ControllerClient> Engine<C> {
    pub fn reconcile(
        &self,
        desired: &DesiredState,
        dry_run: bool,
    ) -> Result<ReconcileReport, CoreError> {
        let observed = self.read(&desired.name)?;
        let plan = plan(desired, &observed);

        if dry_run || plan.is_converged() {
            if plan.is_converged() {
                info!("configlet {} is in sync", desired.name);
            }
            return Ok(ReconcileReport {
                name: desired.name.clone(),
                observed,
                applied: false,
                plan,
                tasks: Vec::new(),
            });
        }

        let opts = RunOptions::from(desired);
        let mut tasks = Vec::new();
        for action in &plan.actions {
            info!("configlet {}: {action}", desired.name);
            let driven = match action {
                Action::Create { .. } => self.create(desired)?,
                Action::Destroy { .. } => self.destroy(&desired.name, opts)?,
                Action::UpdateContent => {
                    self.update_content(&desired.name, &desired.content, opts)?
                }
                Action::UpdateAttachments { delta } => {
                    self.update_attachments(&desired.name, delta, opts)?
                }
            };
            tasks.extend(driven);
        }

        Ok(ReconcileReport {
            name: desired.name.clone(),
            observed,
            plan,
            applied: true,
            tasks,
        })
    }
}
