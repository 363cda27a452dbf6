//! Drives controller tasks to a terminal state.
//!
//! Each task is executed, then polled on a fixed interval. Pending-class
//! statuses keep polling until the timeout, `Completed` finishes the task, and
//! failure-class statuses abort the whole batch. Tasks run strictly in the
//! order given; a failure or timeout leaves the remaining tasks unstarted.

use crate::CoreError;
use chrono::{DateTime, Utc};
use cvsync_controller::ControllerClient;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Time source for the poll loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly. Clones share state.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: u32,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            inner: Arc::new(Mutex::new(ManualState::default())),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed += duration;
    }

    pub fn elapsed(&self) -> Duration {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed
    }

    /// Number of `sleep` calls so far.
    pub fn sleeps(&self) -> u32 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sleeps
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.elapsed += duration;
        state.sleeps += 1;
    }
}

/// Task status as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    WaitingForReboot,
    DeviceRebootInProgress,
    ConfigletPushInProgress,
    TaskUpdateInProgress,
    Completed,
    FailedCompleted,
    Failed,
    Cancelled,
    /// Unrecognised status, kept verbatim and treated as pending.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Success,
    Failure,
}

impl TaskStatus {
    /// Match case-insensitively, ignoring spaces, hyphens, and underscores.
    pub fn parse(raw: &str) -> Self {
        let folded: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "pending" => TaskStatus::Pending,
            "inprogress" => TaskStatus::InProgress,
            "waitingforreboot" => TaskStatus::WaitingForReboot,
            "devicerebootinprogress" => TaskStatus::DeviceRebootInProgress,
            "configletpushinprogress" => TaskStatus::ConfigletPushInProgress,
            "taskupdateinprogress" => TaskStatus::TaskUpdateInProgress,
            "completed" => TaskStatus::Completed,
            "failedcompleted" => TaskStatus::FailedCompleted,
            "failed" => TaskStatus::Failed,
            "cancelled" | "canceled" => TaskStatus::Cancelled,
            _ => TaskStatus::Other(raw.to_owned()),
        }
    }

    pub fn class(&self) -> StatusClass {
        match self {
            TaskStatus::Completed => StatusClass::Success,
            TaskStatus::FailedCompleted | TaskStatus::Failed | TaskStatus::Cancelled => {
                StatusClass::Failure
            }
            _ => StatusClass::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.class() != StatusClass::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In-Progress",
            TaskStatus::WaitingForReboot => "Waiting for Reboot",
            TaskStatus::DeviceRebootInProgress => "Device Reboot in Progress",
            TaskStatus::ConfigletPushInProgress => "Configlet Push in Progress",
            TaskStatus::TaskUpdateInProgress => "Task Update in Progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::FailedCompleted => "FailedCompleted",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
            TaskStatus::Other(raw) => raw,
        };
        f.write_str(s)
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A task driven to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub polls: u32,
}

pub struct TaskWaiter<'a> {
    client: &'a dyn ControllerClient,
    clock: &'a dyn Clock,
    poll_interval: Duration,
}

impl<'a> TaskWaiter<'a> {
    pub fn new(client: &'a dyn ControllerClient, clock: &'a dyn Clock, poll_interval: Duration) -> Self {
        Self {
            client,
            clock,
            poll_interval,
        }
    }

    /// Execute each task and wait for it to complete, in order.
    ///
    /// An empty batch succeeds without contacting the controller.
    pub fn execute_and_wait(
        &self,
        task_ids: &[String],
        timeout: Duration,
    ) -> Result<Vec<Task>, CoreError> {
        let mut done = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            done.push(self.wait_one(id, timeout)?);
        }
        Ok(done)
    }

    fn wait_one(&self, task_id: &str, timeout: Duration) -> Result<Task, CoreError> {
        let reply = self.client.execute_task(task_id)?;
        debug!("task {task_id} started: {reply}");
        let started = self.clock.now();
        let started_at = Utc::now();
        let mut last: Option<TaskStatus> = None;
        let mut polls = 0;

        loop {
            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed > timeout {
                return Err(CoreError::TaskTimeout {
                    task_id: task_id.to_owned(),
                    elapsed,
                    last_status: last.map_or_else(|| "unknown".to_owned(), |s| s.to_string()),
                });
            }

            let info = self.client.get_task_by_id(task_id)?;
            polls += 1;
            let status = TaskStatus::parse(&info.status);
            debug!("task {task_id} returned status: {status}");

            match status.class() {
                StatusClass::Success => {
                    info!("task {task_id} completed after {polls} poll(s)");
                    return Ok(Task {
                        id: task_id.to_owned(),
                        status,
                        started_at,
                        polls,
                    });
                }
                StatusClass::Failure => {
                    return Err(CoreError::TaskFailed {
                        task_id: task_id.to_owned(),
                        status: info.status,
                    });
                }
                StatusClass::Pending => {
                    last = Some(status);
                    self.clock.sleep(self.poll_interval);
                }
            }
        }
    }
}
