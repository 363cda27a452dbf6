use crate::drift::{AttachmentDelta, ObservedState};
use crate::waiter::{Clock, SystemClock, Task, TaskWaiter, DEFAULT_POLL_INTERVAL};
use crate::CoreError;
use cvsync_controller::{ControllerClient, ControllerError};
use cvsync_schema::DesiredState;
use std::time::Duration;
use tracing::{debug, info};

/// Label the controller records for attach requests.
pub const ATTACH_LABEL: &str = "cvsync: assign configlet";
/// Label the controller records for detach requests.
pub const DETACH_LABEL: &str = "cvsync: remove configlet";

/// Per-call task handling: whether generated tasks are executed and awaited,
/// and the deadline for each of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub auto_run: bool,
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            auto_run: false,
            timeout: Duration::from_secs(cvsync_schema::DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl From<&DesiredState> for RunOptions {
    fn from(desired: &DesiredState) -> Self {
        Self {
            auto_run: desired.auto_run,
            timeout: desired.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Attach,
    Detach,
}

/// Lifecycle operations for a single configlet against one controller.
///
/// Every mutating step re-reads the records it depends on; nothing read from
/// the controller is kept between calls.
pub struct Engine<C: ControllerClient> {
    client: C,
    clock: Box<dyn Clock>,
    poll_interval: Duration,
}

impl<C: ControllerClient> Engine<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            clock: Box::new(SystemClock),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn waiter(&self) -> TaskWaiter<'_> {
        TaskWaiter::new(&self.client, self.clock.as_ref(), self.poll_interval)
    }

    /// Current controller state of `name`. A missing configlet is reported
    /// as `exists = false`, never as an error.
    pub fn read(&self, name: &str) -> Result<ObservedState, CoreError> {
        let record = match self.client.get_configlet_by_name(name) {
            Ok(record) => record,
            Err(ControllerError::NotFound(_)) => {
                debug!("configlet {name} not found");
                return Ok(ObservedState::absent(name));
            }
            Err(e) => return Err(e.into()),
        };
        let containers = self
            .client
            .get_devices_by_configlet(name)?
            .into_iter()
            .map(|d| d.host_name)
            .collect();
        Ok(ObservedState {
            name: record.name,
            exists: true,
            key: record.key,
            content: record.config.trim().to_owned(),
            containers,
            attached_device_count: record.net_element_count,
        })
    }

    /// Every configlet on the controller, with its attached hosts.
    pub fn list(&self) -> Result<Vec<ObservedState>, CoreError> {
        let records = self.client.get_configlets()?;
        let mut observed = Vec::with_capacity(records.len());
        for record in records {
            let containers = if record.net_element_count > 0 {
                self.client
                    .get_devices_by_configlet(&record.name)?
                    .into_iter()
                    .map(|d| d.host_name)
                    .collect()
            } else {
                Vec::new()
            };
            observed.push(ObservedState {
                exists: true,
                content: record.config.trim().to_owned(),
                containers,
                attached_device_count: record.net_element_count,
                name: record.name,
                key: record.key,
            });
        }
        Ok(observed)
    }

    /// Create the configlet, then attach it to each desired container in
    /// order.
    pub fn create(&self, desired: &DesiredState) -> Result<Vec<Task>, CoreError> {
        let name = desired.name.as_str();
        info!("creating configlet {name}");
        let key = self
            .client
            .add_configlet(name, &desired.content)
            .map_err(|e| match e {
                ControllerError::Api { code, message } => CoreError::CreationFailed {
                    name: name.to_owned(),
                    reason: format!("controller rejected create ({code}): {message}"),
                },
                other => other.into(),
            })?;
        if key.trim().is_empty() {
            return Err(CoreError::CreationFailed {
                name: name.to_owned(),
                reason: "controller returned an empty configlet key".to_owned(),
            });
        }
        debug!("configlet {name} created with key {key}");

        let opts = RunOptions::from(desired);
        let mut tasks = Vec::new();
        for container in &desired.containers {
            tasks.extend(self.attach(name, container, opts)?);
        }
        Ok(tasks)
    }

    /// Replace the configlet's content and drive the tasks the controller
    /// generated for it.
    pub fn update_content(
        &self,
        name: &str,
        content: &str,
        opts: RunOptions,
    ) -> Result<Vec<Task>, CoreError> {
        info!("updating content of configlet {name}");
        let key = self.key_of(name)?;
        self.client.update_configlet(name, &key, content)?;

        let pending: Vec<String> = self
            .client
            .get_pending_tasks(name)?
            .into_iter()
            .map(|t| t.work_order_id)
            .collect();
        debug!("configlet {name} has {} pending task(s)", pending.len());
        self.drive(&pending, opts)
    }

    /// Detach every container in `delta.to_remove`, then attach every
    /// container in `delta.to_add`.
    pub fn update_attachments(
        &self,
        name: &str,
        delta: &AttachmentDelta,
        opts: RunOptions,
    ) -> Result<Vec<Task>, CoreError> {
        if delta.is_empty() {
            debug!("attachments of configlet {name} already converged");
            return Ok(Vec::new());
        }
        info!(
            "updating attachments of configlet {name}: +{} -{}",
            delta.to_add.len(),
            delta.to_remove.len()
        );
        let mut tasks = Vec::new();
        for container in &delta.to_remove {
            tasks.extend(self.detach(name, container, opts)?);
        }
        for container in &delta.to_add {
            tasks.extend(self.attach(name, container, opts)?);
        }
        Ok(tasks)
    }

    /// Detach the configlet from every device it is applied to, then delete
    /// it. A failed detach aborts before the delete is issued.
    pub fn destroy(&self, name: &str, opts: RunOptions) -> Result<Vec<Task>, CoreError> {
        info!("destroying configlet {name}");
        let record = self.client.get_configlet_by_name(name).map_err(|e| match e {
            ControllerError::NotFound(_) => CoreError::ConfigletNotFound(name.to_owned()),
            other => other.into(),
        })?;

        let mut tasks = Vec::new();
        if record.net_element_count > 0 {
            for device in self.client.get_devices_by_configlet(name)? {
                tasks.extend(self.detach(name, &device.host_name, opts)?);
            }
        }

        let status = self
            .client
            .delete_configlet(name, &record.key)
            .map_err(|e| match e {
                ControllerError::Api { code, message } => CoreError::DeletionFailed {
                    name: name.to_owned(),
                    status: format!("{code}: {message}"),
                },
                other => other.into(),
            })?;
        if !status.trim().eq_ignore_ascii_case("success") {
            return Err(CoreError::DeletionFailed {
                name: name.to_owned(),
                status,
            });
        }
        debug!("configlet {name} deleted");
        Ok(tasks)
    }

    /// Attach the configlet to one device. Outstanding tasks on the device
    /// are logged but do not block the attach.
    pub fn attach(&self, name: &str, device: &str, opts: RunOptions) -> Result<Vec<Task>, CoreError> {
        self.apply(Direction::Attach, name, device, opts)
    }

    /// Detach the configlet from one device. Fails with
    /// [`CoreError::BusyTarget`] before issuing the detach if the device has
    /// outstanding tasks.
    pub fn detach(&self, name: &str, device: &str, opts: RunOptions) -> Result<Vec<Task>, CoreError> {
        self.apply(Direction::Detach, name, device, opts)
    }

    fn apply(
        &self,
        direction: Direction,
        name: &str,
        device: &str,
        opts: RunOptions,
    ) -> Result<Vec<Task>, CoreError> {
        let element = self.client.get_device_by_name(device)?;
        if element.has_outstanding_tasks() {
            match direction {
                Direction::Attach => debug!(
                    "device {device} has outstanding tasks ({}), attaching {name} anyway",
                    element.task_id_list.join(", ")
                ),
                Direction::Detach => {
                    return Err(CoreError::BusyTarget {
                        device: device.to_owned(),
                        configlet: name.to_owned(),
                        task_ids: element.task_id_list,
                    })
                }
            }
        }

        let configlet = self
            .client
            .get_configlet_by_name(name)
            .map_err(|e| match e {
                ControllerError::NotFound(_) => CoreError::ConfigletNotFound(name.to_owned()),
                other => other.into(),
            })?
            .reference();

        let reply = match direction {
            Direction::Attach => {
                info!("attaching configlet {name} to {device}");
                self.client
                    .apply_configlets_to_device(ATTACH_LABEL, &element, &[configlet])?
            }
            Direction::Detach => {
                info!("detaching configlet {name} from {device}");
                self.client
                    .remove_configlets_from_device(DETACH_LABEL, &element, &[configlet])?
            }
        };
        self.drive(reply.task_ids(), opts)
    }

    fn drive(&self, task_ids: &[String], opts: RunOptions) -> Result<Vec<Task>, CoreError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        if !opts.auto_run {
            debug!("leaving task(s) {} pending", task_ids.join(", "));
            return Ok(Vec::new());
        }
        self.waiter().execute_and_wait(task_ids, opts.timeout)
    }

    fn key_of(&self, name: &str) -> Result<String, CoreError> {
        match self.client.get_configlet_by_name(name) {
            Ok(record) => Ok(record.key),
            Err(ControllerError::NotFound(_)) => Err(CoreError::ConfigletNotFound(name.to_owned())),
            Err(e) => Err(e.into()),
        }
    }
}
