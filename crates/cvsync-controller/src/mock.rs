use crate::types::{
    AppliedDevice, ApplyResult, ConfigletRecord, ConfigletRef, NetElement, PendingTask, TaskInfo,
};
use crate::{ControllerClient, ControllerError};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// A controller call recorded by [`MockController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetConfigletByName(String),
    GetConfiglets,
    GetDevicesByConfiglet(String),
    GetPendingTasks(String),
    AddConfiglet(String),
    UpdateConfiglet(String),
    DeleteConfiglet(String),
    GetDeviceByName(String),
    Apply { device: String, configlet: String },
    Remove { device: String, configlet: String },
    ExecuteTask(String),
    GetTaskById(String),
}

#[derive(Debug, Clone)]
struct MockConfiglet {
    key: String,
    config: String,
}

#[derive(Debug, Clone)]
struct MockDevice {
    host_name: String,
    task_ids: Vec<String>,
    configlets: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    configlets: BTreeMap<String, MockConfiglet>,
    devices: Vec<MockDevice>,
    /// Status sequences per task id; the last entry repeats once drained.
    tasks: HashMap<String, VecDeque<String>>,
    pending: HashMap<String, Vec<String>>,
    apply_replies: VecDeque<ApplyResult>,
    reject_next_create: bool,
    delete_status: Option<String>,
    delete_rejection: Option<(String, String)>,
    next_key: u32,
    calls: Vec<Call>,
}

/// In-memory controller with scripted task behavior and a call log.
#[derive(Debug, Default)]
pub struct MockController {
    state: Mutex<State>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ControllerError> {
        self.state
            .lock()
            .map_err(|e| ControllerError::Http(format!("mutex poisoned: {e}")))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a device in the inventory.
    pub fn add_device(&self, host_name: &str) {
        self.state().devices.push(MockDevice {
            host_name: host_name.to_owned(),
            task_ids: Vec::new(),
            configlets: Vec::new(),
        });
    }

    /// Mark a device as having outstanding tasks.
    pub fn set_device_tasks(&self, host_name: &str, task_ids: &[&str]) {
        let mut state = self.state();
        if let Some(dev) = state.devices.iter_mut().find(|d| d.host_name == host_name) {
            dev.task_ids = task_ids.iter().map(|t| (*t).to_owned()).collect();
        }
    }

    /// Seed a configlet directly, bypassing the call log. Returns its key.
    pub fn insert_configlet(&self, name: &str, config: &str) -> String {
        let mut state = self.state();
        let key = next_key(&mut state);
        state.configlets.insert(
            name.to_owned(),
            MockConfiglet {
                key: key.clone(),
                config: config.to_owned(),
            },
        );
        key
    }

    /// Seed an attachment directly, bypassing the call log.
    pub fn attach_direct(&self, configlet: &str, host_name: &str) {
        let mut state = self.state();
        if let Some(dev) = state.devices.iter_mut().find(|d| d.host_name == host_name) {
            if !dev.configlets.iter().any(|c| c == configlet) {
                dev.configlets.push(configlet.to_owned());
            }
        }
    }

    /// Script the status sequence `get_task_by_id` reports for a task.
    pub fn script_task(&self, task_id: &str, statuses: &[&str]) {
        self.state().tasks.insert(
            task_id.to_owned(),
            statuses.iter().map(|s| (*s).to_owned()).collect(),
        );
    }

    /// Pending work orders reported for `name` by `get_pending_tasks`.
    pub fn set_pending_tasks(&self, name: &str, task_ids: &[&str]) {
        self.state().pending.insert(
            name.to_owned(),
            task_ids.iter().map(|t| (*t).to_owned()).collect(),
        );
    }

    /// Queue the reply for the next attach or detach call.
    pub fn queue_apply_reply(&self, reply: ApplyResult) {
        self.state().apply_replies.push_back(reply);
    }

    /// Make the next `add_configlet` return an empty key.
    pub fn reject_next_create(&self) {
        self.state().reject_next_create = true;
    }

    /// Override the status string returned by `delete_configlet`.
    pub fn set_delete_status(&self, status: &str) {
        self.state().delete_status = Some(status.to_owned());
    }

    /// Make the next `delete_configlet` fail with a controller error code.
    pub fn reject_next_delete(&self, code: &str, message: &str) {
        self.state().delete_rejection = Some((code.to_owned(), message.to_owned()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn content_of(&self, name: &str) -> Option<String> {
        self.state().configlets.get(name).map(|c| c.config.clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state().configlets.contains_key(name)
    }

    /// Devices the configlet is attached to, in inventory order.
    pub fn attached_to(&self, name: &str) -> Vec<String> {
        attached_hosts(&self.state(), name)
    }
}

fn next_key(state: &mut State) -> String {
    state.next_key += 1;
    format!("configlet_{}", state.next_key)
}

fn attached_hosts(state: &State, name: &str) -> Vec<String> {
    state
        .devices
        .iter()
        .filter(|d| d.configlets.iter().any(|c| c == name))
        .map(|d| d.host_name.clone())
        .collect()
}

fn record(state: &State, name: &str) -> Option<ConfigletRecord> {
    state.configlets.get(name).map(|c| ConfigletRecord {
        key: c.key.clone(),
        name: name.to_owned(),
        config: c.config.clone(),
        net_element_count: attached_hosts(state, name).len() as u32,
    })
}

impl ControllerClient for MockController {
    fn get_configlet_by_name(&self, name: &str) -> Result<ConfigletRecord, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::GetConfigletByName(name.to_owned()));
        record(&state, name).ok_or_else(|| ControllerError::NotFound(format!("configlet {name}")))
    }

    fn get_configlets(&self) -> Result<Vec<ConfigletRecord>, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::GetConfiglets);
        Ok(state
            .configlets
            .keys()
            .filter_map(|name| record(&state, name))
            .collect())
    }

    fn get_devices_by_configlet(&self, name: &str) -> Result<Vec<AppliedDevice>, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::GetDevicesByConfiglet(name.to_owned()));
        Ok(attached_hosts(&state, name)
            .into_iter()
            .map(|host_name| AppliedDevice { host_name })
            .collect())
    }

    fn get_pending_tasks(&self, name: &str) -> Result<Vec<PendingTask>, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::GetPendingTasks(name.to_owned()));
        Ok(state
            .pending
            .get(name)
            .map(|ids| {
                ids.iter()
                    .map(|id| PendingTask {
                        work_order_id: id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn add_configlet(&self, name: &str, content: &str) -> Result<String, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::AddConfiglet(name.to_owned()));
        if std::mem::take(&mut state.reject_next_create) {
            return Ok(String::new());
        }
        if state.configlets.contains_key(name) {
            return Err(ControllerError::Api {
                code: "132518".to_owned(),
                message: format!("configlet {name} already exists"),
            });
        }
        let key = next_key(&mut state);
        state.configlets.insert(
            name.to_owned(),
            MockConfiglet {
                key: key.clone(),
                // The controller stores content with a trailing newline.
                config: format!("{content}\n"),
            },
        );
        Ok(key)
    }

    fn update_configlet(
        &self,
        name: &str,
        key: &str,
        content: &str,
    ) -> Result<(), ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::UpdateConfiglet(name.to_owned()));
        match state.configlets.get_mut(name) {
            Some(c) if c.key == key => {
                c.config = format!("{content}\n");
                Ok(())
            }
            Some(_) => Err(ControllerError::Api {
                code: "132802".to_owned(),
                message: format!("stale key for configlet {name}"),
            }),
            None => Err(ControllerError::NotFound(format!("configlet {name}"))),
        }
    }

    fn delete_configlet(&self, name: &str, key: &str) -> Result<String, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::DeleteConfiglet(name.to_owned()));
        if let Some((code, message)) = state.delete_rejection.take() {
            return Err(ControllerError::Api { code, message });
        }
        if let Some(status) = state.delete_status.clone() {
            return Ok(status);
        }
        if !attached_hosts(&state, name).is_empty() {
            return Ok(format!("configlet {name} is applied to devices"));
        }
        match state.configlets.get(name) {
            Some(c) if c.key == key => {
                state.configlets.remove(name);
                Ok("success".to_owned())
            }
            _ => Ok(format!("configlet {name} with key {key} not found")),
        }
    }

    fn get_device_by_name(&self, host_name: &str) -> Result<NetElement, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::GetDeviceByName(host_name.to_owned()));
        state
            .devices
            .iter()
            .find(|d| d.host_name == host_name)
            .map(|d| NetElement {
                fqdn: d.host_name.clone(),
                host_name: d.host_name.clone(),
                system_mac_address: String::new(),
                ip_address: String::new(),
                task_id_list: d.task_ids.clone(),
            })
            .ok_or_else(|| ControllerError::NotFound(format!("device {host_name}")))
    }

    fn apply_configlets_to_device(
        &self,
        _label: &str,
        device: &NetElement,
        configlets: &[ConfigletRef],
    ) -> Result<ApplyResult, ControllerError> {
        let mut state = self.lock()?;
        for c in configlets {
            state.calls.push(Call::Apply {
                device: device.host_name.clone(),
                configlet: c.name.clone(),
            });
        }
        let dev = state
            .devices
            .iter_mut()
            .find(|d| device.matches(&d.host_name))
            .ok_or_else(|| ControllerError::NotFound(format!("device {}", device.host_name)))?;
        for c in configlets {
            if !dev.configlets.contains(&c.name) {
                dev.configlets.push(c.name.clone());
            }
        }
        Ok(state.apply_replies.pop_front().unwrap_or_default())
    }

    fn remove_configlets_from_device(
        &self,
        _label: &str,
        device: &NetElement,
        configlets: &[ConfigletRef],
    ) -> Result<ApplyResult, ControllerError> {
        let mut state = self.lock()?;
        for c in configlets {
            state.calls.push(Call::Remove {
                device: device.host_name.clone(),
                configlet: c.name.clone(),
            });
        }
        let dev = state
            .devices
            .iter_mut()
            .find(|d| device.matches(&d.host_name))
            .ok_or_else(|| ControllerError::NotFound(format!("device {}", device.host_name)))?;
        dev.configlets
            .retain(|name| !configlets.iter().any(|c| &c.name == name));
        Ok(state.apply_replies.pop_front().unwrap_or_default())
    }

    fn execute_task(&self, task_id: &str) -> Result<serde_json::Value, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::ExecuteTask(task_id.to_owned()));
        if !state.tasks.contains_key(task_id) {
            return Err(ControllerError::NotFound(format!("task {task_id}")));
        }
        Ok(serde_json::json!({ "data": "success" }))
    }

    fn get_task_by_id(&self, task_id: &str) -> Result<TaskInfo, ControllerError> {
        let mut state = self.lock()?;
        state.calls.push(Call::GetTaskById(task_id.to_owned()));
        let seq = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ControllerError::NotFound(format!("task {task_id}")))?;
        let next = if seq.len() > 1 {
            seq.pop_front()
        } else {
            seq.front().cloned()
        };
        let status = next
            .ok_or_else(|| ControllerError::Serialization(format!("task {task_id} has no status")))?;
        Ok(TaskInfo {
            id: task_id.to_owned(),
            status,
        })
    }
}
