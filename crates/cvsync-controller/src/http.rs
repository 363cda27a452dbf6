use crate::types::{
    AppliedDevice, ApplyResult, ConfigletRecord, ConfigletRef, NetElement, PendingTask, TaskInfo,
};
use crate::{ControllerClient, ControllerConfig, ControllerError};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Error code the controller returns when a configlet does not exist.
const CONFIGLET_NOT_FOUND: &str = "132801";
/// Error code the controller returns for an expired or unknown session.
const SESSION_EXPIRED: &str = "112498";

const SESSION_COOKIE: &str = "session_id";

/// HTTP client for the CloudVision REST service.
///
/// Expects the `cvpservice` API:
/// - `POST /cvpservice/login/authenticate.do` : open a session
/// - `GET  /cvpservice/configlet/getConfigletByName.do` : one configlet
/// - `GET  /cvpservice/configlet/getConfiglets.do` : all configlets
/// - `GET  /cvpservice/configlet/getAppliedDevices.do` : devices carrying a configlet
/// - `POST /cvpservice/configlet/{add,update,delete}Configlet.do`
/// - `GET  /cvpservice/inventory/getInventory.do` : device lookup
/// - `POST /cvpservice/ztp/addTempAction.do` + `/ztp/v2/saveTopology.do` : attach/detach
/// - `GET  /cvpservice/task/{getTasks,getTaskById}.do`, `POST /cvpservice/task/executeTask.do`
///
/// Nodes are tried in configured order at login; transport failures move on
/// to the next node, credential failures stop immediately.
pub struct HttpController {
    config: ControllerConfig,
    agent: ureq::Agent,
    session: Mutex<Option<Session>>,
}

#[derive(Debug, Clone)]
struct Session {
    base_url: String,
    cookie: String,
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Get,
    Post,
}

impl HttpController {
    pub fn new(config: ControllerConfig) -> Self {
        let mut builder = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.request_timeout_secs)));
        if config.insecure_tls {
            builder = builder.tls_config(
                ureq::tls::TlsConfig::builder()
                    .disable_verification(true)
                    .build(),
            );
        }
        let agent = ureq::Agent::new_with_config(builder.build());
        Self {
            config,
            agent,
            session: Mutex::new(None),
        }
    }

    /// Open a session on the first node that accepts the credentials.
    pub fn connect(&self) -> Result<(), ControllerError> {
        let session = self.login_any()?;
        *self.session_slot()? = Some(session);
        Ok(())
    }

    fn session_slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>, ControllerError> {
        self.session
            .lock()
            .map_err(|e| ControllerError::Http(format!("session mutex poisoned: {e}")))
    }

    /// The open session, logging in first if there is none. The slot is not
    /// held across the login round-trips.
    fn current_session(&self) -> Result<Session, ControllerError> {
        if let Some(session) = self.session_slot()?.clone() {
            return Ok(session);
        }
        let session = self.login_any()?;
        *self.session_slot()? = Some(session.clone());
        Ok(session)
    }

    fn login_any(&self) -> Result<Session, ControllerError> {
        let urls = self.config.node_urls();
        let mut failures = Vec::new();
        for base in urls {
            match self.login(&base) {
                Ok(session) => {
                    debug!("controller session opened on {base}");
                    return Ok(session);
                }
                Err(ControllerError::Http(e)) => {
                    warn!("controller node {base} unreachable: {e}");
                    failures.push(format!("{base}: {e}"));
                }
                Err(e) => return Err(e),
            }
        }
        Err(ControllerError::Http(format!(
            "no controller node reachable ({})",
            failures.join("; ")
        )))
    }

    fn login(&self, base_url: &str) -> Result<Session, ControllerError> {
        let url = format!("{base_url}/cvpservice/login/authenticate.do");
        let body = json!({
            "userId": self.config.username,
            "password": self.config.password,
        });
        let (code, text) = self.send(Verb::Post, &url, &[], None, Some(&body))?;
        if code == 401 || code == 403 {
            return Err(ControllerError::Auth(format!(
                "HTTP {code} from {base_url}"
            )));
        }
        if code >= 400 {
            return Err(ControllerError::Http(format!("HTTP {code} for {url}")));
        }
        let value = parse_body(&text)?;
        if let Some(err) = api_error(&value) {
            return Err(match err {
                ControllerError::Api { code, message } => {
                    ControllerError::Auth(format!("{code}: {message}"))
                }
                other => other,
            });
        }
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| ControllerError::Serialization("login reply without sessionId".to_owned()))?;
        Ok(Session {
            base_url: base_url.to_owned(),
            cookie: format!("{SESSION_COOKIE}={session_id}"),
        })
    }

    fn send(
        &self,
        verb: Verb,
        url: &str,
        query: &[(&str, &str)],
        cookie: Option<&str>,
        body: Option<&Value>,
    ) -> Result<(u16, String), ControllerError> {
        let result = match verb {
            Verb::Get => {
                let mut req = self.agent.get(url).header("Accept", "application/json");
                for (k, v) in query {
                    req = req.query(*k, *v);
                }
                if let Some(c) = cookie {
                    req = req.header("Cookie", c);
                }
                req.call()
            }
            Verb::Post => {
                let mut req = self
                    .agent
                    .post(url)
                    .header("Accept", "application/json")
                    .header("Content-Type", "application/json");
                for (k, v) in query {
                    req = req.query(*k, *v);
                }
                if let Some(c) = cookie {
                    req = req.header("Cookie", c);
                }
                let payload = body.map(Value::to_string).unwrap_or_default();
                req.send(payload.as_bytes())
            }
        };

        let resp = match result {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => return Ok((code, String::new())),
            Err(e) => return Err(ControllerError::Http(e.to_string())),
        };
        let code = resp.status().as_u16();
        let mut text = String::new();
        resp.into_body()
            .into_reader()
            .read_to_string(&mut text)
            .map_err(|e| ControllerError::Http(e.to_string()))?;
        Ok((code, text))
    }

    /// Issue an authenticated request and return the decoded JSON reply.
    ///
    /// An expired session is re-opened once before the error is surfaced.
    fn request(
        &self,
        verb: Verb,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ControllerError> {
        let mut retried = false;
        loop {
            let session = self.current_session()?;
            let url = format!("{}{path}", session.base_url);
            debug!("{verb:?} {url}");
            let (code, text) = self.send(verb, &url, query, Some(&session.cookie), body)?;

            let expired = code == 401
                || (code < 400
                    && parse_body(&text)
                        .ok()
                        .as_ref()
                        .and_then(|v| v.get("errorCode"))
                        .and_then(Value::as_str)
                        == Some(SESSION_EXPIRED));
            if expired && !retried {
                debug!("controller session expired, logging in again");
                *self.session_slot()? = None;
                retried = true;
                continue;
            }

            match code {
                401 | 403 => return Err(ControllerError::Auth(format!("HTTP {code} for {url}"))),
                c if c >= 400 => return Err(ControllerError::Http(format!("HTTP {c} for {url}"))),
                _ => {}
            }

            let value = parse_body(&text)?;
            if let Some(err) = api_error(&value) {
                return Err(err);
            }
            return Ok(value);
        }
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ControllerError> {
        self.request(Verb::Get, path, query, None)
    }

    fn post(&self, path: &str, query: &[(&str, &str)], body: &Value) -> Result<Value, ControllerError> {
        self.request(Verb::Post, path, query, Some(body))
    }

    fn device_configlets(&self, device: &NetElement) -> Result<Vec<ConfigletRef>, ControllerError> {
        let value = self.get(
            "/cvpservice/provisioning/getConfigletsByNetElementId.do",
            &[
                ("netElementId", device.system_mac_address.as_str()),
                ("queryParam", ""),
                ("startIndex", "0"),
                ("endIndex", "0"),
            ],
        )?;
        decode(field(value, "configletList")?)
    }

    /// Stage a configlet association change for one device and commit it.
    fn save_topology(
        &self,
        label: &str,
        device: &NetElement,
        keep: &[ConfigletRef],
        drop: &[ConfigletRef],
    ) -> Result<ApplyResult, ControllerError> {
        let names = |list: &[ConfigletRef]| list.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        let keys = |list: &[ConfigletRef]| list.iter().map(|c| c.key.clone()).collect::<Vec<_>>();
        let action = json!({
            "info": label,
            "infoPreview": label,
            "note": "",
            "action": "associate",
            "nodeType": "configlet",
            "nodeId": "",
            "configletList": keys(keep),
            "configletNamesList": names(keep),
            "ignoreConfigletList": keys(drop),
            "ignoreConfigletNamesList": names(drop),
            "configletBuilderList": [],
            "configletBuilderNamesList": [],
            "ignoreConfigletBuilderList": [],
            "ignoreConfigletBuilderNamesList": [],
            "toId": device.system_mac_address,
            "toIdType": "netelement",
            "fromId": "",
            "nodeName": "",
            "fromName": "",
            "toName": device.fqdn,
            "nodeIpAddress": device.ip_address,
            "nodeTargetIpAddress": device.ip_address,
            "childTasks": [],
            "parentTask": "",
        });
        self.post(
            "/cvpservice/ztp/addTempAction.do",
            &[("format", "topology"), ("queryParam", ""), ("nodeId", "root")],
            &json!({ "data": [action] }),
        )?;
        let saved = self.post("/cvpservice/ztp/v2/saveTopology.do", &[], &json!([]))?;
        decode(field(saved, "data")?)
    }
}

fn parse_body(text: &str) -> Result<Value, ControllerError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| ControllerError::Serialization(e.to_string()))
}

fn api_error(value: &Value) -> Option<ControllerError> {
    let code = value.get("errorCode")?;
    let code = code
        .as_str()
        .map_or_else(|| code.to_string(), str::to_owned);
    let message = value
        .get("errorMessage")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Some(ControllerError::Api { code, message })
}

fn field(mut value: Value, name: &str) -> Result<Value, ControllerError> {
    value
        .get_mut(name)
        .map(Value::take)
        .ok_or_else(|| ControllerError::Serialization(format!("reply is missing '{name}'")))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ControllerError> {
    serde_json::from_value(value).map_err(|e| ControllerError::Serialization(e.to_string()))
}

impl ControllerClient for HttpController {
    fn get_configlet_by_name(&self, name: &str) -> Result<ConfigletRecord, ControllerError> {
        match self.get(
            "/cvpservice/configlet/getConfigletByName.do",
            &[("name", name)],
        ) {
            Ok(value) => decode(value),
            Err(ControllerError::Api { code, .. }) if code == CONFIGLET_NOT_FOUND => {
                Err(ControllerError::NotFound(format!("configlet {name}")))
            }
            Err(e) => Err(e),
        }
    }

    fn get_configlets(&self) -> Result<Vec<ConfigletRecord>, ControllerError> {
        let value = self.get(
            "/cvpservice/configlet/getConfiglets.do",
            &[("startIndex", "0"), ("endIndex", "0")],
        )?;
        decode(field(value, "data")?)
    }

    fn get_devices_by_configlet(&self, name: &str) -> Result<Vec<AppliedDevice>, ControllerError> {
        let value = self.get(
            "/cvpservice/configlet/getAppliedDevices.do",
            &[("configletName", name), ("startIndex", "0"), ("endIndex", "0")],
        )?;
        decode(field(value, "data")?)
    }

    fn get_pending_tasks(&self, name: &str) -> Result<Vec<PendingTask>, ControllerError> {
        let value = self.get(
            "/cvpservice/task/getTasks.do",
            &[("queryparam", name), ("startIndex", "0"), ("endIndex", "0")],
        )?;
        let entries: Vec<Value> = decode(field(value, "data")?)?;
        Ok(entries
            .into_iter()
            .filter(|t| {
                t.get("workOrderUserDefinedStatus").and_then(Value::as_str) == Some("Pending")
            })
            .filter_map(|t| {
                t.get("workOrderId")
                    .and_then(Value::as_str)
                    .map(|id| PendingTask {
                        work_order_id: id.to_owned(),
                    })
            })
            .collect())
    }

    fn add_configlet(&self, name: &str, content: &str) -> Result<String, ControllerError> {
        let value = self.post(
            "/cvpservice/configlet/addConfiglet.do",
            &[],
            &json!({ "name": name, "config": content }),
        )?;
        Ok(value
            .pointer("/data/key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned())
    }

    fn update_configlet(
        &self,
        name: &str,
        key: &str,
        content: &str,
    ) -> Result<(), ControllerError> {
        self.post(
            "/cvpservice/configlet/updateConfiglet.do",
            &[],
            &json!({ "config": content, "key": key, "name": name }),
        )?;
        Ok(())
    }

    fn delete_configlet(&self, name: &str, key: &str) -> Result<String, ControllerError> {
        let value = self.post(
            "/cvpservice/configlet/deleteConfiglet.do",
            &[],
            &json!([{ "key": key, "name": name }]),
        )?;
        Ok(match value.get("data") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
    }

    fn get_device_by_name(&self, host_name: &str) -> Result<NetElement, ControllerError> {
        let value = self.get(
            "/cvpservice/inventory/getInventory.do",
            &[("queryparam", host_name), ("startIndex", "0"), ("endIndex", "0")],
        )?;
        let elements: Vec<NetElement> = decode(field(value, "netElementList")?)?;
        elements
            .into_iter()
            .find(|e| e.matches(host_name))
            .ok_or_else(|| ControllerError::NotFound(format!("device {host_name}")))
    }

    fn apply_configlets_to_device(
        &self,
        label: &str,
        device: &NetElement,
        configlets: &[ConfigletRef],
    ) -> Result<ApplyResult, ControllerError> {
        let mut keep = self.device_configlets(device)?;
        for c in configlets {
            if !keep.iter().any(|k| k.key == c.key) {
                keep.push(c.clone());
            }
        }
        self.save_topology(label, device, &keep, &[])
    }

    fn remove_configlets_from_device(
        &self,
        label: &str,
        device: &NetElement,
        configlets: &[ConfigletRef],
    ) -> Result<ApplyResult, ControllerError> {
        let keep: Vec<ConfigletRef> = self
            .device_configlets(device)?
            .into_iter()
            .filter(|k| !configlets.iter().any(|c| c.key == k.key))
            .collect();
        self.save_topology(label, device, &keep, configlets)
    }

    fn execute_task(&self, task_id: &str) -> Result<Value, ControllerError> {
        self.post(
            "/cvpservice/task/executeTask.do",
            &[],
            &json!({ "data": [task_id] }),
        )
    }

    fn get_task_by_id(&self, task_id: &str) -> Result<TaskInfo, ControllerError> {
        let value = self.get("/cvpservice/task/getTaskById.do", &[("taskId", task_id)])?;
        let status = ["workOrderUserDefinedStatus", "taskStatus"]
            .iter()
            .find_map(|f| value.get(*f).and_then(Value::as_str))
            .ok_or_else(|| {
                ControllerError::Serialization(format!("task {task_id} reply has no status"))
            })?;
        Ok(TaskInfo {
            id: task_id.to_owned(),
            status: status.to_owned(),
        })
    }
}
