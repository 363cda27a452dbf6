use super::{connect, core_error, json_pretty, print_tasks, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use cvsync_core::RunOptions;
use std::path::Path;
use std::time::Duration;

pub fn run(
    config: Option<&Path>,
    name: &str,
    auto_run: bool,
    timeout_secs: u64,
    json: bool,
) -> Result<u8, String> {
    let engine = connect(config)?;
    let opts = RunOptions {
        auto_run,
        timeout: Duration::from_secs(timeout_secs),
    };

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("destroying configlet {name}...")))
    };
    let tasks = match engine.destroy(name, opts) {
        Ok(t) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("configlet {name} destroyed"));
            }
            t
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("failed to destroy configlet {name}"));
            }
            return Err(core_error(&e));
        }
    };

    if json {
        let payload = serde_json::json!({
            "name": name,
            "status": "destroyed",
            "tasks": tasks,
        });
        println!("{}", json_pretty(&payload)?);
    } else if !tasks.is_empty() {
        print_tasks(&tasks);
    }
    Ok(EXIT_SUCCESS)
}
