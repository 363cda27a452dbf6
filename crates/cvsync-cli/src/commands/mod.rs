pub mod apply;
pub mod completions;
pub mod destroy;
pub mod diff;
pub mod list;
pub mod show;

use cvsync_controller::http::HttpController;
use cvsync_controller::{ControllerConfig, ControllerError};
use cvsync_core::{CoreError, Engine, ObservedState, Task, TaskStatus};
use cvsync_schema::{parse_manifest_file, DesiredState};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_CONTROLLER_ERROR: u8 = 3;
pub const EXIT_TASK_ERROR: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_status(status: &TaskStatus) -> String {
    use console::Style;
    use cvsync_core::StatusClass;
    let text = status.to_string();
    match status.class() {
        StatusClass::Success => Style::new().green().apply_to(text).to_string(),
        StatusClass::Failure => Style::new().red().bold().apply_to(text).to_string(),
        StatusClass::Pending => Style::new().yellow().apply_to(text).to_string(),
    }
}

pub fn load_desired(manifest: &Path) -> Result<DesiredState, String> {
    parse_manifest_file(manifest)
        .and_then(cvsync_schema::ManifestV1::into_desired)
        .map_err(|e| format!("manifest error: {e}"))
}

pub fn load_config(path: Option<&Path>) -> Result<ControllerConfig, String> {
    let config = match path {
        Some(p) => ControllerConfig::load(p),
        None => ControllerConfig::load_default(),
    };
    config.map_err(|e| match e {
        ControllerError::Config(_) => e.to_string(),
        other => format!("controller error: {other}"),
    })
}

/// Render an engine error for the user. Failed or timed-out controller tasks
/// get their own prefix so they map to a distinct exit code.
pub fn core_error(e: &CoreError) -> String {
    if e.is_task_error() {
        format!("task error: {e}")
    } else {
        e.to_string()
    }
}

pub fn connect(path: Option<&Path>) -> Result<Engine<HttpController>, String> {
    let config = load_config(path)?;
    let poll_interval = Duration::from_secs(config.poll_interval_secs.max(1));
    tracing::debug!("using controller nodes {:?}", config.nodes);
    let controller = HttpController::new(config);
    controller
        .connect()
        .map_err(|e| format!("controller error: {e}"))?;
    Ok(Engine::new(controller).with_poll_interval(poll_interval))
}

pub fn print_observed(observed: &ObservedState) {
    if !observed.exists {
        println!("configlet {} does not exist", observed.name);
        return;
    }
    println!("name:        {}", observed.name);
    println!("key:         {}", observed.key);
    println!("devices:     {}", observed.attached_device_count);
    if !observed.containers.is_empty() {
        println!("attached:    {}", observed.containers.join(", "));
    }
    println!("content:");
    for line in observed.content.lines() {
        println!("  {line}");
    }
}

pub fn print_tasks(tasks: &[Task]) {
    for task in tasks {
        println!(
            "  task {} {} ({} poll(s))",
            task.id,
            colorize_status(&task.status),
            task.polls
        );
    }
}
