use super::{
    connect, core_error, json_pretty, load_desired, print_tasks, spin_fail, spin_ok, spinner,
    EXIT_SUCCESS,
};
use std::path::Path;

pub fn run(
    config: Option<&Path>,
    manifest: &Path,
    dry_run: bool,
    json: bool,
) -> Result<u8, String> {
    let desired = load_desired(manifest)?;
    let engine = connect(config)?;

    let pb = if json || dry_run {
        None
    } else {
        Some(spinner(&format!("reconciling configlet {}...", desired.name)))
    };

    let report = match engine.reconcile(&desired, dry_run) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("configlet {} reconciled", desired.name));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("configlet {} failed to reconcile", desired.name));
            }
            return Err(core_error(&e));
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    if report.plan.is_converged() {
        println!("configlet {} is in sync", report.name);
        return Ok(EXIT_SUCCESS);
    }
    let verb = if report.applied { "applied" } else { "would apply" };
    for action in &report.plan.actions {
        println!("{verb}: {action}");
    }
    if !report.tasks.is_empty() {
        println!("tasks:");
        print_tasks(&report.tasks);
    } else if report.applied && !desired.auto_run {
        println!("generated tasks left pending (auto_run = false)");
    }
    Ok(EXIT_SUCCESS)
}
