use super::{connect, core_error, json_pretty, load_desired, EXIT_SUCCESS};
use console::Style;
use cvsync_core::{diff, plan, Action};
use std::path::Path;

pub fn run(config: Option<&Path>, manifest: &Path, json: bool) -> Result<u8, String> {
    let desired = load_desired(manifest)?;
    let engine = connect(config)?;
    let observed = engine.read(&desired.name).map_err(|e| core_error(&e))?;
    let plan = plan(&desired, &observed);

    if json {
        let payload = serde_json::json!({
            "name": desired.name,
            "ensure": desired.ensure,
            "exists": observed.exists,
            "in_sync": plan.is_converged(),
            "attachments": diff(&desired, &observed),
            "actions": plan.actions,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    if plan.is_converged() {
        println!("no drift detected in configlet {}", desired.name);
        return Ok(EXIT_SUCCESS);
    }

    let add = Style::new().green();
    let remove = Style::new().red();
    let change = Style::new().yellow();
    println!("drift detected in configlet {}:", desired.name);
    for action in &plan.actions {
        match action {
            Action::Create { containers } => {
                println!("  {} configlet {}", add.apply_to("+"), desired.name);
                for c in containers {
                    println!("  {} attach {c}", add.apply_to("+"));
                }
            }
            Action::Destroy { containers } => {
                for c in containers {
                    println!("  {} detach {c}", remove.apply_to("-"));
                }
                println!("  {} configlet {}", remove.apply_to("-"), desired.name);
            }
            Action::UpdateContent => {
                println!("  {} content", change.apply_to("~"));
            }
            Action::UpdateAttachments { delta } => {
                for c in &delta.to_remove {
                    println!("  {} detach {c}", remove.apply_to("-"));
                }
                for c in &delta.to_add {
                    println!("  {} attach {c}", add.apply_to("+"));
                }
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
