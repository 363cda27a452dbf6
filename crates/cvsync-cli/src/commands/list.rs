use super::{connect, core_error, json_pretty, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config: Option<&Path>, json: bool) -> Result<u8, String> {
    let engine = connect(config)?;
    let configlets = engine.list().map_err(|e| core_error(&e))?;
    if json {
        println!("{}", json_pretty(&configlets)?);
    } else if configlets.is_empty() {
        println!("no configlets found");
    } else {
        println!("{:<32} {:<24} {:<8} ATTACHED", "NAME", "KEY", "DEVICES");
        for c in &configlets {
            println!(
                "{:<32} {:<24} {:<8} {}",
                c.name,
                c.key,
                c.attached_device_count,
                c.containers.join(",")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
