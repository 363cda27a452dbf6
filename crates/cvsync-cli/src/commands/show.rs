use super::{connect, core_error, json_pretty, print_observed, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config: Option<&Path>, name: &str, json: bool) -> Result<u8, String> {
    let engine = connect(config)?;
    let observed = engine.read(name).map_err(|e| core_error(&e))?;
    if json {
        println!("{}", json_pretty(&observed)?);
    } else {
        print_observed(&observed);
    }
    Ok(EXIT_SUCCESS)
}
