mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONTROLLER_ERROR, EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_TASK_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cvsync",
    version,
    about = "Reconcile CloudVision configlets against a desired state"
)]
struct Cli {
    /// Controller config file (JSON). Defaults to the first of $CVSYNC_CONF,
    /// ~/.cloudvision.json, ./.cloudvision.json, /mnt/flash/cloudvision.json.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Converge a configlet onto the state declared in a manifest.
    Apply {
        /// Path to manifest TOML file.
        #[arg(default_value = "configlet.toml")]
        manifest: PathBuf,
        /// Show the plan without changing the controller.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Show drift between a manifest and the controller.
    Diff {
        /// Path to manifest TOML file.
        #[arg(default_value = "configlet.toml")]
        manifest: PathBuf,
    },
    /// Show the controller state of one configlet.
    Show {
        /// Configlet name.
        name: String,
    },
    /// List all configlets on the controller.
    List,
    /// Detach a configlet from all devices and delete it.
    Destroy {
        /// Configlet name.
        name: String,
        /// Execute and wait on the tasks generated by detaching.
        #[arg(long, default_value_t = false)]
        auto_run: bool,
        /// Per-task completion deadline in seconds.
        #[arg(long, default_value_t = cvsync_schema::DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CVSYNC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref().map(expand_tilde);
    let config = config_path.as_deref();
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Apply { manifest, dry_run } => {
            commands::apply::run(config, &manifest, dry_run, json_output)
        }
        Commands::Diff { manifest } => commands::diff::run(config, &manifest, json_output),
        Commands::Show { name } => commands::show::run(config, &name, json_output),
        Commands::List => commands::list::run(config, json_output),
        Commands::Destroy {
            name,
            auto_run,
            timeout,
        } => commands::destroy::run(config, &name, auto_run, timeout, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("manifest error:") {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("controller error:") || msg.starts_with("controller config") {
        EXIT_CONTROLLER_ERROR
    } else if msg.starts_with("task error:") {
        EXIT_TASK_ERROR
    } else {
        EXIT_FAILURE
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
