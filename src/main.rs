//! csb - drive `cargo codesnip` without an editor.

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use codesnip_bridge::cli::{Cli, Commands, ConfigCommands};
use codesnip_bridge::commands::{self, BundleTarget, Output};
use codesnip_bridge::config::{ConfigOverrides, find_project_root, resolve_config};
use codesnip_bridge::messages::{self, ErrorReport};
use codesnip_bridge::orchestrator::CacheOrchestrator;
use codesnip_bridge::tool::ProcessRunner;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `debug`, `codesnip_bridge=trace`).
const LOG_ENV: &str = "CSB_LOG";

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;
    init_logging();

    // Project root: --project flag > CSB_PROJECT env > search upward from cwd
    let project_root = resolve_project_root(cli.project_path, human);

    // A relative --cache-file is taken from the shell's cwd, unlike settings files
    let mut overrides = ConfigOverrides::new();
    if let Some(path) = cli.cache_file {
        let path = match std::path::absolute(&path) {
            Ok(path) => path,
            Err(e) => exit_with_error(&codesnip_bridge::Error::Io(e), human),
        };
        overrides = overrides.with_cache_file(path);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => exit_with_error(&codesnip_bridge::Error::Io(e), human),
    };

    let result = runtime.block_on(run_command(
        cli.command,
        project_root.as_deref(),
        &overrides,
        human,
    ));

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => exit_with_error(&e, human),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the project root from an explicit path or by searching upward.
///
/// An explicit path (via -C/--project or CSB_PROJECT) is used literally and
/// must exist. Otherwise the nearest ancestor of the working directory
/// holding `codesnip.kdl` or `.git` is used, if any.
fn resolve_project_root(explicit_path: Option<PathBuf>, human: bool) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => {
            if !path.is_dir() {
                let err = codesnip_bridge::Error::InvalidInput(format!(
                    "Specified project path does not exist: {}",
                    path.display()
                ));
                exit_with_error(&err, human);
            }
            Some(path)
        }
        None => {
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            find_project_root(&cwd)
        }
    }
}

fn runner_for(project_root: Option<&Path>) -> ProcessRunner {
    match project_root {
        Some(root) => ProcessRunner::in_dir(root),
        None => ProcessRunner::new(),
    }
}

/// Activate against the resolved configuration.
async fn activate(
    project_root: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<CacheOrchestrator<ProcessRunner>, codesnip_bridge::Error> {
    let resolved = resolve_config(project_root, overrides)?;
    commands::activate(runner_for(project_root), resolved.config).await
}

/// Run a command. `Ok(false)` means the command ran but reported failure.
async fn run_command(
    command: Commands,
    project_root: Option<&Path>,
    overrides: &ConfigOverrides,
    human: bool,
) -> Result<bool, codesnip_bridge::Error> {
    match command {
        Commands::Doctor => {
            let resolved = resolve_config(project_root, overrides)?;
            let result = commands::doctor(&runner_for(project_root), resolved).await;
            output(&result, human);
            return Ok(result.ok);
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let resolved = resolve_config(project_root, overrides)?;
                output(&commands::config_show(resolved), human);
            }
            ConfigCommands::Init { source, force } => {
                let root = match project_root {
                    Some(root) => root.to_path_buf(),
                    None => env::current_dir()?,
                };
                output(&commands::config_init(&root, source, force)?, human);
            }
        },
        Commands::Status => {
            let resolved = resolve_config(project_root, overrides)?;
            output(&commands::status(&resolved), human);
        }
        Commands::Ensure { force } => {
            let mut orchestrator = activate(project_root, overrides).await?;
            output(&commands::ensure(&mut orchestrator, force).await?, human);
        }
        Commands::Update => {
            let mut orchestrator = activate(project_root, overrides).await?;
            let result = commands::update(&mut orchestrator).await?;
            output(&result, human);
            return Ok(result.is_success());
        }
        Commands::Verify => {
            let mut orchestrator = activate(project_root, overrides).await?;
            let result = commands::verify(&mut orchestrator).await?;
            output(&result, human);
            return Ok(result.report.success);
        }
        Commands::List => {
            let mut orchestrator = activate(project_root, overrides).await?;
            output(&commands::list(&mut orchestrator).await?, human);
        }
        Commands::Bundle {
            name,
            file,
            selection,
            write,
        } => {
            let mut orchestrator = activate(project_root, overrides).await?;
            let target = BundleTarget {
                file,
                selection,
                write,
            };
            output(&commands::bundle(&mut orchestrator, &name, target).await?, human);
        }
        Commands::Watch => {
            let orchestrator = activate(project_root, overrides).await?;
            commands::watch(
                orchestrator,
                project_root.map(Path::to_path_buf),
                overrides.clone(),
                |event| output(event, human),
            )
            .await?;
        }
    }

    Ok(true)
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Report an error on stderr and exit with status 1.
fn exit_with_error(err: &codesnip_bridge::Error, human: bool) -> ! {
    if human {
        eprintln!("{}", messages::notify_error(err));
    } else {
        let report = ErrorReport::from_error(err);
        match serde_json::to_string(&report) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!(r#"{{"error": "{}"}}"#, err),
        }
    }
    process::exit(1);
}
