//! Keystone CLI entrypoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use keystone::cli::{Cli, Commands, LogFormat, OutputFormatter, StateCommands};
use keystone::config::{
    ConfigHasher, ConfigParser, ConfigValidator, EngineConfig, find_config_file,
};
use keystone::error::{KeystoneError, Result, StateError};
use keystone::graph::{GraphDocument, Urn};
use keystone::state::{LocalStateStore, StateStore, generate_holder_id};
use keystone::syncer::preview;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Installs the tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let (config, base_dir) = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { target, warnings } => {
            cmd_validate(&config, target.as_deref(), warnings, &formatter)
        }
        Commands::Plan { target, detailed } => {
            cmd_plan(&config, &base_dir, &target, detailed, &formatter).await
        }
        Commands::State { command } => cmd_state(&config, &base_dir, command, &formatter).await,
    }
}

/// Check configuration and, optionally, a graph document.
fn cmd_validate(
    config: &EngineConfig,
    target: Option<&Path>,
    warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let validator = ConfigValidator::new();
    let mut result = validator.check(config);

    if let Some(path) = target {
        let graph = GraphDocument::load(path)?.into_graph()?;
        match validator.validate_graph(&graph) {
            Ok(graph_result) => result.warnings.extend(graph_result.warnings),
            Err(e) => result.errors.push(keystone::config::ValidationError {
                field: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    eprintln!("{}", formatter.format_validation(&result, warnings));
    if result.is_valid() {
        Ok(())
    } else {
        Err(KeystoneError::internal(format!(
            "{} validation error(s)",
            result.errors.len()
        )))
    }
}

/// Preview the plan for a graph document against local state.
async fn cmd_plan(
    config: &EngineConfig,
    base_dir: &Path,
    target: &Path,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    ConfigValidator::new().validate(config)?;
    let store = state_store(config, base_dir);
    let state = store.load().await?.unwrap_or_default();
    let graph = GraphDocument::load(target)?.into_graph()?;

    if state.last_applied_hash == ConfigHasher::new().hash_graph(&graph) {
        debug!("Graph matches the last applied fingerprint");
    }

    let preview = preview(&state, &graph)?;
    eprintln!(
        "{}",
        formatter.format_plan(&preview.diff, &preview.operations, detailed)
    );
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config: &EngineConfig,
    base_dir: &Path,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let store = state_store(config, base_dir);

    match command {
        StateCommands::Show => match store.load().await? {
            Some(state) => eprintln!("{}", formatter.format_state(&state)),
            None => eprintln!("No state found."),
        },
        StateCommands::List { resource_type } => {
            let state = store.load().await?.unwrap_or_default();
            eprintln!("{}", formatter.format_resources(&state, resource_type.as_deref()));
        }
        StateCommands::Rm { urn } => {
            let urn = Urn::parse(&urn)?;
            let holder = holder_for(config);
            let lock = store.acquire_lock(&holder).await?;
            let removed = remove_from_state(&store, &urn).await;
            store.release_lock(&lock.lock_id).await?;
            removed?;
            eprintln!("Removed {urn} from state. The remote object was not touched.");
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(|| holder_for(config));
            let lock = store.acquire_lock(&holder).await?;
            eprintln!("{}", formatter.format_lock(&lock));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                store.force_unlock().await?;
                eprintln!("State forcefully unlocked.");
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

async fn remove_from_state(store: &LocalStateStore, urn: &Urn) -> Result<()> {
    let mut state = store.load().await?.ok_or_else(|| StateError::NotFound {
        path: store.state_path().to_path_buf(),
    })?;
    if state.remove(urn).is_none() {
        return Err(StateError::InvalidEntry {
            urn: urn.to_string(),
            message: String::from("not managed"),
        }
        .into());
    }
    for (other, entry) in &state.resources {
        if entry.dependencies.contains(urn) {
            warn!("{other} still depends on {urn}");
        }
    }
    store.save(&state).await
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads configuration: explicit path, else `keystone.yaml` searched upward,
/// else defaults. Returns the directory relative paths resolve against.
fn load_config(config_path: Option<&Path>) -> Result<(EngineConfig, PathBuf)> {
    let config_file = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(std::env::current_dir()?),
    };
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let parser = ConfigParser::new().with_base_path(&base_dir);
    parser.load_dotenv()?;
    let config = parser.load_with_env(config_file.as_deref())?;
    debug!(?config, "Configuration loaded");
    Ok((config, base_dir))
}

fn state_store(config: &EngineConfig, base_dir: &Path) -> LocalStateStore {
    LocalStateStore::new(base_dir.join(&config.state.path))
}

fn holder_for(config: &EngineConfig) -> String {
    match config.lock_holder() {
        "" => generate_holder_id(),
        holder => holder.to_string(),
    }
}
