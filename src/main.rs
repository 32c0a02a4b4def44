//! azmc CLI entrypoint.
//!
//! Reads manifests, drives the reconciliation client and prints results.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use azure_multicloud::cli::{Cli, Commands, LifecycleArgs, LogFormat, OutputFormatter, StateCommands};
use azure_multicloud::client::MultiCloudClient;
use azure_multicloud::config::{ClientConfig, ConfigHasher, ConfigParser, ConfigValidator, Manifest};
use azure_multicloud::error::{ConfigError, Result};
use azure_multicloud::planner::{DeleteOutcome, OperationPlan};
use azure_multicloud::reconciler::{ApplyOptions, ApplyOutcome};
use azure_multicloud::resources::{AzureClient, Cluster, NodePool, ParentRef, Resource, ResourceKind};
use azure_multicloud::state::{ApplyRecord, LocalStateStore, StateDocument, StateStore};

use clap::Parser;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
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

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Validate { file } => cmd_validate(&file, &formatter),
        Commands::Plan { file } => cmd_plan(config_path, &file, &formatter).await,
        Commands::Apply {
            file,
            yes,
            lifecycle,
            use_state_hint,
        } => cmd_apply(config_path, &file, yes, lifecycle, use_state_hint, &formatter).await,
        Commands::Get { file } => cmd_get(config_path, &file, &formatter).await,
        Commands::List {
            kind,
            project,
            location,
            cluster,
            page_size,
        } => {
            let parent = ParentRef::new(kind.into(), &project, &location, cluster.as_deref());
            cmd_list(config_path, &parent, page_size, &formatter).await
        }
        Commands::Delete { file, yes } => cmd_delete(config_path, &file, yes, &formatter).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Validates manifests without contacting the API.
fn cmd_validate(file: &Path, formatter: &OutputFormatter) -> Result<()> {
    let manifests = ConfigParser::new().load_manifests(file)?;
    let result = ConfigValidator::new().check_manifests(&manifests);

    emit(&formatter.format_validation(&result, manifests.len()))?;

    match result.errors.first() {
        None => Ok(()),
        Some(first) => Err(ConfigError::validation(&first.message, &first.field).into()),
    }
}

/// Shows the plan of every manifest.
async fn cmd_plan(
    config_path: Option<&Path>,
    file: &Path,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, manifests) = load(config_path, file)?;
    let client = create_client(&config)?;
    let state = LocalStateStore::with_state_path(config.state_path())
        .load_or_default()
        .await?;
    let hasher = ConfigHasher::new();

    for manifest in &manifests {
        let reference = manifest.resource_ref()?;
        if let Some(record) = state.get(&reference.path()) {
            if !record.matches_fingerprint(&hasher.hash_manifest(manifest)?) {
                emit(&formatter.warning(&format!("{reference} changed since the last apply")))?;
            }
        }

        let plan = plan_manifest(&client, manifest, &ApplyOptions::default()).await?;
        emit(&formatter.format_plan(&plan))?;
    }

    Ok(())
}

/// Applies every manifest in order and records the results.
async fn cmd_apply(
    config_path: Option<&Path>,
    file: &Path,
    auto_approve: bool,
    lifecycle: LifecycleArgs,
    use_state_hint: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, manifests) = load(config_path, file)?;
    let client = create_client(&config)?;
    let store = LocalStateStore::with_state_path(config.state_path());
    let mut state = store.load_or_default().await?;
    let hasher = ConfigHasher::new();

    let state_hint = |state: &StateDocument, manifest: &Manifest| -> Result<Option<Value>> {
        if !use_state_hint {
            return Ok(None);
        }
        Ok(state.observed(&manifest.resource_ref()?))
    };

    let mut plans = Vec::with_capacity(manifests.len());
    for manifest in &manifests {
        let options = ApplyOptions {
            lifecycle: lifecycle.into(),
            state_hint: state_hint(&state, manifest)?,
            deadline: None,
        };
        plans.push(plan_manifest(&client, manifest, &options).await?);
    }

    if plans.iter().all(OperationPlan::is_empty) {
        emit(&formatter.success("No changes to apply."))?;
        return Ok(());
    }

    if !auto_approve {
        for plan in plans.iter().filter(|p| !p.is_empty()) {
            emit(&formatter.format_plan(plan))?;
        }
        if !confirm("Do you want to apply these changes?")? {
            emit(&formatter.warning("Apply cancelled."))?;
            return Ok(());
        }
    }

    for manifest in &manifests {
        let options = ApplyOptions {
            lifecycle: lifecycle.into(),
            state_hint: state_hint(&state, manifest)?,
            deadline: None,
        };

        let fingerprint = hasher.hash_manifest(manifest)?;
        let result = apply_manifest(&client, manifest, &options, &fingerprint).await;

        let (plan, record) = match result {
            Ok(applied) => applied,
            Err(e) => {
                // Keep what converged so far.
                store.save(&state).await?;
                return Err(e);
            }
        };

        emit(&formatter.format_apply(&plan, record.attempts, &record.apply_id.to_string()))?;
        state.record(record);
    }

    store.save(&state).await?;
    info!("Applied {} resource(s)", manifests.len());
    Ok(())
}

/// Shows the live state of every manifest's resource.
async fn cmd_get(
    config_path: Option<&Path>,
    file: &Path,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, manifests) = load(config_path, file)?;
    let client = create_client(&config)?;

    for manifest in &manifests {
        let tree = match manifest {
            Manifest::AzureClient(r) => client.get(r).await?.to_tree()?,
            Manifest::AzureCluster(r) => client.get(r).await?.to_tree()?,
            Manifest::AzureNodePool(r) => client.get(r).await?.to_tree()?,
        };
        emit(&formatter.format_resource(&tree))?;
    }

    Ok(())
}

/// Lists resources of one kind.
async fn cmd_list(
    config_path: Option<&Path>,
    parent: &ParentRef,
    page_size: i32,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let client = create_client(&config)?;

    let (trees, next_page_token) = match parent.kind {
        ResourceKind::AzureClient => list_trees::<AzureClient>(&client, parent, page_size).await?,
        ResourceKind::AzureCluster => list_trees::<Cluster>(&client, parent, page_size).await?,
        ResourceKind::AzureNodePool => list_trees::<NodePool>(&client, parent, page_size).await?,
    };

    emit(&formatter.format_resources(parent.kind, &trees))?;
    if let Some(token) = next_page_token {
        emit(&formatter.warning(&format!("More results available (next page token: {token})")))?;
    }

    Ok(())
}

/// Deletes every manifest's resource, dependents first.
async fn cmd_delete(
    config_path: Option<&Path>,
    file: &Path,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, manifests) = load(config_path, file)?;
    let client = create_client(&config)?;
    let store = LocalStateStore::with_state_path(config.state_path());
    let mut state = store.load_or_default().await?;

    if !auto_approve {
        for manifest in manifests.iter().rev() {
            emit(&format!("  - {}", manifest.resource_ref()?))?;
        }
        if !confirm("Do you want to delete these resources?")? {
            emit(&formatter.warning("Delete cancelled."))?;
            return Ok(());
        }
    }

    for manifest in manifests.iter().rev() {
        let reference = manifest.resource_ref()?;
        let outcome = match manifest {
            Manifest::AzureClient(r) => client.delete(r).await,
            Manifest::AzureCluster(r) => client.delete(r).await,
            Manifest::AzureNodePool(r) => client.delete(r).await,
        };

        match outcome {
            Ok(DeleteOutcome::Deleted) => {
                emit(&formatter.success(&format!("Deleted {reference}")))?;
            }
            Ok(DeleteOutcome::AlreadyAbsent) => {
                emit(&formatter.success(&format!("{reference} does not exist")))?;
            }
            Err(e) => {
                store.save(&state).await?;
                return Err(e);
            }
        }
        state.remove(&reference.path());
    }

    store.save(&state).await?;
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = LocalStateStore::with_state_path(config.state_path());

    match command {
        StateCommands::Show => {
            if let Some(state) = store.load().await? {
                emit(&formatter.format_state(&state))?;
            } else {
                emit(&formatter.warning("No state found."))?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads the client configuration.
fn load_config(config_path: Option<&Path>) -> Result<ClientConfig> {
    ConfigParser::new().load(config_path)
}

/// Loads the client configuration and the validated manifests.
fn load(config_path: Option<&Path>, file: &Path) -> Result<(ClientConfig, Vec<Manifest>)> {
    let config = load_config(config_path)?;
    let manifests = ConfigParser::new().load_manifests(file)?;

    let result = ConfigValidator::new().validate_manifests(&manifests)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    debug!("Loaded {} manifest(s) from {}", manifests.len(), file.display());

    Ok((config, manifests))
}

/// Creates a client cancelled on Ctrl-C.
fn create_client(config: &ClientConfig) -> Result<MultiCloudClient> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight work");
            on_interrupt.cancel();
        }
    });

    Ok(MultiCloudClient::new(config)?.with_cancellation(cancel))
}

async fn plan_manifest(
    client: &MultiCloudClient,
    manifest: &Manifest,
    options: &ApplyOptions,
) -> Result<OperationPlan> {
    match manifest {
        Manifest::AzureClient(r) => client.plan(r, options).await,
        Manifest::AzureCluster(r) => client.plan(r, options).await,
        Manifest::AzureNodePool(r) => client.plan(r, options).await,
    }
}

async fn apply_manifest(
    client: &MultiCloudClient,
    manifest: &Manifest,
    options: &ApplyOptions,
    fingerprint: &str,
) -> Result<(OperationPlan, ApplyRecord)> {
    match manifest {
        Manifest::AzureClient(r) => summarize(r, client.apply(r, options).await?, fingerprint),
        Manifest::AzureCluster(r) => summarize(r, client.apply(r, options).await?, fingerprint),
        Manifest::AzureNodePool(r) => summarize(r, client.apply(r, options).await?, fingerprint),
    }
}

fn summarize<R: Resource>(
    desired: &R,
    outcome: ApplyOutcome<R>,
    fingerprint: &str,
) -> Result<(OperationPlan, ApplyRecord)> {
    let record = ApplyRecord::from_outcome(&desired.resource_ref()?, fingerprint, &outcome);
    Ok((outcome.plan, record))
}

/// Lists one page, or everything when the server picks the page size.
async fn list_trees<R: Resource>(
    client: &MultiCloudClient,
    parent: &ParentRef,
    page_size: i32,
) -> Result<(Vec<Value>, Option<String>)> {
    let (items, next_page_token) = if page_size < 0 {
        (client.list_all::<R>(parent).await?, None)
    } else {
        let page = client.list::<R>(parent, None, page_size).await?;
        (page.items, page.next_page_token)
    };

    let trees = items
        .iter()
        .map(R::to_tree)
        .collect::<Result<Vec<_>>>()?;
    Ok((trees, next_page_token))
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N]: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", text.trim_end())?;
    Ok(())
}
