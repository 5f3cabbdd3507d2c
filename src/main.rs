//! stackweave CLI entrypoint.
//!
//! This is the main entrypoint for the stackweave command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use stackweave::cli::{Cli, Commands, OutputFormat, OutputFormatter, ProviderArg};
use stackweave::config::{
    ConfigParser, ConfigValidator, Parameters, ProviderConfig, ProviderKind, StackConfig, build_stack, find_config_file,
};
use stackweave::engine::{Engine, PreparedStack};
use stackweave::error::{ConfigError, Result, StackError};
use stackweave::model::Stack;
use stackweave::provider::{HttpRealizer, Realizer, SimulatedRealizer};
use stackweave::stacks;
use stackweave::state::{DeploymentRecord, LocalPlanStore, PlanStore, STATE_DIR, generate_holder_id};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment used for built-in stacks when none is given.
const DEFAULT_ENVIRONMENT: &str = "dev";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

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

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    if let Commands::Init { path, force } = &cli.command {
        return cmd_init(path, *force);
    }

    let target = Target::resolve(&cli)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Validate { warnings } => cmd_validate(&target, warnings, &formatter),
        Commands::Plan { waves } => cmd_plan(&target, waves, &formatter).await,
        Commands::Apply {
            yes,
            provider,
            endpoint,
            parallelism,
        } => {
            let mut settings = target.provider.clone();
            if let Some(provider) = provider {
                settings.kind = match provider {
                    ProviderArg::Simulated => ProviderKind::Simulated,
                    ProviderArg::Http => ProviderKind::Http,
                };
            }
            if endpoint.is_some() {
                settings.endpoint = endpoint;
            }
            if let Some(parallelism) = parallelism {
                settings.parallelism = parallelism;
            }
            cmd_apply(&target, &settings, yes, cli.output, &formatter).await
        }
        Commands::Show { history } => cmd_show(&target, history, &formatter).await,
    }
}

/// Write a starter stack file.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new stack in: {}", path.display());

    let stack_path = path.join("stackweave.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && stack_path.exists() {
        eprintln!("Stack file already exists: {}", stack_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&stack_path, include_str!("../templates/stack.yaml"))?;
    eprintln!("Created: {}", stack_path.display());

    std::fs::write(&env_path, "DOMAIN_NAME=app.example.com\n# STACKWEAVE_TOKEN=\n")?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".env") || !existing.contains(STATE_DIR) {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# stackweave")?;
            if !existing.contains(".env") {
                writeln!(file, ".env")?;
            }
            if !existing.contains(STATE_DIR) {
                writeln!(file, "{STATE_DIR}/")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{STATE_DIR}/\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nStack initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set DOMAIN_NAME");
    eprintln!("  2. Edit stackweave.yaml with your resources");
    eprintln!("  3. Run 'stackweave validate' to check the declarations");
    eprintln!("  4. Run 'stackweave plan' to see the creation order");
    eprintln!("  5. Run 'stackweave apply' to realize the stack");

    Ok(())
}

/// Validate declarations and the dependency graph.
fn cmd_validate(target: &Target, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    if let Some(config) = &target.config {
        let result = ConfigValidator::new().validate(config, &target.parser.parameters(config))?;
        eprintln!("{}", formatter.format_validation(config, &result, show_warnings));
    }

    let stack = target.declare()?;
    let prepared = Engine::new(SimulatedRealizer::new()).prepare(&stack)?;
    eprintln!(
        "Dependency graph is acyclic: {} resources, {} edges, {} waves",
        prepared.order.len(),
        prepared.graph.edge_count(),
        prepared.order.waves().len()
    );
    Ok(())
}

/// Show the creation order and a simulated plan.
async fn cmd_plan(target: &Target, show_waves: bool, formatter: &OutputFormatter) -> Result<()> {
    let stack = target.declare()?;
    let engine = Engine::new(SimulatedRealizer::new()).with_parallelism(target.provider.parallelism);

    let prepared = engine.prepare(&stack)?;
    eprintln!("{}", formatter.format_order(&stack, &prepared, show_waves));

    let plan = engine.deploy(&stack).await?;
    eprintln!("{}", formatter.format_plan(&plan));
    Ok(())
}

/// Realize the stack and record the outcome.
async fn cmd_apply(
    target: &Target,
    settings: &ProviderConfig,
    auto_approve: bool,
    output: OutputFormat,
    formatter: &OutputFormatter,
) -> Result<()> {
    let stack = target.declare()?;
    let engine = Engine::new(create_realizer(settings)?).with_parallelism(settings.parallelism);
    let prepared = engine.prepare(&stack)?;

    let store = target.store(&stack);
    if let Some(record) = store.load().await?
        && is_applied(&record, &engine, &prepared)
    {
        eprintln!("No changes since the last successful apply.");
        return Ok(());
    }

    eprintln!("{}", formatter.format_order(&stack, &prepared, false));

    if !auto_approve {
        if output == OutputFormat::Json {
            return Err(ConfigError::validation("JSON output requires --yes for apply", "yes").into());
        }
        eprint!("Realize {} resources with the {} provider? [y/N]: ", prepared.order.len(), engine.provider_name());
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(());
        }
    }

    let lock = store.acquire_lock(&generate_holder_id()).await?;
    let outcome = apply_locked(&engine, &stack, &store, &prepared, formatter).await;
    store.release_lock(&lock.lock_id).await?;
    outcome
}

/// True if the latest recorded plan came from these declarations on the
/// same provider and endpoint.
fn is_applied(record: &DeploymentRecord, engine: &Engine, prepared: &PreparedStack) -> bool {
    record.is_current(
        &prepared.config_hash,
        engine.provider_name(),
        engine.provider_target().as_deref(),
    )
}

async fn apply_locked(
    engine: &Engine,
    stack: &Stack,
    store: &LocalPlanStore,
    prepared: &PreparedStack,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut record = store
        .load()
        .await?
        .unwrap_or_else(|| DeploymentRecord::new(stack.name(), stack.environment()));

    // Another apply may have finished while this one waited for confirmation.
    if is_applied(&record, engine, prepared) {
        eprintln!("No changes since the last successful apply.");
        return Ok(());
    }

    match engine.deploy(stack).await {
        Ok(plan) => {
            eprintln!("{}", formatter.format_plan(&plan));
            record.record_success(plan);
            store.save(&record).await
        }
        Err(e) => {
            warn!("Apply failed, recording the failure: {e}");
            record.record_failure(&prepared.config_hash, prepared.order.len(), &e.to_string());
            store.save(&record).await?;
            Err(e)
        }
    }
}

/// Show the stored deployment record.
async fn cmd_show(target: &Target, history: bool, formatter: &OutputFormatter) -> Result<()> {
    let store = LocalPlanStore::with_base_dir(&target.state_dir, &target.name, &target.environment);
    debug!(
        "Reading record from {} store at {}",
        store.backend_type(),
        store.record_path().display()
    );

    if store.is_locked().await?
        && let Some(lock) = store.get_lock_info().await?
    {
        eprintln!(
            "Apply in progress by {} since {} (lock expires in {}s)",
            lock.holder,
            lock.acquired_at.to_rfc3339(),
            lock.remaining_secs()
        );
    }

    if !store.exists().await? {
        eprintln!("No deployment recorded for {}/{}.", target.name, target.environment);
        return Ok(());
    }

    match store.load().await? {
        Some(record) => eprintln!("{}", formatter.format_record(&record, history)),
        None => eprintln!("No deployment recorded for {}/{}.", target.name, target.environment),
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// The stack a command operates on, and where its state lives.
struct Target {
    name: String,
    environment: String,
    config: Option<StackConfig>,
    provider: ProviderConfig,
    parser: ConfigParser,
    state_dir: PathBuf,
}

impl Target {
    /// Locates the stack file or built-in stack and loads `.env` next to it.
    fn resolve(cli: &Cli) -> Result<Self> {
        if let Some(name) = &cli.builtin {
            let parser = ConfigParser::new().with_base_path(".");
            parser.load_dotenv()?;
            return Ok(Self {
                name: name.clone(),
                environment: cli.environment.clone().unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
                config: None,
                provider: ProviderConfig::default(),
                parser,
                state_dir: PathBuf::from(STATE_DIR),
            });
        }

        let stack_file = cli
            .file
            .as_ref()
            .map_or_else(|| find_config_file("."), |path| Ok(path.clone()))?;
        debug!("Loading stack file from: {}", stack_file.display());

        let base = stack_file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let parser = ConfigParser::new().with_base_path(&base);
        parser.load_dotenv()?;

        let mut config = parser.load_file(&stack_file)?;
        if let Some(environment) = &cli.environment {
            config.stack.environment.clone_from(environment);
        }

        let state_dir = config
            .state
            .path
            .as_ref()
            .map_or_else(|| base.join(STATE_DIR), |path| base.join(path));

        Ok(Self {
            name: config.stack.name.clone(),
            environment: config.stack.environment.clone(),
            provider: config.provider.clone(),
            config: Some(config),
            parser,
            state_dir,
        })
    }

    /// Declares the stack, checking required parameters first.
    fn declare(&self) -> Result<Stack> {
        if let Some(config) = &self.config {
            let parameters = self.parser.parameters(config);
            ConfigValidator::new().validate(config, &parameters)?;
            return build_stack(config, parameters);
        }

        let parameters = Parameters::from_env(stacks::required_parameters(&self.name).iter().copied());
        Ok(stacks::builtin(&self.name, &parameters)?.with_environment(&self.environment))
    }

    fn store(&self, stack: &Stack) -> LocalPlanStore {
        LocalPlanStore::with_base_dir(&self.state_dir, stack.name(), stack.environment())
    }
}

/// Creates the realizer selected by the provider settings.
fn create_realizer(settings: &ProviderConfig) -> Result<Arc<dyn Realizer>> {
    match settings.kind {
        ProviderKind::Simulated => Ok(Arc::new(SimulatedRealizer::new())),
        ProviderKind::Http => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .ok_or_else(|| ConfigError::missing("provider.endpoint"))?;

            let realizer = match settings.timeout_secs {
                Some(secs) => HttpRealizer::with_timeout(endpoint, secs),
                None => HttpRealizer::new(endpoint),
            }
            .map_err(|e| StackError::internal(e.to_string()))?;

            let realizer = match ConfigParser::provider_token(settings)? {
                Some(token) => realizer.with_token(token),
                None => realizer,
            };
            info!("Using provisioning service at {}", realizer.endpoint());
            Ok(Arc::new(realizer))
        }
    }
}
