//! rooda - OODA loop orchestrator for AI coding agents
//!
//! Command-line entry point: loads configuration, then runs, lists or
//! describes procedures.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::json;

use rooda::config::validation::validate_ai_command;
use rooda::config::{
    validate, ConfigLoader, FragmentAction, LogLevel, Procedure, RoodaConfig, RunOverrides,
};
use rooda::observability;
use rooda::procedures::BuiltinCatalog;
use rooda::prompt::{FragmentAssembler, PromptAssembler};
use rooda::r#loop::{IterationState, LoopController, LoopDependencies, LoopStatus, RunPlan};
use rooda::signals::SignalRelay;
use rooda::RoodaError;

/// Summaries longer than this are cut in `rooda list`.
const SUMMARY_WIDTH: usize = 80;

#[derive(Parser)]
#[command(name = "rooda")]
#[command(version)]
#[command(about = "Drive an AI coding agent through bounded OODA loop iterations", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Workspace config file (defaults to ./rooda-config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging and live agent output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log level: debug, info, warn, error
    #[arg(long, global = true, value_name = "LEVEL", value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a procedure
    Run(RunArgs),

    /// List available procedures
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show details of one procedure
    Info {
        /// Procedure name
        procedure: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Procedure name
    procedure: String,

    /// Maximum iterations for this run
    #[arg(short = 'n', long, value_name = "N", conflicts_with = "unlimited",
          value_parser = clap::value_parser!(u32).range(1..))]
    max_iterations: Option<u32>,

    /// Run until the agent signals success or the failure budget is spent
    #[arg(short, long)]
    unlimited: bool,

    /// Validate configuration and print the assembled prompt without running
    #[arg(short, long)]
    dry_run: bool,

    /// AI command line to run (overrides every configured command)
    #[arg(long, value_name = "CMD", value_parser = non_empty)]
    ai_cmd: Option<String>,

    /// Named AI command alias
    #[arg(long, value_name = "NAME", value_parser = non_empty)]
    ai_cmd_alias: Option<String>,

    /// Extra context: a file path or inline text (repeatable)
    #[arg(short, long = "context", value_name = "TEXT|PATH", value_parser = non_empty)]
    contexts: Vec<String>,

    /// Replace the observe phase fragments (repeatable)
    #[arg(long, value_name = "TEXT|PATH", value_parser = non_empty)]
    observe: Vec<String>,

    /// Replace the orient phase fragments (repeatable)
    #[arg(long, value_name = "TEXT|PATH", value_parser = non_empty)]
    orient: Vec<String>,

    /// Replace the decide phase fragments (repeatable)
    #[arg(long, value_name = "TEXT|PATH", value_parser = non_empty)]
    decide: Vec<String>,

    /// Replace the act phase fragments (repeatable)
    #[arg(long, value_name = "TEXT|PATH", value_parser = non_empty)]
    act: Vec<String>,
}

impl RunArgs {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            max_iterations: self.max_iterations,
            unlimited: self.unlimited,
            ai_cmd: self.ai_cmd.clone(),
            ai_cmd_alias: self.ai_cmd_alias.clone(),
        }
    }

    /// Replace phases given on the command line. A value naming an existing
    /// file becomes a path fragment, anything else is inline content.
    fn apply_phase_overrides(&self, procedure: &mut Procedure) {
        for (values, phase) in [
            (&self.observe, &mut procedure.observe),
            (&self.orient, &mut procedure.orient),
            (&self.decide, &mut procedure.decide),
            (&self.act, &mut procedure.act),
        ] {
            if !values.is_empty() {
                *phase = values.iter().map(|v| fragment_from_arg(v)).collect();
            }
        }
    }
}

fn fragment_from_arg(value: &str) -> FragmentAction {
    if Path::new(value).is_file() {
        FragmentAction::from_path(value)
    } else {
        FragmentAction::inline(value)
    }
}

fn non_empty(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        Err("value must not be empty".to_string())
    } else {
        Ok(value.to_string())
    }
}

fn parse_log_level(value: &str) -> Result<LogLevel, String> {
    value.parse().map_err(|e: RoodaError| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            e.downcast_ref::<RoodaError>()
                .map_or(rooda::error::EXIT_USER_ERROR, RoodaError::exit_code)
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let catalog = Arc::new(BuiltinCatalog::new());
    let mut loader = ConfigLoader::new(catalog.clone());
    if let Some(path) = &cli.config {
        loader = loader.with_workspace_file(path);
    }
    let (mut config, chain) = loader
        .load_with_chain()
        .context("failed to load configuration")?;
    validate(&config).context("configuration validation failed")?;

    let level = log_level(&cli, &config);
    observability::init(level, config.loop_settings.log_timestamp_format)?;
    tracing::debug!("Configuration sources: {}", chain.describe());

    match cli.command {
        Commands::List { json } => {
            list(&config, json)?;
            Ok(0)
        }
        Commands::Info { procedure, json } => {
            info(&config, &procedure, json)?;
            Ok(0)
        }
        Commands::Run(args) => {
            if let Some(procedure) = config.procedures.get_mut(&args.procedure) {
                args.apply_phase_overrides(procedure);
            }
            if args.dry_run {
                dry_run(&config, &args, catalog)?;
                return Ok(0);
            }
            run(&config, &args, cli.verbose, catalog).await
        }
    }
}

fn log_level(cli: &Cli, config: &RoodaConfig) -> LogLevel {
    if cli.verbose {
        LogLevel::Debug
    } else if cli.quiet {
        LogLevel::Error
    } else {
        cli.log_level.unwrap_or(config.loop_settings.log_level)
    }
}

// ============================================================================
// run
// ============================================================================

async fn run(
    config: &RoodaConfig,
    args: &RunArgs,
    verbose: bool,
    catalog: Arc<BuiltinCatalog>,
) -> anyhow::Result<i32> {
    let settings = config.run_settings(&args.procedure, &args.overrides())?;
    validate_ai_command("ai_cmd", &settings.ai_cmd)?;

    let mut state = IterationState::new(&settings.procedure_name)
        .with_max_iterations(settings.max_iterations)
        .with_timeout(settings.iteration_timeout)
        .with_max_output_buffer(settings.max_output_buffer)
        .with_failure_threshold(settings.failure_threshold);

    let plan = RunPlan::new(settings.ai_cmd.clone(), settings.procedure.clone())
        .with_context(args.contexts.clone())
        .with_echo(settings.show_ai_output || verbose);
    let controller = LoopController::new(LoopDependencies::real(catalog, None), plan);

    let relay = SignalRelay::setup()?;
    let status = controller.run(&mut state, &relay.token()).await;

    let label = match status {
        LoopStatus::Success => "Loop completed".green().bold(),
        LoopStatus::MaxIters | LoopStatus::Interrupted => "Loop completed".yellow().bold(),
        LoopStatus::Aborted | LoopStatus::Running => "Loop aborted".red().bold(),
    };
    eprintln!("{} {}", label, state.summary());

    Ok(status.exit_code())
}

fn dry_run(config: &RoodaConfig, args: &RunArgs, catalog: Arc<BuiltinCatalog>) -> anyhow::Result<()> {
    println!("=== DRY RUN MODE ===");
    println!();
    println!("✓ Configuration valid");
    println!();

    let procedure = config.procedure(&args.procedure)?;
    println!("✓ Procedure '{}' found", args.procedure);
    println!();

    match config.resolve_ai_command(procedure, &args.overrides()) {
        Ok(cmd) => println!("✓ AI command: {}", cmd),
        Err(e) => println!("{} {}", "!".yellow().bold(), e),
    }
    println!();

    let assembler = FragmentAssembler::new(catalog);
    let prompt = assembler
        .assemble(procedure, &args.contexts, None)
        .context("prompt assembly failed")?;
    println!("✓ Prompt assembled ({} characters)", prompt.chars().count());
    println!();

    println!("--- Assembled Prompt ---");
    println!();
    print!("{}", prompt);
    println!("--- End Prompt ---");
    println!();

    println!("✓ Dry-run validation passed");
    Ok(())
}

// ============================================================================
// list / info
// ============================================================================

fn list(config: &RoodaConfig, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        let entries: Vec<_> = config
            .procedures
            .iter()
            .map(|(name, p)| {
                json!({
                    "name": name,
                    "display": p.display,
                    "summary": p.summary,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if config.procedures.is_empty() {
        println!("No procedures defined.");
        return Ok(());
    }

    println!("{}", "Available procedures:".bold());
    for (name, procedure) in &config.procedures {
        let summary = if procedure.summary.is_empty() {
            "(no summary)"
        } else {
            procedure.summary.as_str()
        };
        println!("  {} {}", format!("{:<20}", name).cyan(), truncate_summary(summary));
    }
    Ok(())
}

fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() <= SUMMARY_WIDTH {
        return summary.to_string();
    }
    let cut: String = summary.chars().take(SUMMARY_WIDTH - 3).collect();
    format!("{}...", cut)
}

fn info(config: &RoodaConfig, name: &str, as_json: bool) -> anyhow::Result<()> {
    let procedure = config.procedure(name)?;
    let display = if procedure.display.is_empty() {
        name
    } else {
        procedure.display.as_str()
    };

    if as_json {
        let phases: serde_json::Map<_, _> = procedure
            .phases()
            .iter()
            .map(|(phase, fragments)| (phase.to_string(), json!(fragments.len())))
            .collect();
        let value = json!({
            "name": name,
            "display": display,
            "summary": procedure.summary,
            "description": procedure.description,
            "fragments": phases,
            "iteration_mode": procedure.iteration_mode.map(|m| m.as_str()),
            "default_max_iterations": procedure.default_max_iterations,
            "iteration_timeout": procedure.iteration_timeout,
            "max_output_buffer": procedure.max_output_buffer,
            "ai_cmd": procedure.ai_cmd,
            "ai_cmd_alias": procedure.ai_cmd_alias,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} {}", "Procedure:".bold(), name);
    println!("{} {}", "Display Name:".bold(), display);
    println!();

    if !procedure.summary.is_empty() {
        println!("{}", "Summary:".bold());
        println!("  {}", procedure.summary);
        println!();
    }
    if !procedure.description.is_empty() {
        println!("{}", "Description:".bold());
        println!("  {}", procedure.description);
        println!();
    }

    println!("{}", "OODA Phases:".bold());
    for (phase, fragments) in procedure.phases() {
        let label = format!("{}{}:", phase[..1].to_uppercase(), &phase[1..]);
        println!("  {:<9} {} fragment(s)", label, fragments.len());
    }
    println!();

    println!("{}", "Configuration:".bold());
    if !procedure.has_overrides() {
        println!("  (uses global defaults)");
        return Ok(());
    }
    if let Some(mode) = procedure.iteration_mode {
        println!("  Iteration mode: {}", mode);
    }
    if let Some(n) = procedure.default_max_iterations {
        println!("  Max iterations: {}", n);
    }
    if let Some(secs) = procedure.iteration_timeout {
        println!("  Timeout: {}s", secs);
    }
    if let Some(bytes) = procedure.max_output_buffer {
        println!("  Output buffer: {} bytes", bytes);
    }
    if let Some(cmd) = &procedure.ai_cmd {
        println!("  AI command: {}", cmd);
    }
    if let Some(alias) = &procedure.ai_cmd_alias {
        println!("  AI alias: {}", alias);
    }
    Ok(())
}
