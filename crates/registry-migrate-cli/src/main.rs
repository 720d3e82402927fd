//! registry-migrate CLI - replicate missing package versions between registries.

use clap::{Parser, Subcommand};
use registry_migrate::{Config, MigrateError, MigrationResult, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "registry-migrate")]
#[command(about = "Replicate missing package versions between package registries")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate missing versions of the given modules
    Run {
        /// Module names to migrate
        #[arg(required = true)]
        modules: Vec<String>,

        /// Override number of parallel version transfers per module
        #[arg(long)]
        workers: Option<usize>,

        /// Stage and transform artifacts without publishing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the versions that would be migrated, without transferring
    Diff {
        /// Module names to compare
        #[arg(required = true)]
        modules: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler().await?;

    match cli.command {
        Commands::Run {
            modules,
            workers,
            dry_run,
        } => {
            if let Some(w) = workers {
                config.migration.workers = Some(w);
            }

            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.run(&modules, cancel_token, dry_run).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_result(&result, dry_run);
            }

            // Per-version failures alter the exit code
            if result.has_failures() {
                let failed: Vec<&str> = result
                    .modules
                    .iter()
                    .filter(|m| m.has_failures())
                    .map(|m| m.module.as_str())
                    .collect();
                return Err(MigrateError::migration(
                    failed.join(", "),
                    format!(
                        "{} version(s) failed across {} module(s)",
                        result.versions_failed,
                        failed.len()
                    ),
                ));
            }
        }

        Commands::Diff { modules } => {
            let orchestrator = Orchestrator::new(config)?;
            let mut plan = Vec::with_capacity(modules.len());

            for module in &modules {
                let missing = orchestrator.diff_module(module).await?;
                plan.push((module.clone(), missing));
            }

            if cli.output_json {
                let json: serde_json::Value = plan
                    .iter()
                    .map(|(module, missing)| (module.clone(), serde_json::json!(missing)))
                    .collect::<serde_json::Map<_, _>>()
                    .into();
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                for (module, missing) in &plan {
                    if missing.is_empty() {
                        println!("{}: nothing to migrate", module);
                    } else {
                        println!("{}: {} version(s) to migrate", module, missing.len());
                        for version in missing {
                            println!("  {}", version);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_result(result: &MigrationResult, dry_run: bool) {
    let heading = if dry_run {
        "Dry run completed!"
    } else {
        "Migration completed!"
    };
    println!("\n{}", heading);
    println!("  Status: {}", result.status);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Modules: {}/{}",
        result.modules_total - result.modules_failed,
        result.modules_total
    );
    println!("  Versions considered: {}", result.versions_considered);
    println!("  Versions migrated: {}", result.versions_migrated);
    if result.versions_skipped > 0 {
        println!("  Versions skipped: {}", result.versions_skipped);
    }
    if result.versions_failed > 0 {
        println!("  Versions failed: {}", result.versions_failed);
        for module in result.modules.iter().filter(|m| m.has_failures()) {
            if let Some(ref error) = module.error {
                println!("    {}: {}", module.module, error);
            }
            for failure in &module.failed {
                println!(
                    "    {}@{}: {}",
                    module.module, failure.version, failure.error
                );
            }
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    // Clone token for each signal handler
    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    // SIGINT handler (Ctrl-C)
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Finishing in-flight transfers...");
        token_int.cancel();
    });

    // SIGTERM handler
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Finishing in-flight transfers...");
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only SIGINT/Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Finishing in-flight transfers...");
        token.cancel();
    });

    Ok(cancel_token)
}
