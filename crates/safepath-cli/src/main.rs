mod display;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use safepath_core::delivery::DeliveryClient;
use safepath_core::nmap_xml::NmapXmlParser;
use safepath_core::scanner::NmapInvoker;
use safepath_core::severity::policy_for;
use safepath_core::{ConfigOverrides, FindingBuilder, Pipeline, RunConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "safepath",
    version,
    about = "safepath: scan targets with nmap and ship open services to the findings store",
    long_about = "Runs one unattended pass: nmap every target, keep the open ports, and POST each one \
    to <backend>/api/findings with bounded retry.\n\nMeant to be triggered by a scheduler such as a systemd timer or cron."
)]
struct Cli {
    /// More log output (debug)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every target once and deliver the findings
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Comma-separated targets (overrides TARGETS)
        #[arg(long)]
        targets: Option<String>,

        /// Scan timeout per target, in seconds (overrides NMAP_TIMEOUT)
        #[arg(long)]
        scan_timeout: Option<u64>,

        /// Maximum delivery attempts per finding (overrides RETRY_POST)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Base retry delay in seconds (overrides RETRY_DELAY)
        #[arg(long)]
        retry_delay: Option<f64>,

        /// Build findings but do not deliver them
        #[arg(long)]
        dry_run: bool,

        /// Check the store's health endpoint before scanning
        #[arg(long)]
        preflight: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Parse a saved nmap XML file and show the findings it would produce
    Parse {
        /// Path to the nmap XML output
        path: PathBuf,

        /// Target used when the output lacks a hostname or address
        #[arg(long, default_value = "unknown")]
        target: String,

        /// TOML configuration file (severity settings)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that the findings store is up
    Health {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Findings store base URL (overrides BACKEND_URL)
    #[arg(long)]
    backend: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run {
            config,
            targets,
            scan_timeout,
            max_attempts,
            retry_delay,
            dry_run,
            preflight,
            format,
        } => {
            let overrides = ConfigOverrides {
                backend_url: config.backend,
                targets,
                scan_timeout_secs: scan_timeout,
                max_attempts,
                retry_delay_secs: retry_delay,
            };
            let run_config = load_config(config.config.as_deref(), &overrides)?;
            runtime()?.block_on(cmd_run(&run_config, dry_run, preflight, &format))
        }
        Commands::Parse {
            path,
            target,
            config,
            format,
        } => {
            let run_config = load_config(config.as_deref(), &ConfigOverrides::default())?;
            cmd_parse(&path, &target, &run_config, &format)
        }
        Commands::Health { config } => {
            let overrides = ConfigOverrides {
                backend_url: config.backend,
                ..Default::default()
            };
            let run_config = load_config(config.config.as_deref(), &overrides)?;
            runtime()?.block_on(cmd_health(&run_config))
        }
    }
}

/// Single-threaded runtime for the subcommands that do network or process I/O.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if verbose {
        "safepath_cli=debug,safepath_core=debug"
    } else if quiet {
        "warn"
    } else {
        "safepath_cli=info,safepath_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The one place process environment is read.
fn load_config(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<RunConfig> {
    RunConfig::load(file, |key| std::env::var(key).ok(), overrides)
        .context("Invalid configuration")
}

fn build_client(config: &RunConfig) -> Result<DeliveryClient> {
    DeliveryClient::new(&config.backend_url, config.retry_policy(), config.request_timeout)
        .context("Failed to build HTTP client")
}

async fn cmd_run(config: &RunConfig, dry_run: bool, preflight: bool, format: &str) -> Result<()> {
    let scanner = NmapInvoker::new(
        config.scanner_program.clone(),
        config.scanner_args.clone(),
        config.scan_timeout,
    );
    let policy = policy_for(config.severity, &config.severity_overrides);
    let client = build_client(config)?;

    if preflight && !dry_run {
        match client.health().await {
            Ok(true) => info!(backend = %config.backend_url, "findings store is healthy"),
            Ok(false) => warn!(backend = %config.backend_url, "findings store reports unhealthy, delivering anyway"),
            Err(e) => warn!(backend = %config.backend_url, error = %e, "findings store unreachable, delivering anyway"),
        }
    }

    info!(
        targets = %config.targets,
        backend = %config.backend_url,
        dry_run,
        "starting scan pass"
    );

    let mut pipeline = Pipeline::new(&scanner, policy.as_ref());
    if !dry_run {
        pipeline = pipeline.with_sink(&client);
    }
    let summary = pipeline.run(&config.targets).await;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => display::print_run_summary(&summary),
    }

    Ok(())
}

fn cmd_parse(path: &Path, target: &str, config: &RunConfig, format: &str) -> Result<()> {
    let candidates = NmapXmlParser::parse_file(path, target)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let policy = policy_for(config.severity, &config.severity_overrides);
    let builder = FindingBuilder::new(policy.as_ref());
    let findings: Vec<_> = candidates.into_iter().map(|c| builder.build(c)).collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&findings)?),
        _ => display::print_findings(path, &findings),
    }

    Ok(())
}

async fn cmd_health(config: &RunConfig) -> Result<()> {
    let client = build_client(config)?;
    let healthy = client
        .health()
        .await
        .with_context(|| format!("Could not reach {}", client.health_url()))?;

    display::print_health(&client.health_url(), healthy);
    if !healthy {
        anyhow::bail!("Findings store at '{}' is not healthy", config.backend_url);
    }
    Ok(())
}
