//! `microcks-host` command line.
//!
//! Drives a Microcks server that is already running: synchronise the
//! artifacts declared in the config file, probe health, launch contract tests
//! and check invocation metrics.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::api::types::{TestRequest, TestRunnerType};
use crate::cancel::CancellationContext;
use crate::client::MicrocksClient;
use crate::config::{Config, ExecutionMode};
use crate::errors::{MicrocksError, EXIT_SUCCESS, EXIT_TEST_FAILED};
use crate::observability::telemetry::{init_tracing_json, init_tracing_with_filter};
use crate::resource::{ContainerImage, MockServerBuilder, MockServerResource, RemoteArtifact};
use crate::supervision::HealthGate;
use crate::sync::{ArtifactSynchronizer, ClientRegistry};

#[derive(Parser, Debug)]
#[command(name = "microcks-host")]
#[command(about = "Provision Microcks mock servers and run contract tests against them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Log filter (RUST_LOG syntax)
    #[arg(long, default_value = "info", global = true)]
    log: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import the artifacts of every resource declared in the config file
    Sync {
        /// run (default) or publish; publish performs no I/O
        #[arg(short = 'm', long, value_enum, default_value = "run")]
        mode: ExecutionMode,

        /// Give up waiting for the servers after this many seconds
        #[arg(long, default_value = "120")]
        wait_secs: u64,
    },

    /// Check whether a Microcks server is healthy
    Health {
        #[arg(long)]
        url: Option<String>,
    },

    /// Launch a contract test and print its result as JSON
    Test {
        #[arg(long)]
        url: Option<String>,

        /// Service identifier, `name:version`
        #[arg(long)]
        service: String,

        /// Endpoint under test
        #[arg(long)]
        endpoint: String,

        #[arg(long, value_enum, default_value = "open-api-schema")]
        runner: TestRunnerType,

        #[arg(long, default_value = "2000")]
        timeout_ms: u64,

        /// Restrict the test to these operations
        #[arg(long = "operation")]
        operations: Vec<String>,
    },

    /// Print the daily invocation count of a service
    Verify {
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        service: String,

        #[arg(long)]
        version: String,

        /// Day to query, yyyyMMdd; today when omitted
        #[arg(long, value_parser = parse_day)]
        day: Option<NaiveDate>,
    },
}

fn parse_day(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|e| format!("expected yyyyMMdd: {}", e))
}

/// Parse arguments, run the command and return the process exit code.
pub async fn run(ctx: CancellationContext) -> Result<u8> {
    let cli = Cli::parse();

    if cli.no_color || std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }
    if cli.json_logs {
        init_tracing_json(&cli.log);
    } else {
        init_tracing_with_filter(&cli.log);
    }

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { mode, wait_secs } => {
            config.execution_mode = mode;
            let base_dir = config_dir(cli.config.as_deref());
            let ctx = ctx.with_timeout(Duration::from_secs(wait_secs));
            sync(&config, &base_dir, &ctx).await
        }
        Commands::Health { url } => {
            let client = client_for(&config, url.as_deref())?;
            if client.is_healthy(&ctx).await {
                println!("{} Microcks is healthy", "✓".bright_green());
                Ok(EXIT_SUCCESS)
            } else {
                println!("{} Microcks is not healthy", "✗".bright_red());
                Ok(EXIT_TEST_FAILED)
            }
        }
        Commands::Test {
            url,
            service,
            endpoint,
            runner,
            timeout_ms,
            operations,
        } => {
            let client = client_for(&config, url.as_deref())?;
            let mut builder = TestRequest::builder(service, runner, endpoint)
                .timeout(Duration::from_millis(timeout_ms));
            if !operations.is_empty() {
                builder = builder.filtered_operations(operations);
            }
            let result = client.test_endpoint(&builder.build(), &ctx).await?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.success {
                eprintln!("{} Test {} passed", "✓".bright_green(), result.id);
                Ok(EXIT_SUCCESS)
            } else {
                eprintln!("{} Test {} failed", "✗".bright_red(), result.id);
                Ok(EXIT_TEST_FAILED)
            }
        }
        Commands::Verify {
            url,
            service,
            version,
            day,
        } => {
            let client = client_for(&config, url.as_deref())?;
            let count = client
                .invocations_count(&service, &version, day, &ctx)
                .await?;
            println!("{}", count);
            Ok(if count > 0.0 {
                EXIT_SUCCESS
            } else {
                EXIT_TEST_FAILED
            })
        }
    }
}

fn client_for(config: &Config, url: Option<&str>) -> Result<MicrocksClient> {
    let url = url.unwrap_or(&config.url);
    Ok(MicrocksClient::connect(url, config)?)
}

/// Directory relative artifact paths are resolved against.
fn config_dir(config_path: Option<&str>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    config_path
        .and_then(|p| Path::new(p).parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| cwd.join(p))
        .unwrap_or(cwd)
}

/// Resources declared in `config`, allocated at their configured URLs.
pub fn resources_from_config(
    config: &Config,
    base_dir: &Path,
) -> std::result::Result<Vec<MockServerResource>, MicrocksError> {
    let mut resources = Vec::with_capacity(config.resources.len());
    for declared in &config.resources {
        let mut builder = MockServerBuilder::new(&declared.name, base_dir)?
            .with_image(ContainerImage::from(&config.image))
            .with_readiness(config.readiness.marker.clone(), config.readiness.timeout())
            .with_main_artifacts(&declared.main_artifacts)
            .with_secondary_artifacts(&declared.secondary_artifacts)
            .with_main_remote_artifacts(
                declared.main_remote_artifacts.iter().map(RemoteArtifact::from),
            )
            .with_secondary_remote_artifacts(
                declared.secondary_remote_artifacts.iter().map(RemoteArtifact::from),
            );
        for snapshot in &declared.snapshots {
            builder = builder.with_snapshots(snapshot)?;
        }

        let mut resource = builder.build();
        resource
            .endpoint_mut()
            .allocate_from_url(config.resource_url(declared))?;
        resources.push(resource);
    }
    Ok(resources)
}

async fn sync(config: &Config, base_dir: &Path, ctx: &CancellationContext) -> Result<u8> {
    let resources = resources_from_config(config, base_dir)?;
    if resources.is_empty() {
        println!("{} No resources declared", "·".dimmed());
        return Ok(EXIT_SUCCESS);
    }

    let mut gate = HealthGate::new(config.readiness.gate_interval());
    for resource in &resources {
        for check in resource.health_checks(config, None)? {
            gate.add_check(resource.name(), check);
        }
    }

    let clients = ClientRegistry::from_resources(&resources, config)?;
    let synchronizer = ArtifactSynchronizer::new(config.execution_mode, Arc::new(gate), clients);
    let report = synchronizer
        .after_resources_created(&resources, ctx)
        .await
        .context("Artifact synchronisation failed")?;

    for synced in &report.synced {
        println!(
            "{} {}: {} main, {} secondary, {} remote, {} snapshot(s)",
            "✓".bright_green(),
            synced.resource.bright_white(),
            synced.main_artifacts,
            synced.secondary_artifacts,
            synced.main_remote_artifacts + synced.secondary_remote_artifacts,
            synced.snapshots
        );
    }
    for skipped in &report.skipped {
        println!("{} {} skipped", "·".dimmed(), skipped);
    }
    Ok(EXIT_SUCCESS)
}
