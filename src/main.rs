use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use driftguard::alert::TracingAlertSink;
use driftguard::audit::{AuditLog, AuditQuery};
use driftguard::cli::{Cli, Command, RunArgs, TargetArgs};
use driftguard::controller::{Controller, CycleReport, ShutdownSignal, shutdown};
use driftguard::error::GuardError;
use driftguard::manifest::Manifest;
use driftguard::{config, output, providers};

const EXIT_BLOCKED: u8 = 2;
const EXIT_UNAVAILABLE: u8 = 3;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => Ok(code),
        Err(err) if err.is_policy_violation() => {
            tracing::debug!(error = %err, "refused by policy");
            eprintln!("error: {}", err);
            Ok(ExitCode::from(EXIT_BLOCKED))
        }
        Err(err) => Err(err.into()),
    }
}

async fn execute(cli: Cli) -> Result<ExitCode, GuardError> {
    let audit_path = cli
        .audit_log
        .clone()
        .unwrap_or_else(config::default_audit_path);

    match cli.command {
        Command::Validate(args) => {
            let manifest = Manifest::load(&args.manifest)?;
            let immutable = manifest.resources().iter().filter(|s| s.immutable).count();
            tracing::info!(count = manifest.len(), immutable, "manifest valid");
            println!("{} resource(s) valid, {} immutable", manifest.len(), immutable);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            let audit = Arc::new(AuditLog::open(&audit_path)?);
            let (controller, manifest) = build_controller(&args, audit, 0)?;
            let report = controller
                .run_cycle(&manifest, &ShutdownSignal::never())
                .await;
            println!("{}", output::render_cycle(&report));
            Ok(exit_code(&report))
        }
        Command::Watch(args) => {
            let audit = Arc::new(AuditLog::open(&audit_path)?);
            let (controller, manifest) = build_controller(&args.run, audit, args.interval)?;

            let (handle, signal) = shutdown::channel();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("shutdown requested, finishing in-flight resources"),
                    Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
                }
                handle.trigger();
            });

            controller
                .run_loop(&manifest, signal, |report| {
                    println!("{}", output::render_cycle(report));
                })
                .await;
            Ok(ExitCode::SUCCESS)
        }
        Command::Diff(args) => {
            let audit = Arc::new(AuditLog::in_memory());
            let (controller, manifest) = build_controller(&args, audit, 0)?;
            let plan = controller.plan(&manifest).await;
            println!("{}", output::render_plan(&plan));
            if plan.iter().any(|(diff, _)| diff.is_blocked()) {
                Ok(ExitCode::from(EXIT_BLOCKED))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Audit(args) => {
            let audit = open_existing_audit(&audit_path)?;
            let query = AuditQuery {
                resource: args.resource,
                since: args.since,
                until: args.until,
            };
            let records = audit.query(&query);
            tracing::debug!(count = records.len(), "audit query complete");
            if args.json {
                println!("{}", output::render_audit_json(&records)?);
            } else {
                println!("{}", output::render_audit_table(&records));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Destroy(args) => {
            let (controller, manifest) = target_controller(&args, &audit_path)?;
            controller.destroy(&manifest, &args.resource).await?;
            println!("destroyed {}", args.resource);
            Ok(ExitCode::SUCCESS)
        }
        Command::Recreate(args) => {
            let (controller, manifest) = target_controller(&args, &audit_path)?;
            controller.recreate(&manifest, &args.resource).await?;
            println!("recreated {}", args.resource);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Controller for the single-resource operator commands.
fn target_controller(args: &TargetArgs, audit_path: &Path) -> Result<(Controller, Manifest), GuardError> {
    let manifest = Manifest::load(&args.manifest.manifest)?;
    let api = providers::get_provider(
        args.cluster.provider_name(),
        &args.cluster.provider_config(),
    )?;
    let audit = Arc::new(AuditLog::open(audit_path)?);
    let controller = Controller::new(api, audit, Arc::new(TracingAlertSink), Default::default());
    Ok((controller, manifest))
}

fn build_controller(
    args: &RunArgs,
    audit: Arc<AuditLog>,
    interval_secs: u64,
) -> Result<(Controller, Manifest), GuardError> {
    let manifest = Manifest::load(&args.manifest.manifest)?;
    let api = providers::get_provider(
        args.cluster.provider_name(),
        &args.cluster.provider_config(),
    )?;
    let config = args.tuning.to_config(interval_secs).into_controller_config();

    tracing::info!(
        provider = api.name(),
        resources = manifest.len(),
        concurrency = config.concurrency,
        "controller configured"
    );

    let controller = Controller::new(api, audit, Arc::new(TracingAlertSink), config);
    Ok((controller, manifest))
}

/// Queries must not create an empty log file as a side effect.
fn open_existing_audit(path: &Path) -> Result<AuditLog, GuardError> {
    if path.exists() {
        Ok(AuditLog::open(path)?)
    } else {
        tracing::warn!(path = %path.display(), "audit log does not exist yet");
        Ok(AuditLog::in_memory())
    }
}

fn exit_code(report: &CycleReport) -> ExitCode {
    if report.has_blocked() {
        ExitCode::from(EXIT_BLOCKED)
    } else if report.unavailable() > 0 {
        ExitCode::from(EXIT_UNAVAILABLE)
    } else {
        ExitCode::SUCCESS
    }
}
