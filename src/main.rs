//! Binary entry point for the `vmvault` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vmvault::config::{ConfigError, OpenStackConfig, PipelineConfig};
use vmvault::ledger::FileLedger;
use vmvault::openstack::{OpenStackBackend, OpenStackError};
use vmvault::pipeline::{
    BackupOrchestrator, BackupReport, DeleteOrchestrator, DeleteSummary, PipelineError,
    RestoreOrchestrator, RestoreReport,
};
use vmvault::poll::{CancelToken, Poller};

mod cli;

use cli::{BackupCommand, Cli, DeleteCommand, RestoreCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Backend(#[from] OpenStackError),
    #[error("backup failed: {0}")]
    Backup(#[source] PipelineError<OpenStackError>),
    #[error("restore failed: {0}")]
    Restore(#[source] PipelineError<OpenStackError>),
    #[error("delete failed: {0}")]
    Delete(#[source] PipelineError<OpenStackError>),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Everything a command needs once configuration has been loaded.
struct Runtime {
    backend: OpenStackBackend,
    ledger: FileLedger,
    poller: Poller,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let cancel = CancelToken::new();
    watch_for_interrupt(cancel.clone());

    let exit_code = match dispatch(cli, cancel).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

/// Cancels in-flight waits on Ctrl-C so the run stops at the next poll.
fn watch_for_interrupt(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current call");
            cancel.cancel();
        }
    });
}

async fn dispatch(cli: Cli, cancel: CancelToken) -> Result<(), CliError> {
    let runtime = load_runtime(cancel)?;
    let stdout = io::stdout();
    match cli {
        Cli::Backup(command) => exec_backup(runtime, &command, stdout.lock()).await,
        Cli::Restore(command) => exec_restore(runtime, &command, stdout.lock()).await,
        Cli::Delete(command) => exec_delete(runtime, &command, stdout.lock()).await,
    }
}

fn load_runtime(cancel: CancelToken) -> Result<Runtime, CliError> {
    let credentials = OpenStackConfig::load_without_cli_args()?;
    credentials.validate()?;
    let settings = PipelineConfig::load_without_cli_args()?;
    settings.validate()?;

    let ledger = FileLedger::new(settings.ledger_path());
    info!(ledger = %ledger.path(), "using backup ledger");
    Ok(Runtime {
        backend: OpenStackBackend::new(credentials)?,
        ledger,
        poller: Poller::new(settings.poll_policy()).with_cancel_token(cancel),
    })
}

async fn exec_backup(
    runtime: Runtime,
    command: &BackupCommand,
    out: impl Write,
) -> Result<(), CliError> {
    let report = BackupOrchestrator::new(runtime.backend, runtime.ledger, runtime.poller)
        .execute(&command.instance_id)
        .await
        .map_err(CliError::Backup)?;
    write_backup_report(out, &report)
}

async fn exec_restore(
    runtime: Runtime,
    command: &RestoreCommand,
    out: impl Write,
) -> Result<(), CliError> {
    let report = RestoreOrchestrator::new(runtime.backend, runtime.ledger, runtime.poller)
        .execute(&command.instance_id, &command.backup_ids)
        .await
        .map_err(CliError::Restore)?;
    write_restore_report(out, &report)
}

async fn exec_delete(
    runtime: Runtime,
    command: &DeleteCommand,
    out: impl Write,
) -> Result<(), CliError> {
    let summary = DeleteOrchestrator::new(runtime.backend, runtime.ledger, runtime.poller)
        .execute(&command.backup_ids)
        .await
        .map_err(CliError::Delete)?;
    write_delete_summary(out, &summary)
}

fn write_backup_report(mut out: impl Write, report: &BackupReport) -> Result<(), CliError> {
    for backup_id in report.backup_ids() {
        writeln!(out, "{backup_id}")?;
    }
    Ok(())
}

fn write_restore_report(mut out: impl Write, report: &RestoreReport) -> Result<(), CliError> {
    writeln!(out, "{}", report.server.id)?;
    Ok(())
}

fn write_delete_summary(mut out: impl Write, summary: &DeleteSummary) -> Result<(), CliError> {
    for backup_id in &summary.deleted {
        writeln!(out, "{backup_id}")?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
