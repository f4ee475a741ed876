//! Shared fixtures for pipeline BDD scenarios.

use rstest::fixture;
use tokio::runtime::Runtime;
use vmvault::pipeline::{BackupReport, DeleteSummary, RestoreReport, RunLabel};
use vmvault::poll::{PollPolicy, Poller};
use vmvault::test_support::{ManualClock, MemoryLedger, ScriptedCloud};

/// Result of one pipeline run, with failures kept as rendered messages.
#[derive(Clone, Debug)]
pub enum Outcome<T> {
    Success(T),
    Failure(String),
}

impl<T> Outcome<T> {
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure(err.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineContext {
    pub cloud: ScriptedCloud,
    pub ledger: MemoryLedger,
    pub clock: ManualClock,
    pub server_id: Option<String>,
    pub backup: Option<Outcome<BackupReport>>,
    pub restore: Option<Outcome<RestoreReport>>,
    pub delete: Option<Outcome<DeleteSummary>>,
}

impl PipelineContext {
    pub fn poller(&self) -> Poller<ManualClock> {
        Poller::with_clock(PollPolicy::default(), self.clock.clone())
    }

    /// Backup ids produced by the last successful backup run.
    pub fn backup_ids(&self) -> Vec<String> {
        match self.backup.as_ref() {
            Some(Outcome::Success(report)) => report.backup_ids().map(str::to_owned).collect(),
            other => panic!("scenario requires a successful backup, got {other:?}"),
        }
    }
}

#[fixture]
pub fn pipeline_context() -> PipelineContext {
    PipelineContext {
        cloud: ScriptedCloud::new(),
        ledger: MemoryLedger::new(),
        clock: ManualClock::new(),
        server_id: None,
        backup: None,
        restore: None,
        delete: None,
    }
}

pub fn run_label() -> RunLabel {
    RunLabel::new("bddrun01")
}

pub fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|err| panic!("tokio runtime should start: {err}"))
}
