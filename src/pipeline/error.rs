//! Error types for the backup, restore and delete pipelines.

use thiserror::Error;

use crate::cloud::CloudError;
use crate::ledger::LedgerError;
use crate::poll::PollError;

/// Errors raised while running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError<CloudErr>
where
    CloudErr: std::error::Error + 'static,
{
    /// Raised when a provider call fails outright.
    #[error("failed to {operation}: {source}")]
    Cloud {
        /// Step that issued the call.
        operation: String,
        /// Provider-specific error.
        #[source]
        source: CloudErr,
    },
    /// Raised when a wait ends in a failure status, a bound or cancellation.
    #[error(transparent)]
    Poll(#[from] PollError<CloudErr>),
    /// Raised when the backup ledger cannot be read or written.
    #[error("backup ledger error: {0}")]
    Ledger(#[from] LedgerError),
    /// Raised when the server to back up has no attached volumes.
    #[error("server {server_id} has no attached volumes")]
    NoAttachedVolumes {
        /// Server that was inspected.
        server_id: String,
    },
    /// Raised when a backup to restore was never recorded in the ledger.
    #[error("backup {backup_id} has no ledger record; cannot tell which device it belongs to")]
    MissingRecord {
        /// Backup without a record.
        backup_id: String,
    },
    /// Raised when two backups would restore into the same device slot.
    #[error("backups {first} and {second} both map to device {device}")]
    DuplicateDevice {
        /// Contested device path.
        device: String,
        /// First backup claiming the device.
        first: String,
        /// Second backup claiming the device.
        second: String,
    },
    /// Raised when a restore or delete names no backups.
    #[error("no backup ids were given")]
    EmptyRequest,
}

impl<CloudErr> PipelineError<CloudErr>
where
    CloudErr: std::error::Error + 'static,
{
    /// Returns a mapper that wraps a provider error with the failing step.
    pub(crate) fn cloud(operation: &'static str) -> impl FnOnce(CloudErr) -> Self {
        move |source| Self::Cloud {
            operation: operation.to_owned(),
            source,
        }
    }
}

/// Returns `true` when a wait failed because the resource disappeared.
pub(crate) fn is_absent<E: CloudError>(err: &PollError<E>) -> bool {
    err.fetch_source().is_some_and(CloudError::is_not_found)
}
