//! Core library for the `vmvault` backup tool.
//!
//! The crate backs up every volume attached to an OpenStack server through a
//! snapshot and a temporary volume, restores a set of backups into a new
//! server that keeps the original device layout, and deletes backups once
//! they are no longer needed.
//!
//! The pipelines in [`pipeline`] are generic over the [`cloud`] traits;
//! [`openstack`] implements those traits against Keystone, Cinder and Nova.
//! Every wait goes through the bounded, cancellable [`poll::Poller`], and the
//! device slot of each backup is kept in the [`ledger`].

pub mod cloud;
pub mod config;
pub mod ledger;
pub mod openstack;
pub mod pipeline;
pub mod poll;
pub mod test_support;

pub use cloud::{BlockStorage, Cloud, CloudError, Compute};
pub use config::{ConfigError, OpenStackConfig, PipelineConfig};
pub use ledger::{BackupLedger, BackupRecord, FileLedger, LedgerError};
pub use openstack::{OpenStackBackend, OpenStackError};
pub use pipeline::{
    BackupOrchestrator, BackupReport, DeleteOrchestrator, DeleteSummary, PipelineError,
    RestoreOrchestrator, RestoreReport,
};
pub use poll::{CancelToken, PollError, PollPolicy, Poller};
