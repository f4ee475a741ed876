//! Command-line interface definitions for the `vmvault` binary.
//!
//! The parser lives in its own module so the build script can render the
//! manual page from the same definitions.

use clap::Parser;

/// Top-level CLI for the `vmvault` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vmvault",
    version,
    about = "Back up, restore and delete the volumes of OpenStack servers",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Back up every volume attached to a server.
    #[command(name = "backup", about = "Back up every volume attached to a server")]
    Backup(BackupCommand),
    /// Restore backups into a new server.
    #[command(
        name = "restore",
        about = "Restore backups into a new server named Restored_<name>"
    )]
    Restore(RestoreCommand),
    /// Delete backups.
    #[command(name = "delete", about = "Delete backups that are available")]
    Delete(DeleteCommand),
}

/// Arguments for `vmvault backup`.
#[derive(Debug, Parser)]
pub(crate) struct BackupCommand {
    /// Server whose attached volumes are backed up.
    #[arg(value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
}

/// Arguments for `vmvault restore`.
#[derive(Debug, Parser)]
pub(crate) struct RestoreCommand {
    /// Server whose name and flavor the replacement copies.
    #[arg(value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
    /// Backups to restore, one per device slot.
    #[arg(value_name = "BACKUP_ID", required = true, num_args = 1..)]
    pub(crate) backup_ids: Vec<String>,
}

/// Arguments for `vmvault delete`.
#[derive(Debug, Parser)]
pub(crate) struct DeleteCommand {
    /// Backups to delete.
    #[arg(value_name = "BACKUP_ID", required = true, num_args = 1..)]
    pub(crate) backup_ids: Vec<String>,
}
