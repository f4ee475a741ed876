//! BDD scenarios for the backup, restore and delete pipelines.

use rstest_bdd_macros::scenario;

use super::test_helpers::{PipelineContext, pipeline_context};

#[scenario(
    path = "tests/features/backup.feature",
    name = "Back up every attached volume"
)]
fn scenario_backup_every_volume(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Abort when a snapshot fails"
)]
fn scenario_backup_snapshot_failure(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Refuse a server without attached volumes"
)]
fn scenario_backup_without_volumes(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/restore.feature",
    name = "Restore a single-volume backup"
)]
fn scenario_restore_single_volume(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/restore.feature",
    name = "Reject a backup without a ledger record"
)]
fn scenario_restore_unknown_backup(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/delete.feature",
    name = "Skip a backup that is not available"
)]
fn scenario_delete_skips_busy_backup(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/delete.feature",
    name = "Delete completed backups and drop their ledger records"
)]
fn scenario_delete_completed_backups(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}

#[scenario(
    path = "tests/features/delete.feature",
    name = "Treat an unknown backup as already gone"
)]
fn scenario_delete_unknown_backup(pipeline_context: PipelineContext) {
    drop(pipeline_context);
}
