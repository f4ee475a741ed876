//! BDD step definitions for the backup, restore and delete pipelines.

use std::fmt::Debug;

use rstest_bdd_macros::{given, then, when};
use vmvault::pipeline::{BackupOrchestrator, DeleteOrchestrator, RestoreOrchestrator};
use vmvault::test_support::{CloudOp, ResourceKind};

use super::test_helpers::{Outcome, PipelineContext, run_label, runtime};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

fn success<T: Debug>(outcome: Option<&Outcome<T>>) -> Result<&T, StepError> {
    match outcome {
        Some(Outcome::Success(value)) => Ok(value),
        Some(Outcome::Failure(message)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

fn failure_mentions<T: Debug>(outcome: Option<&Outcome<T>>, text: &str) -> Result<(), StepError> {
    let Some(Outcome::Failure(message)) = outcome else {
        return Err(StepError::Assertion(format!(
            "expected failure, got {outcome:?}"
        )));
    };
    ensure(message.contains(text), || {
        format!("expected failure mentioning '{text}', got: {message}")
    })
}

#[given("a server \"{server_id}\" named \"{name}\" with flavor \"{flavor}\"")]
fn server_exists(
    mut pipeline_context: PipelineContext,
    server_id: String,
    name: String,
    flavor: String,
) -> PipelineContext {
    pipeline_context
        .cloud
        .add_server(server_id.trim(), name.trim(), flavor.trim());
    pipeline_context.server_id = Some(server_id.trim().to_owned());
    pipeline_context
}

fn attach(pipeline_context: &PipelineContext, volume_id: &str, size: u32, device: &str, boot: bool) {
    let Some(server_id) = pipeline_context.server_id.as_deref() else {
        panic!("test setup requires a server before attaching volumes");
    };
    pipeline_context
        .cloud
        .attach_volume(server_id, device, volume_id, u64::from(size), boot);
}

#[given("volume \"{volume_id}\" of {size:u32} GiB is attached at \"{device}\" as the boot disk")]
fn boot_volume_attached(
    pipeline_context: PipelineContext,
    volume_id: String,
    size: u32,
    device: String,
) -> PipelineContext {
    attach(&pipeline_context, volume_id.trim(), size, device.trim(), true);
    pipeline_context
}

#[given("volume \"{volume_id}\" of {size:u32} GiB is attached at \"{device}\"")]
fn data_volume_attached(
    pipeline_context: PipelineContext,
    volume_id: String,
    size: u32,
    device: String,
) -> PipelineContext {
    attach(&pipeline_context, volume_id.trim(), size, device.trim(), false);
    pipeline_context
}

#[given("new snapshots end in status \"{status}\"")]
fn snapshots_end_in(pipeline_context: PipelineContext, status: String) -> PipelineContext {
    pipeline_context
        .cloud
        .script_statuses(ResourceKind::Snapshot, &["creating", status.trim()]);
    pipeline_context
}

#[given("backup \"{backup_id}\" exists with status \"{status}\"")]
fn backup_exists(
    pipeline_context: PipelineContext,
    backup_id: String,
    status: String,
) -> PipelineContext {
    pipeline_context
        .cloud
        .add_backup(backup_id.trim(), status.trim());
    pipeline_context
}

#[when("I back up server \"{server_id}\"")]
fn back_up_server(mut pipeline_context: PipelineContext, server_id: String) -> PipelineContext {
    let orchestrator = BackupOrchestrator::new(
        pipeline_context.cloud.clone(),
        pipeline_context.ledger.clone(),
        pipeline_context.poller(),
    )
    .with_run_label(run_label());
    let result = runtime().block_on(orchestrator.execute(server_id.trim()));
    pipeline_context.backup = Some(Outcome::from_result(result));
    pipeline_context
}

fn restore(pipeline_context: &mut PipelineContext, server_id: &str, backup_ids: &[String]) {
    let orchestrator = RestoreOrchestrator::new(
        pipeline_context.cloud.clone(),
        pipeline_context.ledger.clone(),
        pipeline_context.poller(),
    )
    .with_run_label(run_label());
    let result = runtime().block_on(orchestrator.execute(server_id, backup_ids));
    pipeline_context.restore = Some(Outcome::from_result(result));
}

#[when("I restore the backups into server \"{server_id}\"")]
fn restore_backups(mut pipeline_context: PipelineContext, server_id: String) -> PipelineContext {
    let backup_ids = pipeline_context.backup_ids();
    restore(&mut pipeline_context, server_id.trim(), &backup_ids);
    pipeline_context
}

#[when("I restore backup \"{backup_id}\" into server \"{server_id}\"")]
fn restore_backup(
    mut pipeline_context: PipelineContext,
    backup_id: String,
    server_id: String,
) -> PipelineContext {
    restore(
        &mut pipeline_context,
        server_id.trim(),
        &[backup_id.trim().to_owned()],
    );
    pipeline_context
}

fn delete(pipeline_context: &mut PipelineContext, backup_ids: &[String]) {
    let orchestrator = DeleteOrchestrator::new(
        pipeline_context.cloud.clone(),
        pipeline_context.ledger.clone(),
        pipeline_context.poller(),
    );
    let result = runtime().block_on(orchestrator.execute(backup_ids));
    pipeline_context.delete = Some(Outcome::from_result(result));
}

#[when("I delete backup \"{backup_id}\"")]
fn delete_backup(mut pipeline_context: PipelineContext, backup_id: String) -> PipelineContext {
    delete(&mut pipeline_context, &[backup_id.trim().to_owned()]);
    pipeline_context
}

#[when("I delete the backups")]
fn delete_backups(mut pipeline_context: PipelineContext) -> PipelineContext {
    let backup_ids = pipeline_context.backup_ids();
    delete(&mut pipeline_context, &backup_ids);
    pipeline_context
}

#[then("the backup succeeds with {count:u32} backups")]
fn backup_succeeds(pipeline_context: &PipelineContext, count: u32) -> Result<(), StepError> {
    let report = success(pipeline_context.backup.as_ref())?;
    ensure(report.records.len() == count as usize, || {
        format!("expected {count} backups, got {:?}", report.records)
    })
}

#[then("every backup step ran {count:u32} times")]
fn every_step_ran(pipeline_context: &PipelineContext, count: u32) -> Result<(), StepError> {
    for op in [
        CloudOp::CreateSnapshot,
        CloudOp::CreateVolume,
        CloudOp::CreateBackup,
        CloudOp::DeleteVolume,
        CloudOp::DeleteSnapshot,
    ] {
        let calls = pipeline_context.cloud.count(op);
        ensure(calls == count as usize, || {
            format!("expected {count} {op} calls, got {calls}")
        })?;
    }
    Ok(())
}

#[then("the ledger maps the backups to \"{first}\" and \"{second}\"")]
fn ledger_maps_devices(
    pipeline_context: &PipelineContext,
    first: String,
    second: String,
) -> Result<(), StepError> {
    let report = success(pipeline_context.backup.as_ref())?;
    let recorded = pipeline_context.ledger.records();
    let mut devices: Vec<&str> = recorded.iter().map(|record| record.device.as_str()).collect();
    devices.sort_unstable();
    ensure(devices == [first.trim(), second.trim()], || {
        format!("unexpected ledger devices: {devices:?}")
    })?;
    for record in &report.records {
        ensure(recorded.contains(record), || {
            format!("ledger is missing {}", record.backup_id)
        })?;
    }
    Ok(())
}

#[then("no temporary resources remain")]
fn no_temporary_resources(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let cloud = &pipeline_context.cloud;
    let volumes = cloud.targets(CloudOp::DeleteVolume);
    let snapshots = cloud.targets(CloudOp::DeleteSnapshot);
    ensure(volumes.len() == cloud.count(CloudOp::CreateVolume), || {
        format!("not every temporary volume was deleted: {volumes:?}")
    })?;
    ensure(snapshots.len() == cloud.count(CloudOp::CreateSnapshot), || {
        format!("not every snapshot was deleted: {snapshots:?}")
    })?;
    ensure(
        volumes.iter().all(|id| !cloud.has_volume(id))
            && snapshots.iter().all(|id| !cloud.has_snapshot(id)),
        || String::from("deleted resources are still present"),
    )
}

#[then("the backup fails mentioning \"{text}\"")]
fn backup_fails(pipeline_context: &PipelineContext, text: String) -> Result<(), StepError> {
    failure_mentions(pipeline_context.backup.as_ref(), text.trim())
}

#[then("no temporary volume was created")]
fn no_temporary_volume(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let calls = pipeline_context.cloud.count(CloudOp::CreateVolume);
    ensure(calls == 0, || format!("expected no volume creates, got {calls}"))
}

#[then("the ledger is empty")]
fn ledger_is_empty(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let records = pipeline_context.ledger.records();
    ensure(records.is_empty(), || {
        format!("expected an empty ledger, got {records:?}")
    })
}

#[then("the restore succeeds")]
fn restore_succeeds(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    success(pipeline_context.restore.as_ref()).map(|_| ())
}

#[then("the restored device map covers only \"{device}\"")]
fn device_map_covers(pipeline_context: &PipelineContext, device: String) -> Result<(), StepError> {
    let report = success(pipeline_context.restore.as_ref())?;
    let pairs: Vec<(&str, &str)> = report.devices.iter().collect();
    ensure(
        report.devices.len() == 1 && report.devices.volume_for(device.trim()).is_some(),
        || format!("unexpected device map: {pairs:?}"),
    )
}

#[then("the new server is named \"{name}\" with flavor \"{flavor}\"")]
fn new_server_identity(
    pipeline_context: &PipelineContext,
    name: String,
    flavor: String,
) -> Result<(), StepError> {
    let report = success(pipeline_context.restore.as_ref())?;
    ensure(
        report.server.name == name.trim() && report.server.flavor_id == flavor.trim(),
        || format!("unexpected server: {:?}", report.server),
    )?;
    ensure(report.server.status == "ACTIVE", || {
        format!("server should be active, got {}", report.server.status)
    })
}

#[then("the new server boots from the volume restored into \"{device}\"")]
fn boots_from_restored_volume(
    pipeline_context: &PipelineContext,
    device: String,
) -> Result<(), StepError> {
    let report = success(pipeline_context.restore.as_ref())?;
    let requests = pipeline_context.cloud.server_requests();
    let Some(request) = requests.last() else {
        return Err(StepError::Assertion(String::from("no server request recorded")));
    };
    let Some(boot) = request.block_devices.first() else {
        return Err(StepError::Assertion(String::from("server request has no block devices")));
    };
    ensure(
        boot.boot_index == Some(0)
            && boot.device_name == device.trim()
            && Some(boot.volume_id.as_str()) == report.devices.volume_for(device.trim()),
        || format!("unexpected boot device: {boot:?}"),
    )
}

#[then("the restore fails mentioning \"{text}\"")]
fn restore_fails(pipeline_context: &PipelineContext, text: String) -> Result<(), StepError> {
    failure_mentions(pipeline_context.restore.as_ref(), text.trim())
}

#[then("no server was created")]
fn no_server_created(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let calls = pipeline_context.cloud.count(CloudOp::CreateServer);
    ensure(calls == 0, || format!("expected no server creates, got {calls}"))
}

#[then("no backup was restored")]
fn no_backup_restored(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let calls = pipeline_context.cloud.count(CloudOp::RestoreBackup);
    ensure(calls == 0, || format!("expected no restores, got {calls}"))
}

#[then("the delete succeeds")]
fn delete_succeeds(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    success(pipeline_context.delete.as_ref()).map(|_| ())
}

#[then("backup \"{backup_id}\" is reported as skipped with status \"{status}\"")]
fn backup_skipped(
    pipeline_context: &PipelineContext,
    backup_id: String,
    status: String,
) -> Result<(), StepError> {
    let summary = success(pipeline_context.delete.as_ref())?;
    ensure(
        summary
            .skipped
            .iter()
            .any(|skip| skip.backup_id == backup_id.trim() && skip.status == status.trim()),
        || format!("unexpected summary: {summary:?}"),
    )
}

#[then("no backup delete call was issued")]
fn no_backup_delete(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let calls = pipeline_context.cloud.count(CloudOp::DeleteBackup);
    ensure(calls == 0, || format!("expected no backup deletes, got {calls}"))
}

#[then("every backup was deleted")]
fn every_backup_deleted(pipeline_context: &PipelineContext) -> Result<(), StepError> {
    let summary = success(pipeline_context.delete.as_ref())?;
    let backup_ids = pipeline_context.backup_ids();
    ensure(summary.deleted == backup_ids, || {
        format!("expected {backup_ids:?} deleted, got {summary:?}")
    })?;
    ensure(
        backup_ids.iter().all(|id| !pipeline_context.cloud.has_backup(id)),
        || String::from("deleted backups are still present"),
    )
}

#[then("backup \"{backup_id}\" is reported as missing")]
fn backup_missing(pipeline_context: &PipelineContext, backup_id: String) -> Result<(), StepError> {
    let summary = success(pipeline_context.delete.as_ref())?;
    ensure(summary.missing == [backup_id.trim().to_owned()], || {
        format!("unexpected summary: {summary:?}")
    })
}
