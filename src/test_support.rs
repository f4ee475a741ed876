//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedCloud`] is an in-memory block-storage and compute backend whose
//! resources walk through scripted status sequences, [`MemoryLedger`] keeps
//! backup records in memory and [`ManualClock`] lets wait loops run without
//! real delays.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::cloud::{
    Backup, BackupRequest, BackupRestore, BlockStorage, Cloud, CloudError, CloudFuture, Compute,
    Server, ServerRequest, Snapshot, SnapshotRequest, Volume, VolumeAttachment, VolumeRequest,
};
use crate::ledger::{BackupLedger, BackupRecord, LedgerError};
use crate::poll::{Clock, SleepFuture};

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operations exposed by [`ScriptedCloud`], used for failure injection and
/// call counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CloudOp {
    /// `get_volume`.
    GetVolume,
    /// `create_volume`.
    CreateVolume,
    /// `delete_volume`.
    DeleteVolume,
    /// `create_snapshot`.
    CreateSnapshot,
    /// `get_snapshot`.
    GetSnapshot,
    /// `delete_snapshot`.
    DeleteSnapshot,
    /// `create_backup`.
    CreateBackup,
    /// `get_backup`.
    GetBackup,
    /// `delete_backup`.
    DeleteBackup,
    /// `restore_backup`.
    RestoreBackup,
    /// `get_server`.
    GetServer,
    /// `list_volume_attachments`.
    ListAttachments,
    /// `create_server`.
    CreateServer,
}

impl CloudOp {
    /// Operation name as used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetVolume => "get_volume",
            Self::CreateVolume => "create_volume",
            Self::DeleteVolume => "delete_volume",
            Self::CreateSnapshot => "create_snapshot",
            Self::GetSnapshot => "get_snapshot",
            Self::DeleteSnapshot => "delete_snapshot",
            Self::CreateBackup => "create_backup",
            Self::GetBackup => "get_backup",
            Self::DeleteBackup => "delete_backup",
            Self::RestoreBackup => "restore_backup",
            Self::GetServer => "get_server",
            Self::ListAttachments => "list_volume_attachments",
            Self::CreateServer => "create_server",
        }
    }
}

impl fmt::Display for CloudOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One call recorded by [`ScriptedCloud`], with the identifier it targeted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloudCall {
    /// Operation invoked.
    pub op: CloudOp,
    /// Resource id or requested name.
    pub target: String,
}

/// Resource kinds whose status sequence can be scripted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Snapshots created by `create_snapshot`.
    Snapshot,
    /// Volumes created by `create_volume`.
    Volume,
    /// Backups created by `create_backup`.
    Backup,
    /// Volumes created by `restore_backup`.
    RestoredVolume,
    /// Servers created by `create_server`.
    Server,
}

impl ResourceKind {
    const fn default_statuses(self) -> &'static [&'static str] {
        match self {
            Self::Snapshot | Self::Volume | Self::Backup => &["creating", "available"],
            Self::RestoredVolume => &["restoring-backup", "available"],
            Self::Server => &["BUILD", "ACTIVE"],
        }
    }
}

/// Errors returned by [`ScriptedCloud`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScriptedCloudError {
    /// Raised when the requested resource does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind.
        kind: &'static str,
        /// Requested id.
        id: String,
    },
    /// Raised when a failure was injected for the operation.
    #[error("{operation} rejected: {message}")]
    Rejected {
        /// Operation that failed.
        operation: CloudOp,
        /// Injected message.
        message: String,
    },
}

impl CloudError for ScriptedCloudError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    servers: BTreeMap<String, Server>,
    attachments: BTreeMap<String, Vec<VolumeAttachment>>,
    volumes: BTreeMap<String, Volume>,
    snapshots: BTreeMap<String, Snapshot>,
    backups: BTreeMap<String, Backup>,
    scripts: BTreeMap<ResourceKind, Vec<String>>,
    pending: BTreeMap<String, VecDeque<String>>,
    failures: BTreeMap<CloudOp, String>,
    vanishing: BTreeMap<CloudOp, usize>,
    calls: Vec<CloudCall>,
    server_requests: Vec<ServerRequest>,
    next_id: u32,
}

impl ScriptState {
    fn enter(&mut self, op: CloudOp, target: &str) -> Result<(), ScriptedCloudError> {
        self.calls.push(CloudCall {
            op,
            target: target.to_owned(),
        });
        let made = self.calls.iter().filter(|call| call.op == op).count();
        if self.vanishing.get(&op) == Some(&made) {
            self.remove(target);
        }
        match self.failures.get(&op) {
            Some(message) => Err(ScriptedCloudError::Rejected {
                operation: op,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Drops `id` as though another actor deleted it.
    fn remove(&mut self, id: &str) {
        self.volumes.remove(id);
        self.snapshots.remove(id);
        self.backups.remove(id);
        self.pending.remove(id);
    }

    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Returns the first status for a new resource and queues the rest.
    fn start(&mut self, kind: ResourceKind, id: &str) -> String {
        let mut statuses: VecDeque<String> = match self.scripts.get(&kind) {
            Some(script) => script.iter().cloned().collect(),
            None => kind
                .default_statuses()
                .iter()
                .map(|status| (*status).to_owned())
                .collect(),
        };
        let first = statuses
            .pop_front()
            .unwrap_or_else(|| String::from("available"));
        self.pending.insert(id.to_owned(), statuses);
        first
    }

    /// Pops the next scripted status for `id`, if any remain.
    fn advance(&mut self, id: &str) -> Option<String> {
        self.pending.get_mut(id).and_then(VecDeque::pop_front)
    }
}

fn not_found(kind: &'static str, id: &str) -> ScriptedCloudError {
    ScriptedCloudError::NotFound {
        kind,
        id: id.to_owned(),
    }
}

/// In-memory cloud whose resources progress through scripted statuses.
///
/// Each created resource starts in the first status of its kind's script and
/// moves one step further on every fetch, staying on the last status. Deleted
/// resources disappear immediately, so later fetches report not found.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCloud {
    state: Arc<StdMutex<ScriptState>>,
}

impl ScriptedCloud {
    /// Creates an empty cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StdMutexGuard<'_, ScriptState> {
        lock(&self.state)
    }

    /// Registers a server.
    pub fn add_server(&self, id: &str, name: &str, flavor_id: &str) {
        self.state().servers.insert(
            id.to_owned(),
            Server {
                id: id.to_owned(),
                name: name.to_owned(),
                flavor_id: flavor_id.to_owned(),
                status: String::from("ACTIVE"),
            },
        );
    }

    /// Creates an `in-use` volume and attaches it to `server_id` at `device`.
    pub fn attach_volume(
        &self,
        server_id: &str,
        device: &str,
        volume_id: &str,
        size_gb: u64,
        bootable: bool,
    ) {
        let attachment = VolumeAttachment {
            device: device.to_owned(),
            volume_id: volume_id.to_owned(),
            server_id: server_id.to_owned(),
        };
        let mut state = self.state();
        state.volumes.insert(
            volume_id.to_owned(),
            Volume {
                id: volume_id.to_owned(),
                name: None,
                status: String::from("in-use"),
                size_gb,
                bootable,
                snapshot_id: None,
                attachments: vec![attachment.clone()],
                metadata: BTreeMap::new(),
            },
        );
        state
            .attachments
            .entry(server_id.to_owned())
            .or_default()
            .push(attachment);
    }

    /// Registers an existing backup in `status`.
    pub fn add_backup(&self, id: &str, status: &str) {
        self.state().backups.insert(
            id.to_owned(),
            Backup {
                id: id.to_owned(),
                name: None,
                description: None,
                status: status.to_owned(),
                size_gb: Some(1),
                volume_id: None,
            },
        );
    }

    /// Replaces the status sequence new resources of `kind` walk through.
    pub fn script_statuses(&self, kind: ResourceKind, statuses: &[&str]) {
        self.state().scripts.insert(
            kind,
            statuses.iter().map(|status| (*status).to_owned()).collect(),
        );
    }

    /// Makes every later call to `op` fail with `message`.
    pub fn fail(&self, op: CloudOp, message: &str) {
        self.state().failures.insert(op, message.to_owned());
    }

    /// Deletes the targeted resource just before the `nth` call to `op`
    /// (counting from 1) is served, so that call sees it as not found.
    pub fn vanish_on(&self, op: CloudOp, nth: usize) {
        self.state().vanishing.insert(op, nth);
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CloudCall> {
        self.state().calls.clone()
    }

    /// Counts recorded calls to `op`.
    #[must_use]
    pub fn count(&self, op: CloudOp) -> usize {
        self.state().calls.iter().filter(|call| call.op == op).count()
    }

    /// Returns the targets of recorded calls to `op`, in call order.
    #[must_use]
    pub fn targets(&self, op: CloudOp) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.target.clone())
            .collect()
    }

    /// Returns the server requests received by `create_server`.
    #[must_use]
    pub fn server_requests(&self) -> Vec<ServerRequest> {
        self.state().server_requests.clone()
    }

    /// Returns whether a volume with `id` still exists.
    #[must_use]
    pub fn has_volume(&self, id: &str) -> bool {
        self.state().volumes.contains_key(id)
    }

    /// Returns whether a snapshot with `id` still exists.
    #[must_use]
    pub fn has_snapshot(&self, id: &str) -> bool {
        self.state().snapshots.contains_key(id)
    }

    /// Returns whether a backup with `id` still exists.
    #[must_use]
    pub fn has_backup(&self, id: &str) -> bool {
        self.state().backups.contains_key(id)
    }
}

impl Cloud for ScriptedCloud {
    type Error = ScriptedCloudError;
}

impl BlockStorage for ScriptedCloud {
    fn get_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, Volume, Self::Error> {
        let mut state = self.state();
        let result = state.enter(CloudOp::GetVolume, volume_id).and_then(|()| {
            let next = state.advance(volume_id);
            let volume = state
                .volumes
                .get_mut(volume_id)
                .ok_or_else(|| not_found("volume", volume_id))?;
            if let Some(status) = next {
                volume.status = status;
            }
            Ok(volume.clone())
        });
        Box::pin(future::ready(result))
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeRequest,
    ) -> CloudFuture<'a, Volume, Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::CreateVolume, &request.name)
            .map(|()| {
                let id = state.mint("vol");
                let status = state.start(ResourceKind::Volume, &id);
                let volume = Volume {
                    id: id.clone(),
                    name: Some(request.name.clone()),
                    status,
                    size_gb: request.size_gb,
                    bootable: false,
                    snapshot_id: request.snapshot_id.clone(),
                    attachments: Vec::new(),
                    metadata: BTreeMap::new(),
                };
                state.volumes.insert(id, volume.clone());
                volume
            });
        Box::pin(future::ready(result))
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> CloudFuture<'a, (), Self::Error> {
        let mut state = self.state();
        let result = state.enter(CloudOp::DeleteVolume, volume_id).and_then(|()| {
            state
                .volumes
                .remove(volume_id)
                .map(|_| ())
                .ok_or_else(|| not_found("volume", volume_id))
        });
        Box::pin(future::ready(result))
    }

    fn create_snapshot<'a>(
        &'a self,
        request: &'a SnapshotRequest,
    ) -> CloudFuture<'a, Snapshot, Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::CreateSnapshot, &request.volume_id)
            .and_then(|()| {
                let size_gb = state
                    .volumes
                    .get(&request.volume_id)
                    .map(|volume| volume.size_gb)
                    .ok_or_else(|| not_found("volume", &request.volume_id))?;
                let id = state.mint("snap");
                let status = state.start(ResourceKind::Snapshot, &id);
                let snapshot = Snapshot {
                    id: id.clone(),
                    status,
                    size_gb,
                    volume_id: request.volume_id.clone(),
                    created_at: None,
                };
                state.snapshots.insert(id, snapshot.clone());
                Ok(snapshot)
            });
        Box::pin(future::ready(result))
    }

    fn get_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
    ) -> CloudFuture<'a, Snapshot, Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::GetSnapshot, snapshot_id)
            .and_then(|()| {
                let next = state.advance(snapshot_id);
                let snapshot = state
                    .snapshots
                    .get_mut(snapshot_id)
                    .ok_or_else(|| not_found("snapshot", snapshot_id))?;
                if let Some(status) = next {
                    snapshot.status = status;
                }
                Ok(snapshot.clone())
            });
        Box::pin(future::ready(result))
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> CloudFuture<'a, (), Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::DeleteSnapshot, snapshot_id)
            .and_then(|()| {
                state
                    .snapshots
                    .remove(snapshot_id)
                    .map(|_| ())
                    .ok_or_else(|| not_found("snapshot", snapshot_id))
            });
        Box::pin(future::ready(result))
    }

    fn create_backup<'a>(
        &'a self,
        request: &'a BackupRequest,
    ) -> CloudFuture<'a, Backup, Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::CreateBackup, &request.volume_id)
            .and_then(|()| {
                let size_gb = state
                    .volumes
                    .get(&request.volume_id)
                    .map(|volume| volume.size_gb)
                    .ok_or_else(|| not_found("volume", &request.volume_id))?;
                let id = state.mint("backup");
                let status = state.start(ResourceKind::Backup, &id);
                let backup = Backup {
                    id: id.clone(),
                    name: Some(request.name.clone()),
                    description: request.description.clone(),
                    status,
                    size_gb: Some(size_gb),
                    volume_id: Some(request.volume_id.clone()),
                };
                state.backups.insert(id, backup.clone());
                Ok(backup)
            });
        Box::pin(future::ready(result))
    }

    fn get_backup<'a>(&'a self, backup_id: &'a str) -> CloudFuture<'a, Backup, Self::Error> {
        let mut state = self.state();
        let result = state.enter(CloudOp::GetBackup, backup_id).and_then(|()| {
            let next = state.advance(backup_id);
            let backup = state
                .backups
                .get_mut(backup_id)
                .ok_or_else(|| not_found("backup", backup_id))?;
            if let Some(status) = next {
                backup.status = status;
            }
            Ok(backup.clone())
        });
        Box::pin(future::ready(result))
    }

    fn delete_backup<'a>(&'a self, backup_id: &'a str) -> CloudFuture<'a, (), Self::Error> {
        let mut state = self.state();
        let result = state.enter(CloudOp::DeleteBackup, backup_id).and_then(|()| {
            state
                .backups
                .remove(backup_id)
                .map(|_| ())
                .ok_or_else(|| not_found("backup", backup_id))
        });
        Box::pin(future::ready(result))
    }

    fn restore_backup<'a>(
        &'a self,
        backup_id: &'a str,
        volume_name: &'a str,
    ) -> CloudFuture<'a, BackupRestore, Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::RestoreBackup, backup_id)
            .and_then(|()| {
                let size_gb = state
                    .backups
                    .get(backup_id)
                    .map(|backup| backup.size_gb.unwrap_or(1))
                    .ok_or_else(|| not_found("backup", backup_id))?;
                let id = state.mint("restored");
                let status = state.start(ResourceKind::RestoredVolume, &id);
                state.volumes.insert(
                    id.clone(),
                    Volume {
                        id: id.clone(),
                        name: Some(volume_name.to_owned()),
                        status,
                        size_gb,
                        bootable: false,
                        snapshot_id: None,
                        attachments: Vec::new(),
                        metadata: BTreeMap::new(),
                    },
                );
                Ok(BackupRestore {
                    backup_id: backup_id.to_owned(),
                    volume_id: id,
                })
            });
        Box::pin(future::ready(result))
    }
}

impl Compute for ScriptedCloud {
    fn get_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, Server, Self::Error> {
        let mut state = self.state();
        let result = state.enter(CloudOp::GetServer, server_id).and_then(|()| {
            let next = state.advance(server_id);
            let server = state
                .servers
                .get_mut(server_id)
                .ok_or_else(|| not_found("server", server_id))?;
            if let Some(status) = next {
                server.status = status;
            }
            Ok(server.clone())
        });
        Box::pin(future::ready(result))
    }

    fn list_volume_attachments<'a>(
        &'a self,
        server_id: &'a str,
    ) -> CloudFuture<'a, Vec<VolumeAttachment>, Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::ListAttachments, server_id)
            .and_then(|()| {
                if !state.servers.contains_key(server_id) {
                    return Err(not_found("server", server_id));
                }
                Ok(state
                    .attachments
                    .get(server_id)
                    .cloned()
                    .unwrap_or_default())
            });
        Box::pin(future::ready(result))
    }

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> CloudFuture<'a, Server, Self::Error> {
        let mut state = self.state();
        let result = state
            .enter(CloudOp::CreateServer, &request.name)
            .map(|()| {
                state.server_requests.push(request.clone());
                let id = state.mint("server");
                let status = state.start(ResourceKind::Server, &id);
                let server = Server {
                    id: id.clone(),
                    name: request.name.clone(),
                    flavor_id: request.flavor_id.clone(),
                    status,
                };
                state.servers.insert(id, server.clone());
                server
            });
        Box::pin(future::ready(result))
    }
}

/// Backup ledger held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    records: Arc<StdMutex<BTreeMap<String, BackupRecord>>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record, ordered by backup id.
    #[must_use]
    pub fn records(&self) -> Vec<BackupRecord> {
        lock(&self.records).values().cloned().collect()
    }
}

impl BackupLedger for MemoryLedger {
    fn record(&self, record: &BackupRecord) -> Result<(), LedgerError> {
        lock(&self.records).insert(record.backup_id.clone(), record.clone());
        Ok(())
    }

    fn lookup(&self, backup_id: &str) -> Result<Option<BackupRecord>, LedgerError> {
        Ok(lock(&self.records).get(backup_id).cloned())
    }

    fn forget(&self, backup_id: &str) -> Result<bool, LedgerError> {
        Ok(lock(&self.records).remove(backup_id).is_some())
    }
}

#[derive(Debug)]
struct ClockState {
    now: Instant,
    sleeps: Vec<Duration>,
}

/// Clock whose sleeps return immediately and advance its notion of now.
#[derive(Clone, Debug)]
pub struct ManualClock {
    state: Arc<StdMutex<ClockState>>,
    origin: Instant,
}

impl ManualClock {
    /// Creates a clock starting at the current instant.
    #[must_use]
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            state: Arc::new(StdMutex::new(ClockState {
                now: origin,
                sleeps: Vec::new(),
            })),
            origin,
        }
    }

    /// Returns every sleep requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.state).sleeps.clone()
    }

    /// Returns the simulated time elapsed since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        lock(&self.state).now.duration_since(self.origin)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        lock(&self.state).now
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        let mut state = lock(&self.state);
        state.now += duration;
        state.sleeps.push(duration);
        Box::pin(future::ready(()))
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// A `None` value removes the variable for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
