//! Tests for the file-backed backup ledger.

use super::*;
use chrono::TimeZone;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct LedgerFixture {
    _tmp: TempDir,
    path: Utf8PathBuf,
    ledger: FileLedger,
}

#[fixture]
fn ledger_fixture() -> LedgerFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("state").join("ledger.json"))
        .unwrap_or_else(|err| panic!("temp path should be utf8: {}", err.display()));
    let ledger = FileLedger::new(path.clone());
    LedgerFixture {
        _tmp: tmp,
        path,
        ledger,
    }
}

fn record(backup_id: &str, device: &str) -> BackupRecord {
    BackupRecord {
        backup_id: backup_id.to_owned(),
        server_id: "srv-1".to_owned(),
        source_volume_id: format!("vol-{backup_id}"),
        device: device.to_owned(),
        bootable: false,
        size_gb: 10,
        created_at: Utc
            .with_ymd_and_hms(2026, 10, 16, 12, 0, 0)
            .single()
            .unwrap_or_else(|| panic!("fixed timestamp should be valid")),
    }
}

#[rstest]
fn lookup_on_missing_file_is_empty(ledger_fixture: LedgerFixture) {
    let found = ledger_fixture
        .ledger
        .lookup("bkp-1")
        .unwrap_or_else(|err| panic!("lookup: {err}"));
    assert_eq!(found, None);
}

#[rstest]
fn record_then_lookup_returns_the_record(ledger_fixture: LedgerFixture) {
    let entry = record("bkp-1", "/dev/vdb");
    ledger_fixture
        .ledger
        .record(&entry)
        .unwrap_or_else(|err| panic!("record: {err}"));

    let found = ledger_fixture
        .ledger
        .lookup("bkp-1")
        .unwrap_or_else(|err| panic!("lookup: {err}"));
    assert_eq!(found, Some(entry));
    assert!(ledger_fixture.path.exists());
}

#[rstest]
fn recording_the_same_backup_replaces_it(ledger_fixture: LedgerFixture) {
    let ledger = &ledger_fixture.ledger;
    ledger
        .record(&record("bkp-1", "/dev/vdb"))
        .unwrap_or_else(|err| panic!("record: {err}"));
    ledger
        .record(&record("bkp-1", "/dev/vdc"))
        .unwrap_or_else(|err| panic!("re-record: {err}"));

    let document = ledger.load().unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(document.records.len(), 1);
    assert_eq!(
        document.records.first().map(|entry| entry.device.as_str()),
        Some("/dev/vdc")
    );
}

#[rstest]
fn forget_reports_whether_a_record_existed(ledger_fixture: LedgerFixture) {
    let ledger = &ledger_fixture.ledger;
    ledger
        .record(&record("bkp-1", "/dev/vdb"))
        .unwrap_or_else(|err| panic!("record: {err}"));
    ledger
        .record(&record("bkp-2", "/dev/vdc"))
        .unwrap_or_else(|err| panic!("record: {err}"));

    assert!(ledger.forget("bkp-1").unwrap_or_else(|err| panic!("forget: {err}")));
    assert!(!ledger.forget("bkp-1").unwrap_or_else(|err| panic!("forget: {err}")));
    assert!(
        ledger
            .lookup("bkp-2")
            .unwrap_or_else(|err| panic!("lookup: {err}"))
            .is_some()
    );
}

#[rstest]
fn corrupt_ledger_is_a_parse_error(ledger_fixture: LedgerFixture) {
    let parent = ledger_fixture.ledger.parent().to_path_buf();
    std::fs::create_dir_all(&parent).unwrap_or_else(|err| panic!("mkdir: {err}"));
    std::fs::write(&ledger_fixture.path, "{not json").unwrap_or_else(|err| panic!("seed: {err}"));

    let Err(err) = ledger_fixture.ledger.lookup("bkp-1") else {
        panic!("corrupt ledger should fail");
    };
    let LedgerError::Parse { path, .. } = err else {
        panic!("expected parse error, got {err:?}");
    };
    assert_eq!(path, ledger_fixture.path);
}

#[rstest]
fn future_ledger_version_is_rejected(ledger_fixture: LedgerFixture) {
    let parent = ledger_fixture.ledger.parent().to_path_buf();
    std::fs::create_dir_all(&parent).unwrap_or_else(|err| panic!("mkdir: {err}"));
    std::fs::write(&ledger_fixture.path, r#"{"version": 2, "records": []}"#)
        .unwrap_or_else(|err| panic!("seed: {err}"));

    assert!(matches!(
        ledger_fixture.ledger.lookup("bkp-1"),
        Err(LedgerError::UnsupportedVersion { found: 2, .. })
    ));
}

#[test]
fn bare_file_name_resolves_to_current_directory() {
    let ledger = FileLedger::new("vmvault-ledger.json");
    assert_eq!(ledger.parent(), Utf8Path::new("."));
}
