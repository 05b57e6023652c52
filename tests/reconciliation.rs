//! Reconciliation Tests
//!
//! The reconciler diffs replica state against the admin authority and
//! repairs divergence using intact copies held by bitarchive replicas.

mod harness;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bitvault::checksum::md5_hex;
use bitvault::preservation::{
    ActiveBitPreservation, ChecksumStrategy, InMemoryAdminAuthority, PreservationError,
};
use bitvault::protocol::Credentials;
use bitvault::transfer::{FileRef, FileTransfer, LocalTransfer, TransferError, TransferResult};

use harness::{deploy, Deployment, CREDENTIALS};

const FILES: [(&str, &[u8]); 3] = [("A.arc", b"alpha"), ("B.arc", b"bravo"), ("C.arc", b"charlie")];

fn names(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Authority expecting A, B and C on every replica; ONE and TWO hold all
/// three, CS only A and C.
async fn scenario() -> (Deployment, Arc<InMemoryAdminAuthority>, ActiveBitPreservation) {
    let d = deploy().await;
    let authority = Arc::new(InMemoryAdminAuthority::new());
    for (name, content) in FILES {
        authority.record(name, &md5_hex(content), ["ONE", "TWO", "CS"]);
        d.archive("ONE", name, content).await;
        d.archive("TWO", name, content).await;
        if name != "B.arc" {
            d.archive("CS", name, content).await;
        }
    }

    let reconciler = ActiveBitPreservation::new(
        Arc::clone(&d.clients),
        authority.clone(),
        d.transfer.clone(),
    );
    (d, authority, reconciler)
}

// =============================================================================
// Missing files
// =============================================================================

/// {A,B,C} expected, {A,C} reported: B is missing; after reestablishing
/// it nothing is.
#[tokio::test]
async fn test_missing_file_found_and_reestablished() {
    let (d, _authority, reconciler) = scenario().await;

    let report = reconciler.find_missing_files("CS").await.unwrap();
    assert_eq!(report.missing, names(&["B.arc"]));
    // seeded test1/test2 entries are unknown to the authority
    assert_eq!(report.extra, names(&["test1.arc", "test2.arc"]));

    reconciler.reestablish_missing_file("CS", "B.arc").await.unwrap();

    let report = reconciler.find_missing_files("CS").await.unwrap();
    assert!(report.missing.is_empty());
    assert_eq!(d.checksum.checksum("B.arc"), Some(md5_hex(b"bravo")));

    let snapshot = d.client_side.metrics().snapshot();
    assert_eq!(snapshot.repairs, 1);
    assert_eq!(snapshot.failed_repairs, 0);
}

/// Repeated diffs without repairs return the same divergence.
#[tokio::test]
async fn test_diffs_are_idempotent() {
    let (_d, _authority, reconciler) = scenario().await;

    let first = reconciler.find_missing_files("CS").await.unwrap();
    let second = reconciler.find_missing_files("CS").await.unwrap();
    assert_eq!(first, second);

    let first = reconciler.find_changed_files("ONE").await.unwrap();
    let second = reconciler.find_changed_files("ONE").await.unwrap();
    assert_eq!(first, second);
    assert!(first.changed.is_empty());
}

/// Without an intact copy elsewhere the repair fails and the file stays
/// missing.
#[tokio::test]
async fn test_reestablish_without_source_fails() {
    let (d, authority, reconciler) = scenario().await;
    authority.record("D.arc", &md5_hex(b"delta"), ["CS"]);

    let err = reconciler.reestablish_missing_file("CS", "D.arc").await.unwrap_err();
    assert!(matches!(err, PreservationError::NoSource { .. }));
    assert!(reconciler.find_missing_files("CS").await.unwrap().missing.contains("D.arc"));
    assert_eq!(d.client_side.metrics().snapshot().failed_repairs, 1);
}

/// A corrupt copy on one bitarchive is skipped in favour of an intact one.
#[tokio::test]
async fn test_corrupt_source_is_skipped() {
    let (d, _authority, reconciler) = scenario().await;
    d.one.store().write("B.arc", b"bit rot").unwrap();

    reconciler.reestablish_missing_file("CS", "B.arc").await.unwrap();
    assert_eq!(d.checksum.checksum("B.arc"), Some(md5_hex(b"bravo")));
}

/// Transfer whose dispose always fails
#[derive(Debug)]
struct StickyTransfer {
    inner: Arc<LocalTransfer>,
    dispose_attempts: AtomicUsize,
}

impl FileTransfer for StickyTransfer {
    fn put(&self, name: &str, data: &[u8]) -> TransferResult<FileRef> {
        self.inner.put(name, data)
    }

    fn fetch(&self, file: &FileRef) -> TransferResult<Vec<u8>> {
        self.inner.fetch(file)
    }

    fn dispose(&self, file: &FileRef) -> TransferResult<()> {
        self.dispose_attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransferError::IoError(format!("{} is busy", file.name)))
    }

    fn exists(&self, file: &FileRef) -> bool {
        self.inner.exists(file)
    }
}

/// A copy that cannot be disposed does not fail the repair.
#[tokio::test]
async fn test_dispose_failure_does_not_fail_repair() {
    let (d, authority, _reconciler) = scenario().await;
    let transfer = Arc::new(StickyTransfer {
        inner: d.transfer.clone(),
        dispose_attempts: AtomicUsize::new(0),
    });
    let reconciler =
        ActiveBitPreservation::new(Arc::clone(&d.clients), authority, transfer.clone());

    reconciler.reestablish_missing_file("CS", "B.arc").await.unwrap();
    assert_eq!(d.checksum.checksum("B.arc"), Some(md5_hex(b"bravo")));
    assert_eq!(transfer.dispose_attempts.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Changed files
// =============================================================================

async fn corrupt_catalog_entry(d: &Deployment) {
    let reply = d
        .client("CS")
        .correct(
            "A.arc",
            &md5_hex(b"alpha"),
            d.stage("A.arc", b"not alpha"),
            Credentials::new(CREDENTIALS),
        )
        .await
        .unwrap();
    assert!(reply.status.ok);
}

/// A wrong catalog entry is found by both strategies; files unknown to
/// the authority are ignored.
#[tokio::test]
async fn test_changed_file_found() {
    let (d, authority, reconciler) = scenario().await;
    corrupt_catalog_entry(&d).await;

    let bulk = reconciler.find_changed_files("CS").await.unwrap();
    assert_eq!(bulk.filenames(), names(&["A.arc"]));
    assert_eq!(bulk.changed["A.arc"], md5_hex(b"not alpha"));

    let per_file = ActiveBitPreservation::new(Arc::clone(&d.clients), authority, d.transfer.clone())
        .with_strategy(ChecksumStrategy::PerFile);
    assert_eq!(per_file.find_changed_files("CS").await.unwrap(), bulk);
}

/// Correcting without valid credentials is rejected and the divergence
/// stays; with them the entry converges.
#[tokio::test]
async fn test_correct_checksum() {
    let (d, _authority, reconciler) = scenario().await;
    corrupt_catalog_entry(&d).await;

    let err = reconciler
        .correct_checksum("CS", "A.arc", &md5_hex(b"alpha"), Credentials::new("guess"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("credentials"));
    assert_eq!(reconciler.find_changed_files("CS").await.unwrap().changed.len(), 1);

    reconciler
        .correct_checksum("CS", "A.arc", &md5_hex(b"alpha"), Credentials::new(CREDENTIALS))
        .await
        .unwrap();
    assert!(reconciler.find_changed_files("CS").await.unwrap().changed.is_empty());
}

/// A full pass repairs missing files, then changed ones.
#[tokio::test]
async fn test_repair_pass() {
    let (d, _authority, reconciler) = scenario().await;
    corrupt_catalog_entry(&d).await;

    let report = reconciler
        .repair("CS", &Credentials::new(CREDENTIALS))
        .await
        .unwrap();
    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(report.repaired, vec!["B.arc", "A.arc"]);

    // counts are those detected by the pass, before its repairs
    let summary = reconciler.replica_summary("CS").unwrap();
    assert_eq!(summary.file_count, 4);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.changed, 1);
    assert!(summary.last_missing_check.is_some());
    assert!(summary.last_changed_check.is_some());
}

/// Batch repairs report every failing file.
#[tokio::test]
async fn test_upload_missing_files_reports_failures() {
    let (_d, _authority, reconciler) = scenario().await;

    let report = reconciler
        .upload_missing_files("CS", ["B.arc", "unknown.arc"])
        .await
        .unwrap();
    assert_eq!(report.repaired, vec!["B.arc"]);
    assert_eq!(report.failed_filenames(), vec!["unknown.arc"]);
}

// =============================================================================
// Preservation state
// =============================================================================

#[tokio::test]
async fn test_preservation_state() {
    let (d, _authority, reconciler) = scenario().await;
    d.two.store().write("C.arc", b"bit rot").unwrap();

    let state = reconciler.preservation_state("B.arc").await.unwrap();
    assert_eq!(state.missing_on, names(&["CS"]));
    assert!(!state.is_consistent());

    let state = reconciler.preservation_state("C.arc").await.unwrap();
    assert!(state.missing_on.is_empty());
    assert_eq!(state.changed_on(), names(&["TWO"]));
    assert_eq!(state.observed["ONE"], Some(md5_hex(b"charlie")));
}
