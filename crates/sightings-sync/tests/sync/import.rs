//! Merge-import: last writer wins by id, bulk upload online, queued offline.

use sightings_sync::queue::OperationKind;
use sightings_sync::storage::MemoryStore;
use sightings_sync::sync::ImportReport;
use sightings_sync::types::is_placeholder_id;
use sightings_sync::{RemoteError, RemoteErrorKind, SyncError};

use super::support::*;

fn fail_bulk(kind: RemoteErrorKind) -> impl Fn(&Call) -> Option<RemoteError> + Send + Sync {
    move |call: &Call| match call {
        Call::BulkUpsert(_) => Some(RemoteError::with_kind("bulk upsert rejected", kind)),
        _ => None,
    }
}

#[tokio::test]
async fn matching_id_is_replaced_and_uploaded() {
    let remote = MockRemote::new();
    let ctx = open_online(&MemoryStore::new(), &remote);
    ctx.update(sighting("Y").with_id("1")).await.unwrap();
    remote.clear_calls();

    let report = ctx.import_batch(vec![sighting("X").with_id("1")]).await.unwrap();

    assert_eq!(
        report,
        ImportReport {
            replaced: 1,
            added: 0,
            uploaded: true,
            queued: 0,
        }
    );
    assert_eq!(ctx.list(), vec![sighting("X").with_id("1")]);
    assert_eq!(remote.records(), vec![sighting("X").with_id("1")]);
    assert_eq!(
        remote.calls(),
        vec![Call::BulkUpsert(vec![sighting("X").with_id("1")])]
    );
    assert_eq!(ctx.pending_len(), 0);
}

#[tokio::test]
async fn repeated_id_in_batch_resolves_to_last_occurrence() {
    let remote = MockRemote::new();
    let ctx = open_online(&MemoryStore::new(), &remote);

    let report = ctx
        .import_batch(vec![
            sighting("Tarin").with_id("srv-1"),
            sighting("Serin").with_id("srv-1"),
        ])
        .await
        .unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(ids(&ctx.list()), vec!["srv-1"]);
    assert_eq!(species(&ctx.list()[0]), "Serin");
}

#[tokio::test]
async fn offline_import_is_queued_and_visible() {
    let remote = MockRemote::new();
    let ctx = open_offline(&MemoryStore::new(), &remote);

    let report = ctx
        .import_batch(vec![
            sighting("Grive").with_id("srv-1"),
            sighting("Mauvis").with_id("srv-2"),
        ])
        .await
        .unwrap();

    assert!(!report.uploaded);
    assert_eq!(report.queued, 2);
    assert_eq!(ids(&ctx.list()), vec!["srv-1", "srv-2"]);
    let kinds: Vec<OperationKind> = ctx.pending().iter().map(|op| op.kind()).collect();
    assert_eq!(kinds, vec![OperationKind::Insert, OperationKind::Insert]);
    assert!(remote.calls().is_empty());

    ctx.set_online(true).await.unwrap();
    assert_eq!(ids(&remote.records()), vec!["srv-1", "srv-2"]);
    assert_eq!(ctx.pending_len(), 0);
}

#[tokio::test]
async fn records_without_id_are_queued_as_creates() {
    let remote = MockRemote::new();
    let ctx = open_online(&MemoryStore::new(), &remote);

    let report = ctx
        .import_batch(vec![sighting("Alouette"), sighting("Pipit").with_id("srv-5")])
        .await
        .unwrap();

    assert_eq!(report.added, 2);
    assert!(report.uploaded);
    assert_eq!(report.queued, 1);
    assert_eq!(
        remote.calls(),
        vec![Call::BulkUpsert(vec![sighting("Pipit").with_id("srv-5")])]
    );

    let pending = ctx.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind(), OperationKind::Insert);
    assert!(is_placeholder_id(pending[0].record_id()));
    assert_eq!(ctx.list().len(), 2);
}

#[tokio::test]
async fn failed_upload_falls_back_to_queue() {
    let remote = MockRemote::new();
    remote.fail_when(fail_bulk(RemoteErrorKind::Transient));
    let ctx = open_online(&MemoryStore::new(), &remote);

    let report = ctx
        .import_batch(vec![sighting("Bruant").with_id("srv-3")])
        .await
        .unwrap();

    assert!(!report.uploaded);
    assert_eq!(report.queued, 1);
    assert_eq!(ids(&ctx.list()), vec!["srv-3"]);
    assert_eq!(ctx.pending_len(), 1);
}

#[tokio::test]
async fn import_touching_queued_record_is_not_uploaded() {
    let local = MemoryStore::new();
    let remote = MockRemote::new();
    open_offline(&local, &remote)
        .create(sighting("Linotte").with_id("srv-1"))
        .await
        .unwrap();

    let ctx = open_online(&local, &remote);
    let report = ctx
        .import_batch(vec![sighting("Linotte mélodieuse").with_id("srv-1")])
        .await
        .unwrap();

    assert!(!report.uploaded);
    assert_eq!(report.replaced, 1);
    assert!(remote.calls().is_empty());
    let kinds: Vec<OperationKind> = ctx.pending().iter().map(|op| op.kind()).collect();
    assert_eq!(kinds, vec![OperationKind::Insert, OperationKind::Update]);
    assert_eq!(species(&ctx.get("srv-1").unwrap()), "Linotte mélodieuse");
}

#[tokio::test]
async fn import_without_session_changes_nothing() {
    let remote = MockRemote::new();
    remote.fail_when(fail_bulk(RemoteErrorKind::NoSession));
    let ctx = open_online(&MemoryStore::new(), &remote);

    let err = ctx
        .import_batch(vec![sighting("Accenteur").with_id("srv-1")])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NotAuthenticated(_)), "{err:?}");
    assert!(ctx.list().is_empty());
    assert_eq!(ctx.pending_len(), 0);
}
