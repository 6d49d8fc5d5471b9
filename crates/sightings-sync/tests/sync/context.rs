//! Mutation path: routing through the connectivity gate, optimistic cache
//! updates and error absorption.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use sightings_sync::events::SyncEvent;
use sightings_sync::queue::OperationKind;
use sightings_sync::storage::MemoryStore;
use sightings_sync::sync::{DrainOutcome, SkipReason, SyncOptions};
use sightings_sync::types::is_placeholder_id;
use sightings_sync::{RemoteError, RemoteErrorKind, SyncError};

use super::support::*;

// ============================================================================
// Offline path
// ============================================================================

#[tokio::test]
async fn offline_create_is_visible_with_placeholder_id() {
    let local = MemoryStore::new();
    let remote = MockRemote::new();
    let ctx = open_offline(&local, &remote);

    let created = ctx.create(sighting("Merle noir")).await.unwrap();

    assert!(is_placeholder_id(&created.id), "{}", created.id);
    let listed = ctx.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);
    assert!(!listed[0].id.is_empty());
    assert_eq!(ctx.pending_len(), 1);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn offline_update_and_delete_apply_to_cache() {
    let local = MemoryStore::new();
    let remote = MockRemote::new();
    let ctx = open_offline(&local, &remote);

    let a = ctx.create(sighting("Pie bavarde")).await.unwrap();
    let b = ctx.create(sighting("Corneille")).await.unwrap();

    let mut renamed = a.clone();
    renamed.species_name = Some("Geai des chênes".into());
    ctx.update(renamed).await.unwrap();
    ctx.delete(&b.id).await.unwrap();

    let listed = ctx.list();
    assert_eq!(ids(&listed), vec![a.id.clone()]);
    assert_eq!(species(&listed[0]), "Geai des chênes");

    let kinds: Vec<OperationKind> = ctx.pending().iter().map(|op| op.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::Insert,
            OperationKind::Insert,
            OperationKind::Update,
            OperationKind::Delete
        ]
    );
}

#[tokio::test]
async fn update_without_id_is_rejected() {
    let ctx = open_offline(&MemoryStore::new(), &MockRemote::new());
    let err = ctx.update(sighting("Héron cendré")).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidRecord(_)));
    assert_eq!(ctx.pending_len(), 0);
}

#[tokio::test]
async fn local_store_failure_is_fatal_and_leaves_cache_untouched() {
    let local = MemoryStore::new();
    let ctx = open_offline(&local, &MockRemote::new());
    local.set_write_failure(Some("quota exceeded"));

    let err = ctx.create(sighting("Mésange bleue")).await.unwrap_err();

    assert!(matches!(err, SyncError::Storage(_)), "{err:?}");
    assert!(ctx.list().is_empty());
    assert_eq!(ctx.pending_len(), 0);
}

// ============================================================================
// Online path
// ============================================================================

#[tokio::test]
async fn online_create_uses_server_record() {
    let local = MemoryStore::new();
    let remote = MockRemote::new();
    let ctx = open_online(&local, &remote);

    let created = ctx.create(sighting("Rouge-gorge")).await.unwrap();

    assert_eq!(created.id, "srv-1");
    assert_eq!(ids(&ctx.list()), vec!["srv-1"]);
    assert_eq!(ctx.pending_len(), 0);
    assert_eq!(remote.calls(), vec![Call::Create(sighting("Rouge-gorge"))]);
}

#[tokio::test]
async fn online_update_and_delete_hit_remote() {
    let remote = MockRemote::with_records(vec![sighting("Buse").with_id("srv-9")]);
    let ctx = open_online(&MemoryStore::new(), &remote);

    let mut changed = sighting("Buse variable").with_id("srv-9");
    changed.count = Some(2);
    ctx.update(changed.clone()).await.unwrap();
    assert_eq!(ctx.get("srv-9"), Some(changed.clone()));

    ctx.delete("srv-9").await.unwrap();
    assert!(ctx.get("srv-9").is_none());
    assert_eq!(
        remote.calls(),
        vec![Call::Update(changed), Call::Delete("srv-9".to_string())]
    );
    assert_eq!(ctx.pending_len(), 0);
}

#[tokio::test]
async fn transient_remote_failure_degrades_to_queue() {
    let remote = MockRemote::new();
    remote.fail_when(|_| Some(RemoteError::new("503 Service Unavailable")));
    let ctx = open_online(&MemoryStore::new(), &remote);

    let created = ctx.create(sighting("Martinet noir")).await.unwrap();

    assert!(is_placeholder_id(&created.id));
    assert_eq!(ctx.pending_len(), 1);
    assert_eq!(ids(&ctx.list()), vec![created.id]);
}

#[tokio::test]
async fn expired_session_is_queued() {
    let remote = MockRemote::new();
    remote.fail_when(|_| Some(RemoteError::with_kind("token expired", RemoteErrorKind::Auth)));
    let ctx = open_online(&MemoryStore::new(), &remote);

    ctx.delete("srv-4").await.unwrap();

    assert_eq!(ctx.pending_len(), 1);
}

#[tokio::test]
async fn missing_session_is_surfaced_and_nothing_is_queued() {
    let remote = MockRemote::new();
    remote.fail_when(|_| Some(RemoteError::with_kind("no user", RemoteErrorKind::NoSession)));
    let ctx = open_online(&MemoryStore::new(), &remote);

    let err = ctx.create(sighting("Faucon crécerelle")).await.unwrap_err();

    assert!(matches!(err, SyncError::NotAuthenticated(_)), "{err:?}");
    assert!(ctx.list().is_empty());
    assert_eq!(ctx.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_remote_call_times_out_and_is_queued() {
    let remote = MockRemote::new();
    remote.set_delay(Some(Duration::from_secs(60)));
    let ctx = open(
        &MemoryStore::new(),
        &remote,
        SyncOptions {
            start_online: Some(true),
            remote_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        },
    );

    let created = ctx.create(sighting("Chouette hulotte")).await.unwrap();

    assert!(is_placeholder_id(&created.id));
    assert_eq!(ctx.pending_len(), 1);
}

#[tokio::test]
async fn placeholder_targets_are_deferred_while_online() {
    let local = MemoryStore::new();
    let remote = MockRemote::new();
    let ctx = open_offline(&local, &remote);
    let created = ctx.create(sighting("Bergeronnette")).await.unwrap();

    // Flip the gate without triggering a drain.
    let ctx = open_online(&local, &remote);
    let mut edited = created.clone();
    edited.notes = Some("près du lavoir".into());
    ctx.update(edited).await.unwrap();
    ctx.delete(&created.id).await.unwrap();

    assert!(remote.calls().is_empty());
    assert_eq!(ctx.pending_len(), 3);
}

#[tokio::test]
async fn record_with_queued_operations_is_deferred_while_online() {
    let local = MemoryStore::new();
    let remote = MockRemote::new();
    let offline = open_offline(&local, &remote);
    offline.delete("srv-1").await.unwrap();

    let ctx = open_online(&local, &remote);
    ctx.update(sighting("Moineau").with_id("srv-1")).await.unwrap();

    assert!(remote.calls().is_empty());
    let kinds: Vec<OperationKind> = ctx.pending().iter().map(|op| op.kind()).collect();
    assert_eq!(kinds, vec![OperationKind::Delete, OperationKind::Update]);
}

// ============================================================================
// Connectivity transitions
// ============================================================================

#[tokio::test]
async fn going_online_drains_exactly_once() {
    let remote = MockRemote::new();
    let ctx = open_offline(&MemoryStore::new(), &remote);
    ctx.create(sighting("Hirondelle")).await.unwrap();

    let report = ctx.set_online(true).await.unwrap().expect("transition drains");
    assert_eq!(report.outcome, DrainOutcome::Drained);

    assert_eq!(ctx.set_online(true).await.unwrap(), None);
    assert_eq!(ctx.set_online(false).await.unwrap(), None);

    let creates = remote
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Create(_)))
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn going_online_with_empty_queue_skips() {
    let ctx = open_offline(&MemoryStore::new(), &MockRemote::new());
    let report = ctx.set_online(true).await.unwrap().unwrap();
    assert_eq!(report.outcome, DrainOutcome::Skipped(SkipReason::Empty));
}

#[tokio::test]
async fn subscribers_see_cache_connectivity_and_drain_events() {
    let ctx = open_offline(&MemoryStore::new(), &MockRemote::new());
    let events: Arc<Mutex<Vec<SyncEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let id = ctx.subscribe(move |e| sink.lock().push(e.clone()));

    ctx.create(sighting("Pic vert")).await.unwrap();
    ctx.set_online(true).await.unwrap();
    ctx.unsubscribe(id);
    ctx.set_online(false).await.unwrap();

    let events = events.lock().clone();
    assert_eq!(events[0], SyncEvent::CacheChanged);
    assert_eq!(events[1], SyncEvent::ConnectivityChanged { online: true });
    assert!(matches!(&events[2], SyncEvent::Drained(r) if r.refreshed));
    assert_eq!(events[3], SyncEvent::CacheChanged);
    assert_eq!(events.len(), 4);
}
