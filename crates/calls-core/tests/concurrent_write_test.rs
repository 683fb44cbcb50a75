//! Writers racing on the same call never move it backwards

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use calls_core::{
    reconcile, CallStatus, CallStore, MemoryCallStore, PollChannel, ProviderSnapshot,
    SqliteCallStore,
};
use common::{call_aged, remote_live, FakeProvider};

async fn sqlite_store() -> (Arc<dyn CallStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("calls.db").display());
    let store = SqliteCallStore::new(&url).await.unwrap();
    (Arc::new(store), dir)
}

/// A change set computed before another writer ended the call
async fn assert_late_ringing_keeps_terminal(store: Arc<dyn CallStore>) {
    let call = call_aged(CallStatus::Queued, Some("prov-1"), 30);
    store.insert_call(&call).await.unwrap();

    let read_first = store.get_call("owner-1", &call.id).await.unwrap().unwrap();
    let read_second = store.get_call("owner-1", &call.id).await.unwrap().unwrap();

    let busy = reconcile(&read_second, &ProviderSnapshot::ended("customer-busy"));
    let stored = store.apply_changes(&call.id, &busy, Utc::now()).await.unwrap();
    assert_eq!(stored.status, CallStatus::Busy);

    let mut ringing = ProviderSnapshot::live("ringing");
    ringing.transcript = Some("AI: Hello?".into());
    let late = reconcile(&read_first, &ringing);
    assert_eq!(late.status, Some(CallStatus::Ringing));

    let stored = store.apply_changes(&call.id, &late, Utc::now()).await.unwrap();
    assert_eq!(stored.status, CallStatus::Busy);
    assert_eq!(stored.transcript.as_deref(), Some("AI: Hello?"));
    assert_eq!(
        store.get_call("owner-1", &call.id).await.unwrap().unwrap().status,
        CallStatus::Busy
    );
}

/// A live move computed before another writer advanced the call further
async fn assert_late_live_status_keeps_progress(store: Arc<dyn CallStore>) {
    let call = call_aged(CallStatus::Queued, Some("prov-2"), 30);
    store.insert_call(&call).await.unwrap();
    let stale = store.get_call("owner-1", &call.id).await.unwrap().unwrap();

    let answered = reconcile(&stale, &ProviderSnapshot::live("in-progress"));
    store.apply_changes(&call.id, &answered, Utc::now()).await.unwrap();

    let ringing = reconcile(&stale, &ProviderSnapshot::live("ringing"));
    let stored = store.apply_changes(&call.id, &ringing, Utc::now()).await.unwrap();
    assert_eq!(stored.status, CallStatus::InProgress);
}

/// First write wins for content even when both writers read it empty
async fn assert_first_transcript_wins(store: Arc<dyn CallStore>) {
    let call = call_aged(CallStatus::InProgress, Some("prov-3"), 30);
    store.insert_call(&call).await.unwrap();
    let stale = store.get_call("owner-1", &call.id).await.unwrap().unwrap();

    let mut first = ProviderSnapshot::ended("customer-ended-call");
    first.transcript = Some("AI: first".into());
    store
        .apply_changes(&call.id, &reconcile(&stale, &first), Utc::now())
        .await
        .unwrap();

    let mut second = ProviderSnapshot::ended("customer-ended-call");
    second.transcript = Some("AI: second".into());
    let stored = store
        .apply_changes(&call.id, &reconcile(&stale, &second), Utc::now())
        .await
        .unwrap();
    assert_eq!(stored.status, CallStatus::Completed);
    assert_eq!(stored.transcript.as_deref(), Some("AI: first"));
}

#[tokio::test]
async fn test_memory_store_refuses_regression() {
    assert_late_ringing_keeps_terminal(Arc::new(MemoryCallStore::new())).await;
    assert_late_live_status_keeps_progress(Arc::new(MemoryCallStore::new())).await;
    assert_first_transcript_wins(Arc::new(MemoryCallStore::new())).await;
}

#[tokio::test]
async fn test_sqlite_store_refuses_regression() {
    let (store, _dir) = sqlite_store().await;
    assert_late_ringing_keeps_terminal(store.clone()).await;
    assert_late_live_status_keeps_progress(store.clone()).await;
    assert_first_transcript_wins(store).await;
}

#[tokio::test]
async fn test_poll_after_stale_sweep_keeps_failure() {
    let store = MemoryCallStore::new();
    let mut in_hand = call_aged(CallStatus::Queued, Some("prov-1"), 15 * 60);
    store.insert_call(&in_hand).await.unwrap();

    let failed = store
        .fail_stale_calls(Utc::now() - Duration::minutes(10), "timed out")
        .await
        .unwrap();
    assert_eq!(failed, 1);

    let provider = FakeProvider::new();
    provider.set_remote("prov-1", remote_live("prov-1", "ringing"));
    let poll = PollChannel::new(Arc::new(store.clone()), provider);

    let changes = poll.sync_call(&mut in_hand).await.unwrap();
    assert!(changes.is_empty());
    assert_eq!(in_hand.status, CallStatus::Failed);
    assert_eq!(in_hand.error_message.as_deref(), Some("timed out"));
    assert_eq!(store.get_any(&in_hand.id).await.unwrap().status, CallStatus::Failed);
}
