//! Crop sync service integration tests
//!
//! Tests for:
//! - Optimistic local mutation with background push
//! - Failure reporting without rolling back local state
//! - Resync of pending changes after the remote recovers
//! - Cold start from cache and remote refresh
//! - Changes landing while a push is in flight
//! - Pending changes surviving a restart

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use proptest::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;

use crop_lifecycle_tracker::cache::{
    cache_key, load_profiles, pending_key, store_profiles, CropCache, MemoryCache,
};
use crop_lifecycle_tracker::config::SyncConfig;
use crop_lifecycle_tracker::external::RemoteCropStore;
use crop_lifecycle_tracker::services::{CropSyncService, PendingOp, SyncEvent};
use crop_lifecycle_tracker::{TrackerError, TrackerResult};
use shared::{CropError, CropProfile, Stage};

// ============================================================================
// Test Fixtures
// ============================================================================

/// In-memory remote store that can be switched into failure mode
///
/// POST of a known id is a conflict and PUT of an unknown id is not found,
/// like the backend.
#[derive(Default)]
struct FakeRemote {
    crops: Mutex<HashMap<String, CropProfile>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    creates: AtomicUsize,
    hold_creates: AtomicBool,
    create_started: Notify,
    create_release: Notify,
}

impl FakeRemote {
    fn failing() -> Self {
        let remote = Self::default();
        remote.failing.store(true, Ordering::SeqCst);
        remote
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn seed(&self, profile: CropProfile) {
        self.crops
            .lock()
            .unwrap()
            .insert(profile.crop_id.clone(), profile);
    }

    /// Park the next POST until `release_create`
    fn hold_next_create(&self) {
        self.hold_creates.store(true, Ordering::SeqCst);
    }

    fn release_create(&self) {
        self.hold_creates.store(false, Ordering::SeqCst);
        self.create_release.notify_one();
    }

    fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn stored(&self, crop_id: &str) -> Option<CropProfile> {
        self.crops.lock().unwrap().get(crop_id).cloned()
    }

    fn check(&self) -> TrackerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackerError::Remote("503 Service Unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCropStore for FakeRemote {
    async fn list_crops(&self, _farmer_id: &str) -> TrackerResult<Vec<CropProfile>> {
        self.check()?;
        let mut crops: Vec<CropProfile> = self.crops.lock().unwrap().values().cloned().collect();
        crops.sort_by(|a, b| a.crop_id.cmp(&b.crop_id));
        Ok(crops)
    }

    async fn create_crop(&self, _farmer_id: &str, profile: &CropProfile) -> TrackerResult<CropProfile> {
        self.check()?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.hold_creates.load(Ordering::SeqCst) {
            self.create_started.notify_one();
            self.create_release.notified().await;
        }

        let mut crops = self.crops.lock().unwrap();
        if crops.contains_key(&profile.crop_id) {
            return Err(TrackerError::RemoteConflict(profile.crop_id.clone()));
        }
        crops.insert(profile.crop_id.clone(), profile.clone());
        Ok(profile.clone())
    }

    async fn update_crop(
        &self,
        _farmer_id: &str,
        crop_id: &str,
        profile: &CropProfile,
    ) -> TrackerResult<CropProfile> {
        self.check()?;
        let mut crops = self.crops.lock().unwrap();
        if !crops.contains_key(crop_id) {
            return Err(TrackerError::RemoteNotFound(crop_id.to_string()));
        }
        crops.insert(crop_id.to_string(), profile.clone());
        Ok(profile.clone())
    }

    async fn delete_crop(&self, _farmer_id: &str, crop_id: &str) -> TrackerResult<()> {
        self.check()?;
        self.crops.lock().unwrap().remove(crop_id);
        Ok(())
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn maize(id: &str) -> CropProfile {
    CropProfile::new(
        "Maize",
        date("2025-01-01"),
        vec![
            Stage::new(1, "Germination", 4).unwrap(),
            Stage::new(2, "Vegetative", 6).unwrap(),
        ],
    )
    .with_id(id)
}

fn fast_sync() -> SyncConfig {
    SyncConfig {
        max_retries: 2,
        retry_backoff_ms: 1,
    }
}

fn start(
    remote: Arc<FakeRemote>,
    cache: Arc<MemoryCache>,
) -> (CropSyncService, UnboundedReceiver<SyncEvent>) {
    CropSyncService::spawn("farmer-1", remote, cache, fast_sync())
}

fn expect_synced(event: SyncEvent) -> (String, PendingOp) {
    match event {
        SyncEvent::Synced { crop_id, op } => (crop_id, op),
        other => panic!("unexpected event {:?}", other),
    }
}

async fn next_event(events: &mut UnboundedReceiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for sync event")
        .expect("event channel closed")
}

// ============================================================================
// Mutation and Push Tests
// ============================================================================

#[tokio::test]
async fn test_add_pushes_to_remote_and_cache() {
    let remote = Arc::new(FakeRemote::default());
    let cache = Arc::new(MemoryCache::new());
    let (service, mut events) = start(remote.clone(), cache.clone());

    let stored = service.add(maize("crop-1")).await.unwrap();
    assert_eq!(stored, maize("crop-1"));

    match next_event(&mut events).await {
        SyncEvent::Synced { crop_id, op } => {
            assert_eq!(crop_id, "crop-1");
            assert_eq!(op, PendingOp::Create);
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(remote.stored("crop-1"), Some(maize("crop-1")));
    assert_eq!(
        load_profiles(cache.as_ref(), "farmer-1").await.unwrap(),
        Some(vec![maize("crop-1")])
    );
    assert!(service.pending().await.is_empty());
    service.shutdown().await;
}

#[tokio::test]
async fn test_add_assigns_crop_id() {
    let remote = Arc::new(FakeRemote::default());
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));

    let stored = service.add(maize("")).await.unwrap();
    assert!(!stored.crop_id.is_empty());
    next_event(&mut events).await;
    assert!(remote.stored(&stored.crop_id).is_some());
    service.shutdown().await;
}

#[tokio::test]
async fn test_validation_errors_are_synchronous_and_nothing_is_pushed() {
    let remote = Arc::new(FakeRemote::default());
    let (service, _events) = start(remote.clone(), Arc::new(MemoryCache::new()));

    let mut empty = maize("crop-1");
    empty.stages.clear();
    let err = service.add(empty).await.unwrap_err();
    assert!(matches!(err, TrackerError::Crop(CropError::InvalidProfile(_))));

    let err = service.update("missing-id", maize("missing-id")).await.unwrap_err();
    assert!(matches!(err, TrackerError::Crop(CropError::NotFound(_))));

    let err = service.remove("missing-id").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    service.shutdown().await;
    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_duplicate_id_rejected() {
    let (service, _events) = start(Arc::new(FakeRemote::default()), Arc::new(MemoryCache::new()));
    service.add(maize("crop-1")).await.unwrap();
    let err = service.add(maize("crop-1")).await.unwrap_err();
    assert!(matches!(err, TrackerError::Crop(CropError::DuplicateId(_))));
    service.shutdown().await;
}

#[tokio::test]
async fn test_update_and_remove_reach_remote() {
    let remote = Arc::new(FakeRemote::default());
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));

    service.add(maize("crop-1")).await.unwrap();
    next_event(&mut events).await;

    let mut renamed = maize("crop-1");
    renamed.name = "Sweet Corn".to_string();
    service.update("crop-1", renamed.clone()).await.unwrap();
    next_event(&mut events).await;
    assert_eq!(remote.stored("crop-1").unwrap().name, "Sweet Corn");

    service.remove("crop-1").await.unwrap();
    match next_event(&mut events).await {
        SyncEvent::Synced { op, .. } => assert_eq!(op, PendingOp::Delete),
        other => panic!("unexpected event {:?}", other),
    }
    assert!(remote.stored("crop-1").is_none());
    assert!(matches!(
        service.get("crop-1").await,
        Err(TrackerError::Crop(CropError::NotFound(_)))
    ));
    service.shutdown().await;
}

#[tokio::test]
async fn test_stage_crud_goes_through_update() {
    let remote = Arc::new(FakeRemote::default());
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));
    service.add(maize("crop-1")).await.unwrap();
    next_event(&mut events).await;

    let updated = service
        .add_stage("crop-1", Stage::new(0, "Harvest", 2).unwrap())
        .await
        .unwrap();
    assert_eq!(updated.stages.last().unwrap().id, 3);

    let updated = service
        .replace_stage("crop-1", 2, Stage::new(0, "Tasseling", 5).unwrap())
        .await
        .unwrap();
    assert_eq!(updated.stages[1].title, "Tasseling");
    assert_eq!(updated.stages[1].id, 2);

    let updated = service.remove_stage("crop-1", 1).await.unwrap();
    assert_eq!(updated.stages.len(), 2);

    let err = service.remove_stage("crop-1", 42).await.unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Crop(CropError::StageNotFound { stage_id: 42, .. })
    ));

    service.shutdown().await;
    assert_eq!(remote.stored("crop-1").unwrap(), updated);
}

// ============================================================================
// Failure and Resync Tests
// ============================================================================

#[tokio::test]
async fn test_remote_failure_keeps_local_state() {
    let remote = Arc::new(FakeRemote::failing());
    let cache = Arc::new(MemoryCache::new());
    let (service, mut events) = start(remote.clone(), cache.clone());

    let stored = service.add(maize("crop-1")).await.unwrap();

    match next_event(&mut events).await {
        SyncEvent::Failed(TrackerError::RemoteSyncFailed { crop_id, .. }) => {
            assert_eq!(crop_id, "crop-1")
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Both configured attempts were made
    assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.get("crop-1").await.unwrap(), stored);
    assert_eq!(
        service.pending().await,
        vec![("crop-1".to_string(), PendingOp::Create)]
    );
    // The cache still reflects the optimistic change
    assert_eq!(
        load_profiles(cache.as_ref(), "farmer-1").await.unwrap(),
        Some(vec![stored])
    );
    service.shutdown().await;
}

#[tokio::test]
async fn test_resync_after_recovery() {
    let remote = Arc::new(FakeRemote::failing());
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));

    service.add(maize("crop-1")).await.unwrap();
    next_event(&mut events).await;

    let mut renamed = maize("crop-1");
    renamed.name = "Field Corn".to_string();
    service.update("crop-1", renamed).await.unwrap();
    next_event(&mut events).await;

    // Create then update still owes a create
    assert_eq!(
        service.pending().await,
        vec![("crop-1".to_string(), PendingOp::Create)]
    );

    remote.set_failing(false);
    assert_eq!(service.resync().await, 1);
    match next_event(&mut events).await {
        SyncEvent::Synced { crop_id, op } => {
            assert_eq!(crop_id, "crop-1");
            assert_eq!(op, PendingOp::Create);
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert!(service.pending().await.is_empty());
    assert_eq!(remote.stored("crop-1").unwrap().name, "Field Corn");
    service.shutdown().await;
}

// ============================================================================
// In-Flight Push Tests
// ============================================================================

#[tokio::test]
async fn test_update_during_create_push_is_sent_as_update() {
    let remote = Arc::new(FakeRemote::default());
    remote.hold_next_create();
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));

    service.add(maize("c1")).await.unwrap();
    remote.create_started.notified().await;

    let mut renamed = maize("c1");
    renamed.name = "Popcorn".to_string();
    service.update("c1", renamed).await.unwrap();
    remote.release_create();

    assert_eq!(
        expect_synced(next_event(&mut events).await),
        ("c1".to_string(), PendingOp::Create)
    );
    assert_eq!(
        expect_synced(next_event(&mut events).await),
        ("c1".to_string(), PendingOp::Update)
    );

    assert_eq!(remote.creates(), 1);
    assert_eq!(remote.stored("c1").unwrap().name, "Popcorn");
    assert!(service.pending().await.is_empty());
    service.shutdown().await;
}

#[tokio::test]
async fn test_readd_after_unsent_delete_replaces_remote_crop() {
    let remote = Arc::new(FakeRemote::default());
    remote.seed(maize("crop-1"));
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));
    service.refresh().await.unwrap();

    remote.set_failing(true);
    service.remove("crop-1").await.unwrap();
    next_event(&mut events).await;
    let mut replanted = maize("crop-1");
    replanted.name = "Replanted Maize".to_string();
    service.add(replanted).await.unwrap();
    next_event(&mut events).await;

    assert_eq!(
        service.pending().await,
        vec![("crop-1".to_string(), PendingOp::Update)]
    );

    remote.set_failing(false);
    service.resync().await;
    assert_eq!(
        expect_synced(next_event(&mut events).await),
        ("crop-1".to_string(), PendingOp::Update)
    );
    assert_eq!(remote.creates(), 0);
    assert_eq!(remote.stored("crop-1").unwrap().name, "Replanted Maize");
    service.shutdown().await;
}

#[tokio::test]
async fn test_readd_of_never_synced_crop_still_creates_it() {
    let remote = Arc::new(FakeRemote::failing());
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));

    service.add(maize("crop-1")).await.unwrap();
    next_event(&mut events).await;
    service.remove("crop-1").await.unwrap();
    next_event(&mut events).await;
    service.add(maize("crop-1")).await.unwrap();
    next_event(&mut events).await;

    remote.set_failing(false);
    service.resync().await;
    expect_synced(next_event(&mut events).await);
    assert_eq!(remote.stored("crop-1"), Some(maize("crop-1")));
    assert!(service.pending().await.is_empty());
    service.shutdown().await;
}

// ============================================================================
// Restart Tests
// ============================================================================

#[tokio::test]
async fn test_pending_changes_survive_restart() {
    let cache = Arc::new(MemoryCache::new());

    let (first, mut events) = start(Arc::new(FakeRemote::failing()), cache.clone());
    first.add(maize("offline-crop")).await.unwrap();
    next_event(&mut events).await;
    first.shutdown().await;

    let remote = Arc::new(FakeRemote::default());
    let (second, mut events) = start(remote.clone(), cache.clone());
    assert_eq!(second.cold_start().await.unwrap(), 1);
    assert_eq!(
        second.pending().await,
        vec![("offline-crop".to_string(), PendingOp::Create)]
    );

    second.refresh().await.unwrap();
    let ids: Vec<String> = second.list().await.into_iter().map(|p| p.crop_id).collect();
    assert_eq!(ids, vec!["offline-crop"]);

    assert_eq!(second.resync().await, 1);
    assert_eq!(
        expect_synced(next_event(&mut events).await),
        ("offline-crop".to_string(), PendingOp::Create)
    );
    assert!(remote.stored("offline-crop").is_some());
    second.shutdown().await;

    let (third, _events) = start(remote, cache);
    third.cold_start().await.unwrap();
    assert!(third.pending().await.is_empty());
    third.shutdown().await;
}

#[tokio::test]
async fn test_cold_start_with_corrupt_ledger_fails_loudly() {
    let cache = Arc::new(MemoryCache::new());
    cache.put(&pending_key("farmer-1"), b"[{").await.unwrap();

    let (service, _events) = start(Arc::new(FakeRemote::default()), cache);
    let err = service.cold_start().await.unwrap_err();
    assert_eq!(err.code(), "CACHE_ERROR");
    service.shutdown().await;
}

// ============================================================================
// Cold Start and Refresh Tests
// ============================================================================

#[tokio::test]
async fn test_cold_start_from_cache() {
    let cache = Arc::new(MemoryCache::new());
    store_profiles(cache.as_ref(), "farmer-1", &[maize("a"), maize("b")])
        .await
        .unwrap();

    let (service, _events) = start(Arc::new(FakeRemote::failing()), cache);
    assert_eq!(service.cold_start().await.unwrap(), 2);
    let ids: Vec<String> = service.list().await.into_iter().map(|p| p.crop_id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    service.shutdown().await;
}

#[tokio::test]
async fn test_cold_start_with_empty_cache() {
    let (service, _events) = start(Arc::new(FakeRemote::default()), Arc::new(MemoryCache::new()));
    assert_eq!(service.cold_start().await.unwrap(), 0);
    service.shutdown().await;
}

#[tokio::test]
async fn test_cold_start_with_corrupt_cache_fails_loudly() {
    let cache = Arc::new(MemoryCache::new());
    cache.put(&cache_key("farmer-1"), b"{broken").await.unwrap();

    let (service, _events) = start(Arc::new(FakeRemote::default()), cache);
    let err = service.cold_start().await.unwrap_err();
    assert!(matches!(err, TrackerError::Cache(_)));
    service.shutdown().await;
}

#[tokio::test]
async fn test_refresh_replaces_registry_and_writes_cache() {
    let remote = Arc::new(FakeRemote::default());
    remote.seed(maize("remote-1"));
    let cache = Arc::new(MemoryCache::new());
    store_profiles(cache.as_ref(), "farmer-1", &[maize("stale")])
        .await
        .unwrap();

    let (service, _events) = start(remote, cache.clone());
    service.cold_start().await.unwrap();
    assert_eq!(service.refresh().await.unwrap(), 1);

    assert!(service.get("stale").await.is_err());
    assert!(service.get("remote-1").await.is_ok());
    assert_eq!(
        load_profiles(cache.as_ref(), "farmer-1").await.unwrap(),
        Some(vec![maize("remote-1")])
    );
    service.shutdown().await;
}

#[tokio::test]
async fn test_refresh_keeps_pending_local_changes() {
    let remote = Arc::new(FakeRemote::failing());
    remote.seed(maize("shared"));
    remote.seed(maize("gone-locally"));
    let (service, mut events) = start(remote.clone(), Arc::new(MemoryCache::new()));

    service.add(maize("local-only")).await.unwrap();
    next_event(&mut events).await;

    // Seed the local view of the remote crops, then change them while offline
    remote.set_failing(false);
    service.refresh().await.unwrap();
    remote.set_failing(true);

    let mut renamed = maize("shared");
    renamed.name = "Local Name".to_string();
    service.update("shared", renamed).await.unwrap();
    next_event(&mut events).await;
    service.remove("gone-locally").await.unwrap();
    next_event(&mut events).await;

    remote.set_failing(false);
    service.refresh().await.unwrap();

    assert!(service.get("local-only").await.is_ok());
    assert_eq!(service.get("shared").await.unwrap().name, "Local Name");
    assert!(service.get("gone-locally").await.is_err());
    service.shutdown().await;
}

#[tokio::test]
async fn test_refresh_failure_surfaces_error() {
    let (service, _events) = start(Arc::new(FakeRemote::failing()), Arc::new(MemoryCache::new()));
    let err = service.refresh().await.unwrap_err();
    assert_eq!(err.code(), "REMOTE_STORE_ERROR");
    service.shutdown().await;
}

// ============================================================================
// Status Tests
// ============================================================================

#[tokio::test]
async fn test_statuses_and_timeline() {
    let (service, _events) = start(Arc::new(FakeRemote::default()), Arc::new(MemoryCache::new()));
    service.add(maize("crop-1")).await.unwrap();

    let statuses = service.statuses(date("2025-02-12")).await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].resolution.as_tuple(), (1, 33));
    assert_eq!(statuses[0].current_stage().unwrap().title, "Vegetative");

    let timeline = service.timeline("crop-1").await.unwrap();
    assert_eq!(timeline[1].window.start, date("2025-01-29"));
    assert_eq!(timeline[1].window.end, date("2025-03-12"));
    service.shutdown().await;
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn op_strategy() -> impl Strategy<Value = PendingOp> {
    prop_oneof![
        Just(PendingOp::Create),
        Just(PendingOp::Update),
        Just(PendingOp::Delete),
    ]
}

proptest! {
    /// A sequence of local changes ending in a delete always owes a delete
    #[test]
    fn test_pending_ops_ending_in_delete(ops in prop::collection::vec(op_strategy(), 0..10)) {
        let merged = ops
            .into_iter()
            .fold(PendingOp::Create, PendingOp::merge)
            .merge(PendingOp::Delete);
        prop_assert_eq!(merged, PendingOp::Delete);
    }

    /// Once a push lands, a superseding change never owes a second create
    #[test]
    fn test_rebase_after_create_never_recreates(ops in prop::collection::vec(op_strategy(), 0..10)) {
        let owed = ops.into_iter().fold(PendingOp::Create, PendingOp::merge);
        prop_assert_ne!(owed.rebase(PendingOp::Create), PendingOp::Create);
    }

    /// A freshly created crop keeps owing a create through any number of updates
    #[test]
    fn test_create_absorbs_updates(updates in 0..10usize) {
        let merged = (0..updates).fold(PendingOp::Create, |op, _| op.merge(PendingOp::Update));
        prop_assert_eq!(merged, PendingOp::Create);
    }
}
