//! Offline-first crop sync service
//!
//! Every mutation is applied to the local registry immediately and returns
//! without waiting for I/O. A single background worker then persists the
//! cache and pushes the change to the remote store. A push that still fails
//! after retries keeps the local state, leaves the crop pending for a later
//! `resync`, and is reported as `RemoteSyncFailed` on the event channel.
//! The pending ledger is cached next to the crop list so owed changes
//! survive a restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{
    resolve, stage_timeline, CropProfile, CropRegistry, CropResult, Resolution, Stage,
    StageWindow,
};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{load_profiles, pending_key, store_profiles, CropCache};
use crate::config::SyncConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::external::RemoteCropStore;

/// Remote operation still owed for a crop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PendingOp {
    Create,
    Update,
    Delete,
}

impl PendingOp {
    /// Fold a newer local change into the op already owed
    pub fn merge(self, next: PendingOp) -> PendingOp {
        match (self, next) {
            (_, PendingOp::Delete) => PendingOp::Delete,
            (PendingOp::Create, PendingOp::Update) => PendingOp::Create,
            // The remote may still hold the crop the unsent delete was for
            (PendingOp::Delete, PendingOp::Create) => PendingOp::Update,
            (_, next) => next,
        }
    }

    /// Op still owed once `pushed` has reached the remote
    pub fn rebase(self, pushed: PendingOp) -> PendingOp {
        match (pushed, self) {
            (PendingOp::Create | PendingOp::Update, PendingOp::Create) => PendingOp::Update,
            (PendingOp::Delete, PendingOp::Update) => PendingOp::Create,
            (_, owed) => owed,
        }
    }
}

impl std::fmt::Display for PendingOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingOp::Create => write!(f, "create"),
            PendingOp::Update => write!(f, "update"),
            PendingOp::Delete => write!(f, "delete"),
        }
    }
}

/// Outcome of a background sync job
#[derive(Debug)]
pub enum SyncEvent {
    Synced { crop_id: String, op: PendingOp },
    Failed(TrackerError),
}

/// A crop together with its resolved lifecycle position
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropStatus {
    pub profile: CropProfile,
    pub resolution: Resolution,
}

impl CropStatus {
    pub fn current_stage(&self) -> Option<&Stage> {
        self.profile.stages.get(self.resolution.stage_index)
    }
}

/// Persisted form of one pending ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct PendingRecord {
    crop_id: String,
    op: PendingOp,
}

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    op: PendingOp,
    generation: u64,
}

#[derive(Debug, Default)]
struct SyncState {
    registry: CropRegistry,
    pending: HashMap<String, PendingEntry>,
    generation: u64,
}

impl SyncState {
    fn record(&mut self, crop_id: &str, op: PendingOp) {
        self.generation += 1;
        let op = match self.pending.get(crop_id) {
            Some(entry) => entry.op.merge(op),
            None => op,
        };
        self.pending.insert(
            crop_id.to_string(),
            PendingEntry {
                op,
                generation: self.generation,
            },
        );
    }

    /// Remote list with the still-pending local changes laid on top
    ///
    /// Remote crops keep their position. Pending local crops the remote does
    /// not know yet follow in registry order.
    fn overlay_pending(&self, remote: Vec<CropProfile>) -> Vec<CropProfile> {
        let mut merged = Vec::with_capacity(remote.len());
        for profile in remote {
            match self.pending.get(&profile.crop_id) {
                None => merged.push(profile),
                Some(entry) if entry.op == PendingOp::Delete => {}
                Some(_) => match self.registry.get(&profile.crop_id) {
                    Ok(local) => merged.push(local.clone()),
                    Err(_) => merged.push(profile),
                },
            }
        }

        let unseen: Vec<CropProfile> = self
            .registry
            .list()
            .into_iter()
            .filter(|local| {
                self.pending
                    .get(&local.crop_id)
                    .is_some_and(|entry| entry.op != PendingOp::Delete)
                    && !merged.iter().any(|p| p.crop_id == local.crop_id)
            })
            .cloned()
            .collect();
        merged.extend(unseen);
        merged
    }

    fn ledger(&self) -> Vec<PendingRecord> {
        let mut ledger: Vec<PendingRecord> = self
            .pending
            .iter()
            .map(|(crop_id, entry)| PendingRecord {
                crop_id: crop_id.clone(),
                op: entry.op,
            })
            .collect();
        ledger.sort_by(|a, b| a.crop_id.cmp(&b.crop_id));
        ledger
    }

    fn restore(&mut self, ledger: Vec<PendingRecord>) {
        self.pending.clear();
        for record in ledger {
            self.record(&record.crop_id, record.op);
        }
    }

    /// Settle the entry for a push of `pushed` that reached the remote
    fn settle(&mut self, crop_id: &str, pushed: PendingEntry) {
        let Some(current) = self.pending.get_mut(crop_id) else {
            return;
        };
        if current.generation == pushed.generation {
            self.pending.remove(crop_id);
        } else {
            current.op = current.op.rebase(pushed.op);
        }
    }
}

async fn load_ledger(cache: &dyn CropCache, farmer_id: &str) -> TrackerResult<Vec<PendingRecord>> {
    let Some(blob) = cache.get(&pending_key(farmer_id)).await? else {
        return Ok(Vec::new());
    };
    serde_json::from_slice(&blob)
        .map_err(|e| TrackerError::Cache(format!("Corrupt pending ledger: {}", e)))
}

async fn store_ledger(
    cache: &dyn CropCache,
    farmer_id: &str,
    ledger: &[PendingRecord],
) -> TrackerResult<()> {
    let blob = serde_json::to_vec(ledger)?;
    cache.put(&pending_key(farmer_id), &blob).await
}

enum SyncJob {
    Push { crop_id: String },
}

/// Crop registry with optimistic local mutation and background remote sync
pub struct CropSyncService {
    farmer_id: String,
    state: Arc<RwLock<SyncState>>,
    remote: Arc<dyn RemoteCropStore>,
    cache: Arc<dyn CropCache>,
    jobs: mpsc::UnboundedSender<SyncJob>,
    worker: JoinHandle<()>,
}

impl CropSyncService {
    /// Start the service and its sync worker; must run inside a tokio runtime
    pub fn spawn(
        farmer_id: impl Into<String>,
        remote: Arc<dyn RemoteCropStore>,
        cache: Arc<dyn CropCache>,
        config: SyncConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let farmer_id = farmer_id.into();
        let state = Arc::new(RwLock::new(SyncState::default()));
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let worker = SyncWorker {
            farmer_id: farmer_id.clone(),
            state: state.clone(),
            remote: remote.clone(),
            cache: cache.clone(),
            config,
            events: events_tx,
        };
        let worker = tokio::spawn(worker.run(jobs_rx));

        let service = Self {
            farmer_id,
            state,
            remote,
            cache,
            jobs: jobs_tx,
            worker,
        };
        (service, events_rx)
    }

    pub fn farmer_id(&self) -> &str {
        &self.farmer_id
    }

    /// Load the last cached crop list and pending ledger for instant display
    pub async fn cold_start(&self) -> TrackerResult<usize> {
        let profiles = load_profiles(self.cache.as_ref(), &self.farmer_id)
            .await?
            .unwrap_or_default();
        let ledger = load_ledger(self.cache.as_ref(), &self.farmer_id).await?;

        let mut state = self.state.write().await;
        state.registry.replace_all(profiles)?;
        state.restore(ledger);
        info!(
            farmer_id = %self.farmer_id,
            crops = state.registry.len(),
            pending = state.pending.len(),
            "Loaded crops from cache"
        );
        Ok(state.registry.len())
    }

    /// Fetch the remote crop list, keep pending local changes on top, and cache it
    pub async fn refresh(&self) -> TrackerResult<usize> {
        let remote = self.remote.list_crops(&self.farmer_id).await?;
        debug!(crops = remote.len(), "Fetched remote crops");

        let snapshot = {
            let mut state = self.state.write().await;
            let merged = state.overlay_pending(remote);
            state.registry.replace_all(merged)?;
            state.registry.snapshot()
        };

        store_profiles(self.cache.as_ref(), &self.farmer_id, &snapshot).await?;
        info!(farmer_id = %self.farmer_id, crops = snapshot.len(), "Refreshed crops from remote");
        Ok(snapshot.len())
    }

    pub async fn add(&self, profile: CropProfile) -> TrackerResult<CropProfile> {
        let stored = {
            let mut state = self.state.write().await;
            let stored = state.registry.add(profile)?;
            state.record(&stored.crop_id, PendingOp::Create);
            stored
        };

        info!(crop_id = %stored.crop_id, name = %stored.name, "Crop added");
        self.enqueue(&stored.crop_id);
        Ok(stored)
    }

    pub async fn update(&self, crop_id: &str, profile: CropProfile) -> TrackerResult<CropProfile> {
        self.modify(crop_id, |_| Ok(profile)).await
    }

    pub async fn remove(&self, crop_id: &str) -> TrackerResult<()> {
        {
            let mut state = self.state.write().await;
            state.registry.remove(crop_id)?;
            state.record(crop_id, PendingOp::Delete);
        }

        info!(crop_id, "Crop removed");
        self.enqueue(crop_id);
        Ok(())
    }

    pub async fn add_stage(&self, crop_id: &str, stage: Stage) -> TrackerResult<CropProfile> {
        self.modify(crop_id, |current| current.with_stage_added(stage))
            .await
    }

    pub async fn replace_stage(
        &self,
        crop_id: &str,
        stage_id: u32,
        stage: Stage,
    ) -> TrackerResult<CropProfile> {
        self.modify(crop_id, |current| current.with_stage_replaced(stage_id, stage))
            .await
    }

    pub async fn remove_stage(&self, crop_id: &str, stage_id: u32) -> TrackerResult<CropProfile> {
        self.modify(crop_id, |current| current.without_stage(stage_id))
            .await
    }

    pub async fn get(&self, crop_id: &str) -> TrackerResult<CropProfile> {
        let state = self.state.read().await;
        Ok(state.registry.get(crop_id)?.clone())
    }

    pub async fn list(&self) -> Vec<CropProfile> {
        self.state.read().await.registry.snapshot()
    }

    /// Resolve every crop at `reference_date`
    pub async fn statuses(&self, reference_date: NaiveDate) -> TrackerResult<Vec<CropStatus>> {
        let state = self.state.read().await;
        state
            .registry
            .list()
            .into_iter()
            .map(|profile| -> TrackerResult<CropStatus> {
                let resolution = resolve(profile, reference_date)?;
                Ok(CropStatus {
                    profile: profile.clone(),
                    resolution,
                })
            })
            .collect()
    }

    pub async fn timeline(&self, crop_id: &str) -> TrackerResult<Vec<StageWindow>> {
        let state = self.state.read().await;
        Ok(stage_timeline(state.registry.get(crop_id)?)?)
    }

    /// Crop ids whose remote push has not succeeded yet
    pub async fn pending(&self) -> Vec<(String, PendingOp)> {
        let state = self.state.read().await;
        let mut pending: Vec<(String, PendingOp)> = state
            .pending
            .iter()
            .map(|(id, entry)| (id.clone(), entry.op))
            .collect();
        pending.sort();
        pending
    }

    /// Queue another push for every pending crop
    pub async fn resync(&self) -> usize {
        let ids: Vec<String> = self.state.read().await.pending.keys().cloned().collect();
        for crop_id in &ids {
            self.enqueue(crop_id);
        }
        info!(pending = ids.len(), "Resync queued");
        ids.len()
    }

    /// Stop accepting jobs and wait for queued pushes to finish
    pub async fn shutdown(self) {
        drop(self.jobs);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "Sync worker ended abnormally");
        }
    }

    /// Read-modify-write of one profile under a single write lock
    async fn modify<F>(&self, crop_id: &str, change: F) -> TrackerResult<CropProfile>
    where
        F: FnOnce(&CropProfile) -> CropResult<CropProfile>,
    {
        let stored = {
            let mut state = self.state.write().await;
            let next = change(state.registry.get(crop_id)?)?;
            let stored = state.registry.update(crop_id, next)?;
            state.record(crop_id, PendingOp::Update);
            stored
        };

        info!(crop_id, name = %stored.name, "Crop updated");
        self.enqueue(crop_id);
        Ok(stored)
    }

    fn enqueue(&self, crop_id: &str) {
        let job = SyncJob::Push {
            crop_id: crop_id.to_string(),
        };
        if self.jobs.send(job).is_err() {
            warn!(crop_id, "Sync worker stopped, change left pending");
        }
    }
}

struct SyncWorker {
    farmer_id: String,
    state: Arc<RwLock<SyncState>>,
    remote: Arc<dyn RemoteCropStore>,
    cache: Arc<dyn CropCache>,
    config: SyncConfig,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncWorker {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<SyncJob>) {
        while let Some(job) = jobs.recv().await {
            match job {
                SyncJob::Push { crop_id } => self.push(&crop_id).await,
            }
        }
        debug!(farmer_id = %self.farmer_id, "Sync worker stopped");
    }

    async fn push(&self, crop_id: &str) {
        let (entry, profile, snapshot, ledger) = {
            let state = self.state.read().await;
            let Some(entry) = state.pending.get(crop_id).copied() else {
                debug!(crop_id, "Nothing pending, skipping push");
                return;
            };
            (
                entry,
                state.registry.get(crop_id).ok().cloned(),
                state.registry.snapshot(),
                state.ledger(),
            )
        };

        if let Err(e) = store_profiles(self.cache.as_ref(), &self.farmer_id, &snapshot).await {
            warn!(error = %e, "Failed to persist crop cache");
            self.emit(SyncEvent::Failed(e));
        }
        self.persist_ledger(&ledger).await;

        match self.push_with_retry(crop_id, entry.op, profile.as_ref()).await {
            Ok(()) => {
                let ledger = {
                    let mut state = self.state.write().await;
                    state.settle(crop_id, entry);
                    state.ledger()
                };
                self.persist_ledger(&ledger).await;
                info!(crop_id, op = %entry.op, "Crop synced");
                self.emit(SyncEvent::Synced {
                    crop_id: crop_id.to_string(),
                    op: entry.op,
                });
            }
            Err(e) => {
                warn!(crop_id, op = %entry.op, error = %e, "Crop left pending after failed sync");
                self.emit(SyncEvent::Failed(TrackerError::RemoteSyncFailed {
                    crop_id: crop_id.to_string(),
                    message: e.to_string(),
                }));
            }
        }
    }

    async fn persist_ledger(&self, ledger: &[PendingRecord]) {
        if let Err(e) = store_ledger(self.cache.as_ref(), &self.farmer_id, ledger).await {
            warn!(error = %e, "Failed to persist pending ledger");
            self.emit(SyncEvent::Failed(e));
        }
    }

    async fn push_with_retry(
        &self,
        crop_id: &str,
        op: PendingOp,
        profile: Option<&CropProfile>,
    ) -> TrackerResult<()> {
        let attempts = self.config.max_retries.max(1);
        let mut backoff = self.config.retry_backoff();
        let mut attempt = 1;

        loop {
            match self.push_once(crop_id, op, profile).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(crop_id, attempt, error = %e, "Remote push failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn push_once(
        &self,
        crop_id: &str,
        op: PendingOp,
        profile: Option<&CropProfile>,
    ) -> TrackerResult<()> {
        match (op, profile) {
            (PendingOp::Delete, _) => self.remote.delete_crop(&self.farmer_id, crop_id).await,
            (PendingOp::Create, Some(profile)) => {
                let created = match self.remote.create_crop(&self.farmer_id, profile).await {
                    Err(TrackerError::RemoteConflict(_)) => {
                        debug!(crop_id, "Crop already on remote, updating instead");
                        self.remote
                            .update_crop(&self.farmer_id, crop_id, profile)
                            .await?
                    }
                    result => result?,
                };
                if created.crop_id != crop_id {
                    warn!(
                        crop_id,
                        remote_id = %created.crop_id,
                        "Remote store assigned a different crop id"
                    );
                }
                Ok(())
            }
            (PendingOp::Update, Some(profile)) => {
                match self
                    .remote
                    .update_crop(&self.farmer_id, crop_id, profile)
                    .await
                {
                    Err(TrackerError::RemoteNotFound(_)) => {
                        debug!(crop_id, "Crop missing on remote, creating instead");
                        self.remote.create_crop(&self.farmer_id, profile).await?;
                        Ok(())
                    }
                    result => result.map(|_| ()),
                }
            }
            (_, None) => {
                debug!(crop_id, "Crop no longer present locally");
                Ok(())
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}
