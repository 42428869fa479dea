//! Local persistent cache for last-known crop data

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use async_trait::async_trait;
use shared::CropProfile;

use crate::error::{TrackerError, TrackerResult};

/// Key-value blob store
#[async_trait]
pub trait CropCache: Send + Sync {
    async fn get(&self, key: &str) -> TrackerResult<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: &[u8]) -> TrackerResult<()>;
}

/// Cache namespace key for one farmer's crops
pub fn cache_key(farmer_id: &str) -> String {
    format!("crops_cache_{}", farmer_id)
}

/// Cache key for one farmer's pending sync ledger
pub fn pending_key(farmer_id: &str) -> String {
    format!("crops_pending_{}", farmer_id)
}

/// Read the cached crop list, `None` when nothing has been cached yet
pub async fn load_profiles<C>(cache: &C, farmer_id: &str) -> TrackerResult<Option<Vec<CropProfile>>>
where
    C: CropCache + ?Sized,
{
    let Some(blob) = cache.get(&cache_key(farmer_id)).await? else {
        return Ok(None);
    };

    let profiles = serde_json::from_slice(&blob)
        .map_err(|e| TrackerError::Cache(format!("Corrupt crop cache: {}", e)))?;
    Ok(Some(profiles))
}

/// Overwrite the cached crop list
pub async fn store_profiles<C>(cache: &C, farmer_id: &str, profiles: &[CropProfile]) -> TrackerResult<()>
where
    C: CropCache + ?Sized,
{
    let blob = serde_json::to_vec(profiles)?;
    cache.put(&cache_key(farmer_id), &blob).await
}
