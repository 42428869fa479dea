//! Backend crop store client
//!
//! Talks to the farmer crop resources of the backend REST API:
//! `GET/POST /farmer/{farmerId}/crops` and
//! `PUT/DELETE /farmer/{farmerId}/crops/{cropId}`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use shared::CropProfile;

use crate::config::ApiConfig;
use crate::error::{TrackerError, TrackerResult};

/// Remote CRUD store for crop profiles
#[async_trait]
pub trait RemoteCropStore: Send + Sync {
    async fn list_crops(&self, farmer_id: &str) -> TrackerResult<Vec<CropProfile>>;

    /// Fails with `RemoteConflict` when the crop id is already taken
    async fn create_crop(&self, farmer_id: &str, profile: &CropProfile) -> TrackerResult<CropProfile>;

    /// Fails with `RemoteNotFound` when the crop is absent

    async fn update_crop(
        &self,
        farmer_id: &str,
        crop_id: &str,
        profile: &CropProfile,
    ) -> TrackerResult<CropProfile>;

    /// Deleting an already-absent crop succeeds
    async fn delete_crop(&self, farmer_id: &str, crop_id: &str) -> TrackerResult<()>;
}

/// HTTP client for the backend crop store
#[derive(Clone)]
pub struct CropApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl CropApiClient {
    /// Create a client from configuration
    pub fn new(config: &ApiConfig) -> TrackerResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Create a client with a custom base URL and default settings (for testing)
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    pub fn crops_url(&self, farmer_id: &str) -> String {
        format!("{}/farmer/{}/crops", self.base_url, farmer_id)
    }

    pub fn crop_url(&self, farmer_id: &str, crop_id: &str) -> String {
        format!("{}/farmer/{}/crops/{}", self.base_url, farmer_id, crop_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(response: Response, action: &str) -> TrackerResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(TrackerError::Remote(format!(
            "{} failed: {} - {}",
            action, status, body
        )))
    }
}

#[async_trait]
impl RemoteCropStore for CropApiClient {
    async fn list_crops(&self, farmer_id: &str) -> TrackerResult<Vec<CropProfile>> {
        let url = self.crops_url(farmer_id);
        tracing::debug!(%url, "Fetching crops");

        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = Self::check_status(response, "List crops").await?;

        let profiles: Vec<CropProfile> = response
            .json()
            .await
            .map_err(|e| TrackerError::Remote(format!("Failed to parse crop list: {}", e)))?;
        Ok(profiles)
    }

    async fn create_crop(&self, farmer_id: &str, profile: &CropProfile) -> TrackerResult<CropProfile> {
        let url = self.crops_url(farmer_id);
        tracing::debug!(%url, crop_id = %profile.crop_id, "Creating crop");

        let response = self
            .authorize(self.client.post(&url).json(profile))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(TrackerError::RemoteConflict(profile.crop_id.clone()));
        }
        let response = Self::check_status(response, "Create crop").await?;

        response
            .json()
            .await
            .map_err(|e| TrackerError::Remote(format!("Failed to parse created crop: {}", e)))
    }

    async fn update_crop(
        &self,
        farmer_id: &str,
        crop_id: &str,
        profile: &CropProfile,
    ) -> TrackerResult<CropProfile> {
        let url = self.crop_url(farmer_id, crop_id);
        tracing::debug!(%url, "Updating crop");

        let response = self
            .authorize(self.client.put(&url).json(profile))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TrackerError::RemoteNotFound(crop_id.to_string()));
        }
        let response = Self::check_status(response, "Update crop").await?;

        response
            .json()
            .await
            .map_err(|e| TrackerError::Remote(format!("Failed to parse updated crop: {}", e)))
    }

    async fn delete_crop(&self, farmer_id: &str, crop_id: &str) -> TrackerResult<()> {
        let url = self.crop_url(farmer_id, crop_id);
        tracing::debug!(%url, "Deleting crop");

        let response = self.authorize(self.client.delete(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(crop_id, "Crop already absent on remote");
            return Ok(());
        }
        Self::check_status(response, "Delete crop").await?;
        Ok(())
    }
}
