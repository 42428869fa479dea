//! In-memory crop registry
//!
//! The authoritative set of one farmer's crop profiles. Profiles are replaced
//! whole on every mutation and validated before anything changes, so a
//! reader never observes a half-applied update.

use std::collections::{HashMap, HashSet};

use crate::error::{CropError, CropResult};
use crate::models::{generate_crop_id, CropProfile};
use crate::validation::validate_profile;

/// Keyed collection of crop profiles, listed in insertion order
#[derive(Debug, Clone, Default)]
pub struct CropRegistry {
    profiles: HashMap<String, CropProfile>,
    order: Vec<String>,
}

impl CropRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-stored profiles (cache or remote)
    pub fn from_profiles(profiles: Vec<CropProfile>) -> CropResult<Self> {
        let mut registry = Self::new();
        registry.replace_all(profiles)?;
        Ok(registry)
    }

    /// Insert a new profile, assigning a crop id when blank
    pub fn add(&mut self, mut profile: CropProfile) -> CropResult<CropProfile> {
        validate_profile(&profile)?;

        if profile.crop_id.trim().is_empty() {
            profile.crop_id = self.unused_crop_id();
        } else if self.profiles.contains_key(&profile.crop_id) {
            return Err(CropError::DuplicateId(profile.crop_id));
        }

        self.order.push(profile.crop_id.clone());
        self.profiles
            .insert(profile.crop_id.clone(), profile.clone());
        Ok(profile)
    }

    /// Replace the stored profile for `crop_id` with `profile`
    ///
    /// The stored copy always keeps `crop_id` as its identity. Merging partial
    /// changes is the caller's job.
    pub fn update(&mut self, crop_id: &str, mut profile: CropProfile) -> CropResult<CropProfile> {
        if !self.profiles.contains_key(crop_id) {
            return Err(CropError::NotFound(crop_id.to_string()));
        }
        validate_profile(&profile)?;

        profile.crop_id = crop_id.to_string();
        self.profiles.insert(crop_id.to_string(), profile.clone());
        Ok(profile)
    }

    /// Remove a profile; removing an absent id is an error
    pub fn remove(&mut self, crop_id: &str) -> CropResult<CropProfile> {
        let removed = self
            .profiles
            .remove(crop_id)
            .ok_or_else(|| CropError::NotFound(crop_id.to_string()))?;
        self.order.retain(|id| id != crop_id);
        Ok(removed)
    }

    pub fn get(&self, crop_id: &str) -> CropResult<&CropProfile> {
        self.profiles
            .get(crop_id)
            .ok_or_else(|| CropError::NotFound(crop_id.to_string()))
    }

    pub fn contains(&self, crop_id: &str) -> bool {
        self.profiles.contains_key(crop_id)
    }

    /// All profiles in insertion order
    pub fn list(&self) -> Vec<&CropProfile> {
        self.order
            .iter()
            .filter_map(|id| self.profiles.get(id))
            .collect()
    }

    /// Owned snapshot of all profiles in insertion order
    pub fn snapshot(&self) -> Vec<CropProfile> {
        self.list().into_iter().cloned().collect()
    }

    /// Profiles whose name matches, ignoring case and surrounding whitespace
    pub fn find_by_name(&self, name: &str) -> Vec<&CropProfile> {
        let needle = name.trim().to_lowercase();
        self.list()
            .into_iter()
            .filter(|p| p.name.trim().to_lowercase() == needle)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Replace the whole contents with `profiles`
    ///
    /// The batch is validated as a unit; on any error the registry is left
    /// untouched. Profiles without an id get one assigned.
    pub fn replace_all(&mut self, profiles: Vec<CropProfile>) -> CropResult<()> {
        let mut seen = HashSet::with_capacity(profiles.len());
        for profile in &profiles {
            validate_profile(profile)?;
            if !profile.crop_id.trim().is_empty() && !seen.insert(profile.crop_id.clone()) {
                return Err(CropError::DuplicateId(profile.crop_id.clone()));
            }
        }

        let mut next = Self::new();
        for profile in profiles {
            next.add(profile)?;
        }
        *self = next;
        Ok(())
    }

    fn unused_crop_id(&self) -> String {
        loop {
            let id = generate_crop_id();
            if !self.profiles.contains_key(&id) {
                return id;
            }
        }
    }
}
