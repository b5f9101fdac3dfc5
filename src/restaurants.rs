use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::restaurant::RestaurantProfile;

/// Read-only view of restaurant management.
#[async_trait]
pub trait RestaurantDirectory: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> Result<Option<RestaurantProfile>, AppError>;
}

#[derive(Default)]
pub struct InMemoryRestaurantDirectory {
    profiles: DashMap<Uuid, RestaurantProfile>,
}

impl InMemoryRestaurantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeding hook for the restaurant-management side.
    pub fn upsert(&self, profile: RestaurantProfile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl RestaurantDirectory for InMemoryRestaurantDirectory {
    async fn get_profile(&self, id: Uuid) -> Result<Option<RestaurantProfile>, AppError> {
        Ok(self.profiles.get(&id).map(|entry| entry.value().clone()))
    }
}
