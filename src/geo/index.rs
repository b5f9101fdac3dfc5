use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::agent::GeoPoint;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub agent_id: Uuid,
    pub distance_km: f64,
    pub rating: f64,
    pub location_updated_at: DateTime<Utc>,
}

/// Ranked candidates, nearest first. Consumed once; query again for a
/// fresh view.
#[derive(Debug)]
pub struct Candidates {
    inner: std::vec::IntoIter<Candidate>,
}

impl Iterator for Candidates {
    type Item = Candidate;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Candidates {}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| b.rating.total_cmp(&a.rating))
        .then_with(|| a.location_updated_at.cmp(&b.location_updated_at))
}

#[derive(Clone)]
pub struct GeoAvailabilityIndex {
    store: Arc<dyn Store>,
    location_max_age: Duration,
}

impl GeoAvailabilityIndex {
    pub fn new(store: Arc<dyn Store>, location_max_age: Duration) -> Self {
        Self {
            store,
            location_max_age,
        }
    }

    pub async fn find_candidates(
        &self,
        point: &GeoPoint,
        max_distance_km: f64,
        limit: usize,
    ) -> Result<Candidates, AppError> {
        self.find_candidates_at(point, max_distance_km, limit, Utc::now())
            .await
    }

    pub async fn find_candidates_at(
        &self,
        point: &GeoPoint,
        max_distance_km: f64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Candidates, AppError> {
        let agents = self.store.list_agents().await?;

        let mut ranked: Vec<Candidate> = agents
            .into_iter()
            .filter(|agent| agent.is_dispatch_eligible())
            .filter_map(|agent| {
                let location = agent.current_location?;
                if !agent.location_is_fresh(now, self.location_max_age) {
                    debug!(
                        agent_id = %agent.id,
                        last_updated = %location.last_updated,
                        "skipping agent with stale location"
                    );
                    return None;
                }

                let distance_km = haversine_km(point, &location.point);
                (distance_km <= max_distance_km).then(|| Candidate {
                    agent_id: agent.id,
                    distance_km,
                    rating: agent.rating,
                    location_updated_at: location.last_updated,
                })
            })
            .collect();

        ranked.sort_by(rank);
        ranked.truncate(limit);

        Ok(Candidates {
            inner: ranked.into_iter(),
        })
    }
}
