use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{Config, DispatchSettings};
use crate::engine::dispatch::DispatchMatcher;
use crate::engine::earnings::EarningsAggregator;
use crate::engine::guard::AssignmentGuard;
use crate::engine::intake::OrderIntake;
use crate::engine::queue::DispatchQueue;
use crate::engine::transition::StatusTransitionEngine;
use crate::geo::index::GeoAvailabilityIndex;
use crate::models::earnings::EarningsCalendar;
use crate::notify::BroadcastNotifier;
use crate::observability::metrics::Metrics;
use crate::restaurants::InMemoryRestaurantDirectory;
use crate::store::{InMemoryStore, Store};

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub restaurants: Arc<InMemoryRestaurantDirectory>,
    pub events: Arc<BroadcastNotifier>,
    pub dispatch_settings: DispatchSettings,
    pub intake: OrderIntake,
    pub transitions: StatusTransitionEngine,
    pub guard: AssignmentGuard,
    pub index: GeoAvailabilityIndex,
    pub dispatcher: DispatchMatcher,
    pub earnings: EarningsAggregator,
    pub dispatch_queue: DispatchQueue,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<Uuid>) {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(config: &Config, store: Arc<dyn Store>) -> (Self, mpsc::Receiver<Uuid>) {
        let metrics = Metrics::new();
        let events = Arc::new(BroadcastNotifier::new(config.event_buffer_size));
        let restaurants = Arc::new(InMemoryRestaurantDirectory::new());
        let (dispatch_queue, order_rx) =
            DispatchQueue::new(config.dispatch_queue_size, metrics.clone());

        let earnings = EarningsAggregator::new(
            store.clone(),
            EarningsCalendar::new(config.earnings_offset),
            metrics.clone(),
        );
        let guard = AssignmentGuard::new(store.clone(), events.clone(), metrics.clone());
        let index = GeoAvailabilityIndex::new(store.clone(), config.dispatch.location_max_age);
        let dispatcher = DispatchMatcher::new(
            store.clone(),
            index.clone(),
            guard.clone(),
            events.clone(),
            config.dispatch.clone(),
        );
        let transitions = StatusTransitionEngine::new(
            store.clone(),
            events.clone(),
            earnings.clone(),
            config.pricing.delivery_buffer,
            metrics.clone(),
        )
        .with_dispatch_queue(dispatch_queue.clone());
        let intake = OrderIntake::new(store.clone(), restaurants.clone(), config.pricing.clone());

        (
            Self {
                store,
                restaurants,
                events,
                dispatch_settings: config.dispatch.clone(),
                intake,
                transitions,
                guard,
                index,
                dispatcher,
                earnings,
                dispatch_queue,
                metrics,
            },
            order_rx,
        )
    }
}
