use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::engine::earnings::EarningsAggregator;
use crate::engine::queue::DispatchQueue;
use crate::error::AppError;
use crate::models::order::{Actor, Order, OrderStatus, PaymentStatus};
use crate::notify::{DispatchEvent, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::Store;

/// Upper bound on optimistic retries when a concurrent writer bumps the
/// order version between our read and our compare-and-swap.
const MAX_COMMIT_ATTEMPTS: usize = 8;

#[derive(Clone)]
pub struct StatusTransitionEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    earnings: EarningsAggregator,
    dispatch_queue: Option<DispatchQueue>,
    delivery_buffer: Duration,
    metrics: Metrics,
}

impl StatusTransitionEngine {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        earnings: EarningsAggregator,
        delivery_buffer: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            notifier,
            earnings,
            dispatch_queue: None,
            delivery_buffer,
            metrics,
        }
    }

    /// Orders reaching `ready` are offered to this queue.
    pub fn with_dispatch_queue(mut self, queue: DispatchQueue) -> Self {
        self.dispatch_queue = Some(queue);
        self
    }

    pub async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: Option<Actor>,
        note: Option<String>,
    ) -> Result<Order, AppError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let current = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

            check_allowed(&current, new_status, actor.as_ref())?;

            let now = Utc::now();
            let mut next = current.clone();
            self.apply(&mut next, new_status, actor, note.clone(), now);

            if self
                .store
                .compare_and_swap_order(next.clone(), current.version)
                .await?
            {
                next.version = current.version + 1;
                self.after_commit(current.status, &next, actor, now).await;
                return Ok(next);
            }

            debug!(
                order_id = %order_id,
                attempt,
                "order changed concurrently; re-validating transition"
            );
        }

        Err(AppError::Conflict(format!(
            "order {order_id} kept changing; transition to {new_status} not applied"
        )))
    }

    /// Payment is tracked independently of the lifecycle: any status may
    /// carry any payment state, and no timeline entry is written.
    pub async fn update_payment_status(
        &self,
        order_id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Order, AppError> {
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let current = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

            let mut next = current.clone();
            next.payment_status = payment_status;
            next.updated_at = Utc::now().max(current.updated_at);

            if self
                .store
                .compare_and_swap_order(next.clone(), current.version)
                .await?
            {
                next.version = current.version + 1;
                info!(order_id = %order_id, payment_status = ?payment_status, "payment status updated");
                return Ok(next);
            }
        }

        Err(AppError::Conflict(format!(
            "order {order_id} kept changing; payment status not applied"
        )))
    }

    fn apply(
        &self,
        order: &mut Order,
        status: OrderStatus,
        actor: Option<Actor>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        order.push_status(status, actor, note, now);

        match status {
            OrderStatus::Confirmed if order.estimated_delivery_time.is_none() => {
                let preparation = Duration::minutes(i64::from(order.preparation_time_minutes));
                order.estimated_delivery_time = Some(now + preparation + self.delivery_buffer);
            }
            OrderStatus::Delivered if order.actual_delivery_time.is_none() => {
                order.actual_delivery_time = Some(now);
            }
            _ => {}
        }
    }

    /// Side effects of a committed transition. The status change is already
    /// durable, so failures here are logged rather than returned; agent
    /// release and earnings credit are both safe to re-run.
    async fn after_commit(
        &self,
        from: OrderStatus,
        order: &Order,
        actor: Option<Actor>,
        now: DateTime<Utc>,
    ) {
        self.metrics
            .status_transitions_total
            .with_label_values(&[order.status.as_str()])
            .inc();

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            from = %from,
            to = %order.status,
            "order status changed"
        );

        match (order.status, order.delivery_person_id) {
            (OrderStatus::Delivered, Some(agent_id)) => {
                self.release_agent(agent_id, order.id, true, now).await;
                if let Err(err) = self
                    .earnings
                    .record_completion(
                        agent_id,
                        order.id,
                        order.amounts.delivery_fee,
                        order.amounts.tip,
                    )
                    .await
                {
                    error!(order_id = %order.id, agent_id = %agent_id, error = %err, "failed to credit earnings");
                }
            }
            (OrderStatus::Cancelled, Some(agent_id)) if from.holds_agent() => {
                self.release_agent(agent_id, order.id, false, now).await;
            }
            (OrderStatus::Ready, _) => {
                if let Some(queue) = &self.dispatch_queue {
                    queue.offer(order.id);
                }
            }
            _ => {}
        }

        self.notifier.notify(DispatchEvent::StatusChanged {
            order_id: order.id,
            order_number: order.order_number.clone(),
            from,
            to: order.status,
            actor,
            at: now,
        });
    }

    async fn release_agent(&self, agent_id: Uuid, order_id: Uuid, completed: bool, now: DateTime<Utc>) {
        match self
            .store
            .release_agent(agent_id, order_id, completed, now)
            .await
        {
            Ok(true) => debug!(agent_id = %agent_id, order_id = %order_id, "agent released"),
            Ok(false) => debug!(agent_id = %agent_id, order_id = %order_id, "agent already released"),
            Err(err) => {
                error!(agent_id = %agent_id, order_id = %order_id, error = %err, "failed to release agent")
            }
        }
    }
}

fn check_allowed(
    order: &Order,
    new_status: OrderStatus,
    actor: Option<&Actor>,
) -> Result<(), AppError> {
    if !order.status.can_transition_to(new_status) {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: new_status,
        });
    }
    // A legal edge into `assigned` still has to go through the claim.
    if new_status == OrderStatus::Assigned {
        return Err(AppError::AssignmentRequired);
    }

    if let Some(Actor::Agent(agent_id)) = actor {
        if order.delivery_person_id != Some(*agent_id) {
            return Err(AppError::Forbidden(format!(
                "agent {agent_id} is not assigned to order {}",
                order.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::StatusTransitionEngine;
    use crate::engine::earnings::EarningsAggregator;
    use crate::engine::guard::AssignmentGuard;
    use crate::error::AppError;
    use crate::models::earnings::EarningsCalendar;
    use crate::models::order::{Actor, OrderStatus};
    use crate::notify::{BroadcastNotifier, DispatchEvent};
    use crate::observability::metrics::Metrics;
    use crate::store::{InMemoryStore, Store};
    use crate::test_support::{eligible_agent, order_in, restaurant_point};

    struct Harness {
        store: Arc<InMemoryStore>,
        notifier: Arc<BroadcastNotifier>,
        engine: StatusTransitionEngine,
        guard: AssignmentGuard,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(BroadcastNotifier::new(64));
        let metrics = Metrics::new();
        let earnings =
            EarningsAggregator::new(store.clone(), EarningsCalendar::default(), metrics.clone());
        let engine = StatusTransitionEngine::new(
            store.clone(),
            notifier.clone(),
            earnings,
            Duration::minutes(15),
            metrics.clone(),
        );
        let guard = AssignmentGuard::new(store.clone(), notifier.clone(), metrics);
        Harness {
            store,
            notifier,
            engine,
            guard,
        }
    }

    #[tokio::test]
    async fn confirming_sets_estimate_once() {
        let h = harness();
        let order = order_in(OrderStatus::Pending);
        h.store.insert_order(order.clone()).await.unwrap();

        let confirmed = h
            .engine
            .transition(order.id, OrderStatus::Confirmed, None, None)
            .await
            .unwrap();

        let eta = confirmed.estimated_delivery_time.unwrap();
        let expected = confirmed.timeline.last().unwrap().timestamp + Duration::minutes(20 + 15);
        assert_eq!(eta, expected);
        assert_eq!(confirmed.version, 1);
    }

    #[tokio::test]
    async fn skipping_to_delivered_is_rejected_and_nothing_changes() {
        let h = harness();
        let order = order_in(OrderStatus::Assigned);
        let agent_id = order.delivery_person_id.unwrap();
        h.store.insert_order(order.clone()).await.unwrap();

        let err = h
            .engine
            .transition(order.id, OrderStatus::Delivered, Some(Actor::Agent(agent_id)), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: OrderStatus::Assigned,
                to: OrderStatus::Delivered
            }
        ));
        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Assigned);
        assert_eq!(stored.timeline.len(), order.timeline.len());
        assert_eq!(stored.version, order.version);
    }

    #[tokio::test]
    async fn assigned_cannot_be_entered_directly() {
        let h = harness();
        let order = order_in(OrderStatus::Ready);
        h.store.insert_order(order.clone()).await.unwrap();

        let err = h
            .engine
            .transition(order.id, OrderStatus::Assigned, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AssignmentRequired));
    }

    #[tokio::test]
    async fn assigned_from_outside_ready_is_an_invalid_transition() {
        let h = harness();
        for from in [
            OrderStatus::Pending,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let order = order_in(from);
            h.store.insert_order(order.clone()).await.unwrap();

            let err = h
                .engine
                .transition(order.id, OrderStatus::Assigned, None, None)
                .await
                .unwrap_err();

            assert!(
                matches!(
                    err,
                    AppError::InvalidTransition {
                        from: f,
                        to: OrderStatus::Assigned
                    } if f == from
                ),
                "{from}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn other_agents_cannot_drive_the_order() {
        let h = harness();
        let order = order_in(OrderStatus::Assigned);
        h.store.insert_order(order.clone()).await.unwrap();

        let err = h
            .engine
            .transition(
                order.id,
                OrderStatus::PickedUp,
                Some(Actor::Agent(uuid::Uuid::new_v4())),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn delivery_releases_agent_and_credits_once() {
        let h = harness();
        let order = order_in(OrderStatus::Ready);
        let agent = eligible_agent(restaurant_point());
        h.store.insert_order(order.clone()).await.unwrap();
        h.store.insert_agent(agent.clone()).await.unwrap();
        let mut events = h.notifier.subscribe();

        h.guard.try_assign(order.id, agent.id, Some(0.0)).await.unwrap();
        for status in [
            OrderStatus::PickedUp,
            OrderStatus::OnTheWay,
            OrderStatus::Delivered,
        ] {
            h.engine
                .transition(order.id, status, Some(Actor::Agent(agent.id)), None)
                .await
                .unwrap();
        }

        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Delivered);
        assert!(stored.actual_delivery_time.is_some());
        assert_eq!(stored.delivery_person_id, Some(agent.id));
        assert_eq!(stored.last_timeline_status(), Some(OrderStatus::Delivered));

        let agent_after = h.store.get_agent(agent.id).await.unwrap().unwrap();
        assert!(agent_after.is_available);
        assert!(agent_after.current_order.is_none());
        assert_eq!(agent_after.delivery_history, vec![order.id]);
        assert_eq!(agent_after.earnings.total, Decimal::new(399, 2));

        let mut transitions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DispatchEvent::StatusChanged { to, .. } = event {
                transitions.push(to);
            }
        }
        assert_eq!(
            transitions,
            vec![
                OrderStatus::Assigned,
                OrderStatus::PickedUp,
                OrderStatus::OnTheWay,
                OrderStatus::Delivered
            ]
        );
    }

    #[tokio::test]
    async fn cancelling_an_assigned_order_frees_the_agent() {
        let h = harness();
        let order = order_in(OrderStatus::Ready);
        let agent = eligible_agent(restaurant_point());
        h.store.insert_order(order.clone()).await.unwrap();
        h.store.insert_agent(agent.clone()).await.unwrap();

        h.guard.try_assign(order.id, agent.id, None).await.unwrap();
        h.engine
            .transition(order.id, OrderStatus::Cancelled, None, Some("customer cancelled".into()))
            .await
            .unwrap();

        let agent_after = h.store.get_agent(agent.id).await.unwrap().unwrap();
        assert!(agent_after.is_available);
        assert!(agent_after.delivery_history.is_empty());
        assert_eq!(agent_after.earnings.total, Decimal::ZERO);

        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_person_id, Some(agent.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_commit_in_a_legal_order() {
        let h = harness();
        let order = order_in(OrderStatus::Preparing);
        h.store.insert_order(order.clone()).await.unwrap();

        let ready = {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .transition(order.id, OrderStatus::Ready, None, None)
                    .await
            })
        };
        let cancel = {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .transition(order.id, OrderStatus::Cancelled, None, None)
                    .await
            })
        };
        let _ = ready.await.unwrap();
        let _ = cancel.await.unwrap();

        let stored = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.last_timeline_status(), Some(stored.status));
        for pair in stored.timeline.windows(2) {
            assert!(pair[0].status.can_transition_to(pair[1].status));
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn claim_racing_cancel_leaves_agent_consistent() {
        for _round in 0..20 {
            let h = harness();
            let order = order_in(OrderStatus::Ready);
            let agent = eligible_agent(restaurant_point());
            h.store.insert_order(order.clone()).await.unwrap();
            h.store.insert_agent(agent.clone()).await.unwrap();

            let barrier = Arc::new(tokio::sync::Barrier::new(2));
            let claim = {
                let guard = h.guard.clone();
                let barrier = barrier.clone();
                let (order_id, agent_id) = (order.id, agent.id);
                tokio::spawn(async move {
                    barrier.wait().await;
                    guard.try_assign(order_id, agent_id, None).await
                })
            };
            let cancel = {
                let engine = h.engine.clone();
                let barrier = barrier.clone();
                let order_id = order.id;
                tokio::spawn(async move {
                    barrier.wait().await;
                    engine
                        .transition(order_id, OrderStatus::Cancelled, None, None)
                        .await
                })
            };
            claim.await.unwrap().unwrap();
            cancel.await.unwrap().unwrap();

            let stored = h.store.get_order(order.id).await.unwrap().unwrap();
            assert_eq!(stored.status, OrderStatus::Cancelled);
            assert_eq!(stored.last_timeline_status(), Some(stored.status));
            for pair in stored.timeline.windows(2) {
                assert!(pair[0].status.can_transition_to(pair[1].status));
            }

            let agent_after = h.store.get_agent(agent.id).await.unwrap().unwrap();
            assert_eq!(
                agent_after.is_available,
                stored.status != OrderStatus::Assigned
            );
            assert!(agent_after.current_order.is_none());
            assert!(agent_after.delivery_history.is_empty());
        }
    }

    fn any_status() -> impl Strategy<Value = OrderStatus> {
        prop::sample::select(OrderStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn random_attempts_only_follow_the_table(
            start in any_status(),
            attempts in prop::collection::vec(any_status(), 1..12),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let h = harness();
                let order = order_in(start);
                h.store.insert_order(order.clone()).await.unwrap();

                for target in attempts {
                    let before = h.store.get_order(order.id).await.unwrap().unwrap();
                    let result = h.engine.transition(order.id, target, None, None).await;
                    let after = h.store.get_order(order.id).await.unwrap().unwrap();

                    match result {
                        Ok(updated) => {
                            prop_assert!(before.status.can_transition_to(target));
                            prop_assert_ne!(target, OrderStatus::Assigned);
                            prop_assert_eq!(updated.status, target);
                            prop_assert_eq!(after.timeline.len(), before.timeline.len() + 1);
                        }
                        Err(_) => {
                            prop_assert_eq!(after.status, before.status);
                            prop_assert_eq!(after.timeline.len(), before.timeline.len());
                        }
                    }
                    prop_assert_eq!(after.last_timeline_status(), Some(after.status));
                }
                Ok(())
            })?;
        }
    }
}
