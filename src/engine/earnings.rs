use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::earnings::{
    Earnings, EarningsBucket, EarningsCalendar, EarningsPeriod, EarningsSummary,
};
use crate::models::order::Order;
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Clone)]
pub struct EarningsAggregator {
    store: Arc<dyn Store>,
    calendar: EarningsCalendar,
    metrics: Metrics,
}

impl EarningsAggregator {
    pub fn new(store: Arc<dyn Store>, calendar: EarningsCalendar, metrics: Metrics) -> Self {
        Self {
            store,
            calendar,
            metrics,
        }
    }

    /// Credits one completed delivery. Replays for the same order are
    /// ignored; returns whether this call applied the credit.
    pub async fn record_completion(
        &self,
        agent_id: Uuid,
        order_id: Uuid,
        delivery_fee: Decimal,
        tip: Decimal,
    ) -> Result<bool, AppError> {
        self.record_completion_at(agent_id, order_id, delivery_fee, tip, Utc::now())
            .await
    }

    pub async fn record_completion_at(
        &self,
        agent_id: Uuid,
        order_id: Uuid,
        delivery_fee: Decimal,
        tip: Decimal,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let amount = delivery_fee + tip;
        let applied = self
            .store
            .credit_earnings(agent_id, order_id, amount, at, &self.calendar)
            .await?;

        if applied {
            self.metrics
                .earnings_recorded_total
                .with_label_values(&["applied"])
                .inc();
            info!(agent_id = %agent_id, order_id = %order_id, amount = %amount, "earnings credited");
        } else {
            self.metrics
                .earnings_recorded_total
                .with_label_values(&["duplicate"])
                .inc();
            debug!(agent_id = %agent_id, order_id = %order_id, "completion already credited");
        }

        Ok(applied)
    }

    /// Running totals as they read now, with elapsed windows zeroed.
    pub async fn current_totals(&self, agent_id: Uuid) -> Result<Earnings, AppError> {
        let agent = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("agent {agent_id} not found")))?;

        Ok(self.calendar.rolled_over(&agent.earnings, Utc::now()))
    }

    pub async fn summarize(
        &self,
        agent_id: Uuid,
        period: EarningsPeriod,
    ) -> Result<EarningsSummary, AppError> {
        self.summarize_at(agent_id, period, Utc::now()).await
    }

    /// Recomputes the period from delivered orders. Never touches the
    /// cached totals.
    pub async fn summarize_at(
        &self,
        agent_id: Uuid,
        period: EarningsPeriod,
        now: DateTime<Utc>,
    ) -> Result<EarningsSummary, AppError> {
        if self.store.get_agent(agent_id).await?.is_none() {
            return Err(AppError::NotFound(format!("agent {agent_id} not found")));
        }

        let orders = self.store.delivered_orders_for_agent(agent_id).await?;
        Ok(summarize_orders(
            &self.calendar,
            agent_id,
            period,
            now,
            &orders,
        ))
    }
}

fn completed_at(order: &Order) -> DateTime<Utc> {
    order.actual_delivery_time.unwrap_or(order.updated_at)
}

pub fn summarize_orders(
    calendar: &EarningsCalendar,
    agent_id: Uuid,
    period: EarningsPeriod,
    now: DateTime<Utc>,
    orders: &[Order],
) -> EarningsSummary {
    let from = calendar.period_start(period, now);
    let mut buckets: BTreeMap<DateTime<Utc>, (Decimal, u64)> = BTreeMap::new();

    for order in orders {
        let at = completed_at(order);
        let in_window = from.is_none_or(|start| at >= start) && at <= now;
        if !in_window {
            continue;
        }

        let bucket = buckets
            .entry(calendar.bucket_start(period, at))
            .or_insert((Decimal::ZERO, 0));
        bucket.0 += order.amounts.agent_payout();
        bucket.1 += 1;
    }

    let total_earnings: Decimal = buckets.values().map(|(earnings, _)| *earnings).sum();
    let order_count: u64 = buckets.values().map(|(_, orders)| *orders).sum();
    let average_per_order = if order_count == 0 {
        Decimal::ZERO
    } else {
        (total_earnings / Decimal::from(order_count)).round_dp(2)
    };

    EarningsSummary {
        agent_id,
        period,
        from,
        to: now,
        total_earnings,
        order_count,
        average_per_order,
        breakdown: buckets
            .into_iter()
            .map(|(start, (earnings, orders))| EarningsBucket {
                start,
                earnings,
                orders,
            })
            .collect(),
    }
}
