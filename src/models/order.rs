use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Assigned,
    PickedUp,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::OnTheWay,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// The lifecycle graph. Every non-terminal status may also be cancelled.
    pub fn next_statuses(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[Assigned, Cancelled],
            Assigned => &[PickedUp, Cancelled],
            PickedUp => &[OnTheWay, Cancelled],
            OnTheWay => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.next_statuses().is_empty()
    }

    /// Statuses from which an agent may claim the order.
    pub fn is_assignable(self) -> bool {
        self.can_transition_to(OrderStatus::Assigned)
    }

    /// Statuses during which an agent is bound to the order.
    pub fn holds_agent(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::OnTheWay
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Wallet,
}

/// Who caused a status change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer(Uuid),
    Restaurant(Uuid),
    Agent(Uuid),
    Admin(Uuid),
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
    pub actor: Option<Actor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub meal_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    /// `None` when the product does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAmounts {
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub tax: Decimal,
    pub tip: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl OrderAmounts {
    /// `total` is always derived here and never accepted from callers.
    /// Returns `None` if any intermediate amount overflows.
    pub fn compute(
        items: &[OrderItem],
        delivery_fee: Decimal,
        tax_rate: Decimal,
        tip: Decimal,
        discount: Decimal,
    ) -> Option<Self> {
        let subtotal = items.iter().try_fold(Decimal::ZERO, |sum, item| {
            sum.checked_add(item.line_total()?)
        })?;
        let tax = subtotal.checked_mul(tax_rate)?.round_dp(2);
        let total = subtotal
            .checked_add(delivery_fee)?
            .checked_add(tax)?
            .checked_add(tip)?
            .checked_sub(discount)?;

        Some(Self {
            subtotal,
            delivery_fee,
            tax,
            tip,
            discount,
            total,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.delivery_fee + self.tax + self.tip - self.discount
    }

    /// What a delivery pays the agent.
    pub fn agent_payout(&self) -> Decimal {
        self.delivery_fee + self.tip
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub instructions: Option<String>,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
    pub restaurant_location: GeoPoint,
    pub delivery_person_id: Option<Uuid>,
    pub items: Vec<OrderItem>,
    pub amounts: OrderAmounts,
    pub commission_rate: Decimal,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub delivery_address: DeliveryAddress,
    pub special_instructions: Option<String>,
    pub preparation_time_minutes: u32,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub timeline: Vec<TimelineEntry>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Appends a status change. Timestamps never go backwards even if the
    /// wall clock does, so the timeline stays ordered by commit.
    pub(crate) fn push_status(
        &mut self,
        status: OrderStatus,
        actor: Option<Actor>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        let timestamp = match self.timeline.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        self.status = status;
        self.timeline.push(TimelineEntry {
            status,
            timestamp,
            note,
            actor,
        });
        self.updated_at = timestamp;
    }

    pub fn last_timeline_status(&self) -> Option<OrderStatus> {
        self.timeline.last().map(|entry| entry.status)
    }

    /// Restaurant's share after the platform commission, ignoring fees and tips.
    #[cfg(test)]
    pub(crate) fn restaurant_payout(&self) -> Decimal {
        (self.amounts.subtotal * (Decimal::ONE - self.commission_rate)).round_dp(2)
    }
}

pub fn format_order_number(date: NaiveDate, sequence: u64) -> String {
    format!("ORD-{}-{:06}", date.format("%Y%m%d"), sequence)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;

    fn item(price_cents: i64, quantity: u32) -> OrderItem {
        OrderItem {
            meal_id: Uuid::new_v4(),
            name: "Falafel wrap".to_string(),
            price: Decimal::new(price_cents, 2),
            quantity,
        }
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::OnTheWay.is_terminal());
    }

    #[test]
    fn every_live_status_can_be_cancelled() {
        for status in OrderStatus::ALL {
            if !status.is_terminal() {
                assert!(status.can_transition_to(OrderStatus::Cancelled), "{status}");
            }
        }
    }

    #[test]
    fn only_ready_is_assignable() {
        let assignable: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|status| status.is_assignable())
            .collect();
        assert_eq!(assignable, vec![OrderStatus::Ready]);
    }

    #[test]
    fn amounts_total_is_derived() {
        let items = vec![item(1250, 2), item(399, 1)];
        let amounts = OrderAmounts::compute(
            &items,
            Decimal::new(299, 2),
            Decimal::new(10, 2),
            Decimal::new(200, 2),
            Decimal::new(500, 2),
        )
        .unwrap();

        assert_eq!(amounts.subtotal, Decimal::new(2899, 2));
        assert_eq!(amounts.tax, Decimal::new(290, 2));
        assert_eq!(amounts.total, Decimal::new(3188, 2));
        assert!(amounts.is_consistent());
        assert_eq!(amounts.agent_payout(), Decimal::new(499, 2));
    }

    #[test]
    fn overflowing_amounts_are_refused() {
        let huge = OrderItem {
            price: Decimal::MAX,
            ..item(100, 1)
        };
        let doubled = OrderItem {
            quantity: 2,
            ..huge.clone()
        };

        assert!(doubled.line_total().is_none());
        assert!(
            OrderAmounts::compute(
                &[huge],
                Decimal::new(299, 2),
                Decimal::ZERO,
                Decimal::ZERO,
                Decimal::ZERO
            )
            .is_none()
        );
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::OnTheWay).unwrap();
        assert_eq!(json, "\"on_the_way\"");
        assert_eq!(OrderStatus::PickedUp.to_string(), "picked_up");
    }

    #[test]
    fn order_number_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(format_order_number(date, 42), "ORD-20261016-000042");
    }

    #[test]
    fn timeline_never_goes_backwards() {
        let now = Utc::now();
        let mut order = crate::test_support::order_in(OrderStatus::Pending);
        order.push_status(OrderStatus::Confirmed, None, None, now);
        order.push_status(OrderStatus::Preparing, None, None, now - Duration::seconds(30));

        let stamps: Vec<_> = order.timeline.iter().map(|entry| entry.timestamp).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(order.last_timeline_status(), Some(order.status));
    }
}
