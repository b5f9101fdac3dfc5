//! Persistence seam for orders and delivery agents.
//!
//! Every mutating method is a single conditional write: the implementation
//! checks its precondition and applies the change as one indivisible step
//! (a row-level conditional `UPDATE`, a transaction, or an entry lock for
//! the in-memory backend). Callers never read, decide, then write.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::{DeliveryAgent, GeoPoint, VerificationStatus};
use crate::models::assignment::{Assignment, ClaimOutcome};
use crate::models::earnings::EarningsCalendar;
use crate::models::order::{Order, OrderStatus, TimelineEntry};

pub use memory::InMemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Monotonic, never reused. Feeds order numbers.
    async fn next_order_sequence(&self) -> Result<u64, AppError>;

    async fn insert_order(&self, order: Order) -> Result<(), AppError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError>;

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, AppError>;

    /// Replaces the stored order iff its version is still `expected_version`.
    /// The replacement is written with `expected_version + 1`.
    async fn compare_and_swap_order(
        &self,
        order: Order,
        expected_version: u64,
    ) -> Result<bool, AppError>;

    async fn delivered_orders_for_agent(&self, agent_id: Uuid) -> Result<Vec<Order>, AppError>;

    async fn insert_agent(&self, agent: DeliveryAgent) -> Result<(), AppError>;

    async fn get_agent(&self, id: Uuid) -> Result<Option<DeliveryAgent>, AppError>;

    async fn list_agents(&self) -> Result<Vec<DeliveryAgent>, AppError>;

    async fn update_agent_location(
        &self,
        id: Uuid,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<DeliveryAgent, AppError>;

    /// Revoking verification also takes the agent offline.
    async fn set_agent_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> Result<DeliveryAgent, AppError>;

    /// Going online requires verification; going offline requires no active order.
    async fn set_agent_online(
        &self,
        id: Uuid,
        online: bool,
        at: DateTime<Utc>,
    ) -> Result<DeliveryAgent, AppError>;

    /// Atomically binds `agent_id` to `order_id`:
    /// the order must be assignable with no agent, the agent must be
    /// dispatch eligible. On success the order moves to `assigned` with
    /// `entry` appended. Any failed precondition leaves both records untouched.
    async fn claim_order(
        &self,
        order_id: Uuid,
        agent_id: Uuid,
        entry: TimelineEntry,
    ) -> Result<ClaimOutcome, AppError>;

    /// Frees the agent iff it still holds `order_id`. Returns whether it did.
    async fn release_agent(
        &self,
        agent_id: Uuid,
        order_id: Uuid,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Adds `amount` to the agent's running totals unless `order_id` was
    /// already credited. Returns whether the credit was applied.
    async fn credit_earnings(
        &self,
        agent_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
        at: DateTime<Utc>,
        calendar: &EarningsCalendar,
    ) -> Result<bool, AppError>;

    async fn record_assignment(&self, assignment: Assignment) -> Result<(), AppError>;

    async fn list_assignments(&self) -> Result<Vec<Assignment>, AppError>;
}
