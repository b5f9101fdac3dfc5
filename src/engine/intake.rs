use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::config::PricingSettings;
use crate::error::AppError;
use crate::models::order::{
    format_order_number, Actor, DeliveryAddress, Order, OrderAmounts, OrderItem, OrderStatus,
    PaymentMethod, PaymentStatus,
};
use crate::restaurants::RestaurantDirectory;
use crate::store::Store;

const MAX_ITEM_QUANTITY: u32 = 99;

/// Already-validated checkout handed over by the cart flow.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
    pub items: Vec<OrderItem>,
    pub delivery_address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub tip: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub special_instructions: Option<String>,
}

#[derive(Clone)]
pub struct OrderIntake {
    store: Arc<dyn Store>,
    restaurants: Arc<dyn RestaurantDirectory>,
    pricing: PricingSettings,
}

impl OrderIntake {
    pub fn new(
        store: Arc<dyn Store>,
        restaurants: Arc<dyn RestaurantDirectory>,
        pricing: PricingSettings,
    ) -> Self {
        Self {
            store,
            restaurants,
            pricing,
        }
    }

    pub async fn place_order(&self, request: NewOrder) -> Result<Order, AppError> {
        validate(&request)?;

        let restaurant = self
            .restaurants
            .get_profile(request.restaurant_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("restaurant {} not found", request.restaurant_id))
            })?;
        if !restaurant.accepting_orders {
            return Err(AppError::Conflict(format!(
                "restaurant {} is not accepting orders",
                restaurant.id
            )));
        }

        let amounts = OrderAmounts::compute(
            &request.items,
            self.pricing.delivery_fee,
            self.pricing.tax_rate,
            request.tip,
            request.discount,
        )
        .ok_or_else(|| AppError::BadRequest("order amounts are out of range".to_string()))?;
        if amounts.total < Decimal::ZERO {
            return Err(AppError::BadRequest(
                "discount exceeds order value".to_string(),
            ));
        }

        let now = Utc::now();
        let sequence = self.store.next_order_sequence().await?;
        let mut order = Order {
            id: Uuid::new_v4(),
            order_number: format_order_number(now.date_naive(), sequence),
            customer_id: request.customer_id,
            restaurant_id: restaurant.id,
            restaurant_location: restaurant.location,
            delivery_person_id: None,
            items: request.items,
            amounts,
            commission_rate: restaurant.commission_rate,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            delivery_address: request.delivery_address,
            special_instructions: request.special_instructions,
            preparation_time_minutes: restaurant.preparation_time_minutes,
            estimated_delivery_time: None,
            actual_delivery_time: None,
            timeline: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        order.push_status(
            OrderStatus::Pending,
            Some(Actor::Customer(request.customer_id)),
            Some("order placed".to_string()),
            now,
        );

        self.store.insert_order(order.clone()).await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            restaurant_id = %order.restaurant_id,
            total = %order.amounts.total,
            "order placed"
        );

        Ok(order)
    }
}

fn validate(request: &NewOrder) -> Result<(), AppError> {
    if request.items.is_empty() {
        return Err(AppError::BadRequest("order has no items".to_string()));
    }

    for item in &request.items {
        if item.name.trim().is_empty() {
            return Err(AppError::BadRequest("item name cannot be empty".to_string()));
        }
        if item.price < Decimal::ZERO {
            return Err(AppError::BadRequest(format!(
                "price of {} must be non-negative",
                item.name
            )));
        }
        if item.quantity == 0 || item.quantity > MAX_ITEM_QUANTITY {
            return Err(AppError::BadRequest(format!(
                "quantity of {} must be between 1 and {MAX_ITEM_QUANTITY}",
                item.name
            )));
        }
    }

    if request.tip < Decimal::ZERO || request.discount < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "tip and discount must be non-negative".to_string(),
        ));
    }

    if !request.delivery_address.location.is_valid() {
        return Err(AppError::BadRequest(
            "delivery address coordinates are out of range".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{NewOrder, OrderIntake};
    use crate::config::PricingSettings;
    use crate::error::AppError;
    use crate::models::agent::GeoPoint;
    use crate::models::order::{DeliveryAddress, OrderItem, OrderStatus, PaymentMethod};
    use crate::models::restaurant::RestaurantProfile;
    use crate::restaurants::InMemoryRestaurantDirectory;
    use crate::store::{InMemoryStore, Store};
    use crate::test_support::restaurant_point;

    fn setup(accepting: bool) -> (Arc<InMemoryStore>, OrderIntake, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(InMemoryRestaurantDirectory::new());
        let restaurant_id = Uuid::new_v4();
        directory.upsert(RestaurantProfile {
            id: restaurant_id,
            name: "Trattoria".to_string(),
            location: restaurant_point(),
            preparation_time_minutes: 25,
            commission_rate: Decimal::new(20, 2),
            accepting_orders: accepting,
        });
        let intake = OrderIntake::new(
            store.clone(),
            directory,
            PricingSettings {
                delivery_fee: Decimal::new(299, 2),
                tax_rate: Decimal::new(5, 2),
                delivery_buffer: Duration::minutes(15),
            },
        );
        (store, intake, restaurant_id)
    }

    fn request(restaurant_id: Uuid, quantity: u32) -> NewOrder {
        NewOrder {
            customer_id: Uuid::new_v4(),
            restaurant_id,
            items: vec![OrderItem {
                meal_id: Uuid::new_v4(),
                name: "Lasagne".to_string(),
                price: Decimal::new(1200, 2),
                quantity,
            }],
            delivery_address: DeliveryAddress {
                street: "Torstrasse 10".to_string(),
                city: "Berlin".to_string(),
                postal_code: None,
                instructions: None,
                location: GeoPoint {
                    lat: 52.529,
                    lng: 13.401,
                },
            },
            payment_method: PaymentMethod::Cash,
            tip: Decimal::ONE,
            discount: Decimal::ZERO,
            special_instructions: None,
        }
    }

    #[tokio::test]
    async fn placed_order_is_pending_with_snapshots() {
        let (store, intake, restaurant_id) = setup(true);

        let order = intake.place_order(request(restaurant_id, 2)).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.timeline.len(), 1);
        assert_eq!(order.preparation_time_minutes, 25);
        assert_eq!(order.commission_rate, Decimal::new(20, 2));
        assert_eq!(order.amounts.subtotal, Decimal::new(2400, 2));
        assert_eq!(order.amounts.tax, Decimal::new(120, 2));
        assert_eq!(order.amounts.total, Decimal::new(2919, 2));
        assert!(order.amounts.is_consistent());
        assert_eq!(order.restaurant_payout(), Decimal::new(1920, 2));
        assert!(order.order_number.starts_with("ORD-"));
        assert!(store.get_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let (_store, intake, restaurant_id) = setup(true);
        let first = intake.place_order(request(restaurant_id, 1)).await.unwrap();
        let second = intake.place_order(request(restaurant_id, 1)).await.unwrap();
        assert_ne!(first.order_number, second.order_number);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let (_store, intake, restaurant_id) = setup(true);
        let err = intake
            .place_order(request(restaurant_id, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn oversized_price_is_rejected_not_panicking() {
        let (store, intake, restaurant_id) = setup(true);
        let mut oversized = request(restaurant_id, 2);
        oversized.items[0].price = serde_json::from_str("5e28").unwrap();

        let err = intake.place_order(oversized).await.unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(store.list_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_restaurant_rejects_orders() {
        let (_store, intake, restaurant_id) = setup(false);
        let err = intake
            .place_order(request(restaurant_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_restaurant_is_not_found() {
        let (_store, intake, _restaurant_id) = setup(true);
        let err = intake
            .place_order(request(Uuid::new_v4(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
