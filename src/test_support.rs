use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::agent::{AgentLocation, DeliveryAgent, GeoPoint, VehicleType, VerificationStatus};
use crate::models::order::{
    DeliveryAddress, Order, OrderAmounts, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
};

const HAPPY_PATH: [OrderStatus; 8] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::Assigned,
    OrderStatus::PickedUp,
    OrderStatus::OnTheWay,
    OrderStatus::Delivered,
];

pub(crate) fn restaurant_point() -> GeoPoint {
    GeoPoint {
        lat: 52.5200,
        lng: 13.4050,
    }
}

/// An order whose timeline walks the lifecycle up to `status`. Orders past
/// `ready` carry a random agent id.
pub(crate) fn order_in(status: OrderStatus) -> Order {
    let now = Utc::now();
    let items = vec![OrderItem {
        meal_id: Uuid::new_v4(),
        name: "Margherita".to_string(),
        price: Decimal::new(950, 2),
        quantity: 2,
    }];
    let amounts = OrderAmounts::compute(
        &items,
        Decimal::new(299, 2),
        Decimal::ZERO,
        Decimal::new(100, 2),
        Decimal::ZERO,
    )
    .expect("fixture amounts fit in a decimal");

    let mut order = Order {
        id: Uuid::new_v4(),
        order_number: format!("ORD-TEST-{}", Uuid::new_v4().simple()),
        customer_id: Uuid::new_v4(),
        restaurant_id: Uuid::new_v4(),
        restaurant_location: restaurant_point(),
        delivery_person_id: None,
        items,
        amounts,
        commission_rate: Decimal::new(15, 2),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: PaymentMethod::Card,
        delivery_address: DeliveryAddress {
            street: "Invalidenstrasse 1".to_string(),
            city: "Berlin".to_string(),
            postal_code: Some("10115".to_string()),
            instructions: None,
            location: GeoPoint {
                lat: 52.5310,
                lng: 13.3840,
            },
        },
        special_instructions: None,
        preparation_time_minutes: 20,
        estimated_delivery_time: None,
        actual_delivery_time: None,
        timeline: Vec::new(),
        version: 0,
        created_at: now,
        updated_at: now,
    };

    let path: Vec<OrderStatus> = if status == OrderStatus::Cancelled {
        vec![OrderStatus::Pending, OrderStatus::Cancelled]
    } else {
        HAPPY_PATH
            .iter()
            .copied()
            .take_while(|step| *step != status)
            .chain(std::iter::once(status))
            .collect()
    };

    for step in path {
        if step == OrderStatus::Assigned {
            order.delivery_person_id = Some(Uuid::new_v4());
        }
        if step == OrderStatus::Delivered {
            order.actual_delivery_time = Some(now);
        }
        order.push_status(step, None, None, now);
    }
    order
}

pub(crate) fn eligible_agent(point: GeoPoint) -> DeliveryAgent {
    let now = Utc::now();
    let mut agent = DeliveryAgent::register(
        "Test Rider".to_string(),
        "+490000000".to_string(),
        VehicleType::Bicycle,
        now,
    );
    agent.verification_status = VerificationStatus::Verified;
    agent.is_online = true;
    agent.current_location = Some(AgentLocation {
        point,
        last_updated: now,
    });
    agent
}
