use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: Uuid,
    pub customer_id: i32,
    pub package_id: i32,
    pub package_name: String,
    pub package_meal_count: i32,
    /// Fixed at creation time, never recomputed from live prices.
    pub total_cents: i64,
    pub currency: String,
    pub delivery_address: Value,
    pub personal_note: Option<String>,
    pub discount_code_id: Option<i32>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub customer_id: i32,
    pub package_id: i32,
    pub package_name: String,
    pub package_meal_count: i32,
    pub total_cents: i64,
    pub currency: String,
    pub delivery_address: Value,
    pub personal_note: Option<String>,
    pub discount_code_id: Option<i32>,
    pub status: String,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub order_id: Uuid,
    pub position: i32,
    pub meal_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: Uuid,
    pub position: i32,
    pub meal_id: i32,
    pub quantity: i32,
}

// Payment orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payment_orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentOrderEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub gateway_ref: Option<String>,
    pub short_url: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Serialize, Deserialize, Debug)]
#[diesel(table_name = crate::schema::payment_orders)]
pub struct CreatePaymentOrderEntity {
    pub order_id: Uuid,
    pub method: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub status: String,
}

// Deliveries

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderDeliveryEntity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_deliveries)]
pub struct CreateOrderDeliveryEntity {
    pub order_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::delivery_meals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeliveryMealEntity {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub meal_id: i32,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::delivery_meals)]
pub struct CreateDeliveryMealEntity {
    pub delivery_id: Uuid,
    pub meal_id: i32,
    pub status: String,
}
