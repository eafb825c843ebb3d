use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{NaiveTime, Utc};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl, scoped_futures::ScopedFutureExt};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    gateway::{PaymentLink, PaymentLinkRequest},
    ledger, lifecycle,
    middleware::customer_identity,
    models::{
        CreateDeliveryMealEntity, CreateOrderDeliveryEntity, CreateOrderEntity,
        CreateOrderItemEntity, DeliveryMealEntity, OrderDeliveryEntity, OrderEntity,
        OrderItemEntity, PaymentOrderEntity,
    },
    pricing,
    scheduling::{self, SelectedMeal},
    schema::{delivery_meals, order_deliveries, order_items, orders, payment_orders},
};

/// Customer-facing order routes. Identity arrives from the upstream proxy via
/// the `x-customer-id` header.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_order, list_orders))
            .routes(utoipa_axum::routes!(get_order, cancel_order))
            .routes(utoipa_axum::routes!(start_payment))
            .route_layer(axum::middleware::from_fn(customer_identity)),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderReq {
    pub package_id: i32,
    pub package_name: String,
    /// Selection order is preserved through scheduling.
    pub meals: Vec<SelectedMeal>,
    pub delivery_address: Value,
    pub personal_note: Option<String>,
    pub discount_code_id: Option<i32>,
}

#[derive(serde::Serialize, ToSchema)]
pub struct OrderDetailRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
    pub deliveries: Vec<DeliveryRes>,
    pub payments: Vec<PaymentOrderEntity>,
}

#[derive(serde::Serialize, ToSchema)]
pub struct DeliveryRes {
    pub delivery: OrderDeliveryEntity,
    pub meals: Vec<DeliveryMealEntity>,
}

/// Checkout: prices the package, expands the delivery calendar and persists
/// the whole aggregate in one transaction.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Orders"],
    responses(
        (status = 200, description = "Order created", body = StdResponse<OrderDetailRes, String>)
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
    axum::Json(req): axum::Json<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let meal_count: i64 = req.meals.iter().map(|m| i64::from(m.quantity.max(0))).sum();
    if meal_count == 0 {
        return Err(AppError::BadRequest("order contains no meals".into()));
    }

    let today = Utc::now().date_naive();
    let plan = scheduling::schedule(&req.package_name, &req.meals, today);
    if plan.is_empty() {
        return Err(AppError::BadRequest(
            "package expands to no deliveries".into(),
        ));
    }

    let pricing_cfg = &state.config.pricing;
    let total_cents = pricing::price_cents(
        meal_count,
        plan.len() as i64,
        pricing_cfg.meal_unit_cents,
        pricing_cfg.delivery_unit_cents,
        pricing_cfg.margin_fraction,
    );
    let currency = pricing_cfg.currency.clone();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let detail = conn
        .transaction(move |conn| {
            async move {
                let order = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        customer_id,
                        package_id: req.package_id,
                        package_name: req.package_name.clone(),
                        package_meal_count: meal_count as i32,
                        total_cents,
                        currency,
                        delivery_address: req.delivery_address.clone(),
                        personal_note: req.personal_note.clone(),
                        discount_code_id: req.discount_code_id,
                        status: lifecycle::OrderStatus::Pending.as_str().to_string(),
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to insert order")?;

                let item_rows: Vec<CreateOrderItemEntity> = req
                    .meals
                    .iter()
                    .enumerate()
                    .map(|(position, meal)| CreateOrderItemEntity {
                        order_id: order.id,
                        position: position as i32,
                        meal_id: meal.meal_id,
                        quantity: meal.quantity,
                    })
                    .collect();
                let items = diesel::insert_into(order_items::table)
                    .values(item_rows)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to insert order items")?;

                let mut deliveries = Vec::with_capacity(plan.len());
                for planned in &plan {
                    let delivery = diesel::insert_into(order_deliveries::table)
                        .values(CreateOrderDeliveryEntity {
                            order_id: order.id,
                            scheduled_at: planned.date.and_time(NaiveTime::MIN).and_utc(),
                            status: lifecycle::DeliveryStatus::Pending.as_str().to_string(),
                        })
                        .returning(OrderDeliveryEntity::as_returning())
                        .get_result(conn)
                        .await
                        .context("Failed to insert delivery")?;

                    let meal_rows: Vec<CreateDeliveryMealEntity> = planned
                        .meal_ids
                        .iter()
                        .map(|meal_id| CreateDeliveryMealEntity {
                            delivery_id: delivery.id,
                            meal_id: *meal_id,
                            status: lifecycle::MealStatus::Pending.as_str().to_string(),
                        })
                        .collect();
                    let meals = diesel::insert_into(delivery_meals::table)
                        .values(meal_rows)
                        .returning(DeliveryMealEntity::as_returning())
                        .get_results(conn)
                        .await
                        .context("Failed to insert delivery meals")?;

                    deliveries.push(DeliveryRes { delivery, meals });
                }

                Ok::<OrderDetailRes, AppError>(OrderDetailRes {
                    order,
                    items,
                    deliveries,
                    payments: vec![],
                })
            }
            .scope_boxed()
        })
        .await?;

    Ok(StdResponse {
        data: Some(detail),
        message: Some("Order created successfully"),
    })
}

/// Lists the caller's orders, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    responses(
        (status = 200, description = "Orders for the current customer", body = StdResponse<Vec<OrderEntity>, String>)
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let entries: Vec<OrderEntity> = orders::table
        .filter(orders::customer_id.eq(customer_id))
        .order(orders::created_at.desc())
        .select(OrderEntity::as_select())
        .get_results(conn)
        .await?;

    Ok(StdResponse {
        data: Some(entries),
        message: None::<&str>,
    })
}

/// Fetches one order with its items, deliveries, meals and payment attempts.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order detail", body = StdResponse<OrderDetailRes, String>),
        (status = 404, description = "Order does not exist")
    )
)]
pub async fn get_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let order = owned_order(conn, id, customer_id).await?;

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .order(order_items::position.asc())
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await?;

    let delivery_rows: Vec<OrderDeliveryEntity> = order_deliveries::table
        .filter(order_deliveries::order_id.eq(order.id))
        .order(order_deliveries::scheduled_at.asc())
        .select(OrderDeliveryEntity::as_select())
        .get_results(conn)
        .await?;

    let delivery_ids: Vec<Uuid> = delivery_rows.iter().map(|d| d.id).collect();
    let meal_rows: Vec<DeliveryMealEntity> = delivery_meals::table
        .filter(delivery_meals::delivery_id.eq_any(delivery_ids))
        .select(DeliveryMealEntity::as_select())
        .get_results(conn)
        .await?;

    let deliveries = delivery_rows
        .into_iter()
        .map(|delivery| {
            let meals = meal_rows
                .iter()
                .filter(|m| m.delivery_id == delivery.id)
                .cloned()
                .collect();
            DeliveryRes { delivery, meals }
        })
        .collect();

    let payments: Vec<PaymentOrderEntity> = payment_orders::table
        .filter(payment_orders::order_id.eq(order.id))
        .order(payment_orders::created_at.desc())
        .select(PaymentOrderEntity::as_select())
        .get_results(conn)
        .await?;

    Ok(StdResponse {
        data: Some(OrderDetailRes {
            order,
            items,
            deliveries,
            payments,
        }),
        message: None::<&str>,
    })
}

/// Cancels a pending order whose fulfilment has not started.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Orders"],
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order cancelled", body = StdResponse<OrderEntity, String>),
        (status = 409, description = "Fulfilment already started")
    )
)]
pub async fn cancel_order(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    owned_order(conn, id, customer_id).await?;
    let cancelled = ledger::cancel_order(conn, id).await?;

    Ok(StdResponse {
        data: Some(cancelled),
        message: Some("Order cancelled successfully"),
    })
}

#[derive(serde::Serialize, ToSchema)]
pub struct StartPaymentRes {
    pub payment: PaymentOrderEntity,
    pub link: PaymentLink,
}

/// Opens a payment attempt for the order and creates a hosted payment link at
/// the gateway. A gateway failure leaves the attempt in `failed` so the
/// history shows what was tried.
#[utoipa::path(
    post,
    path = "/{id}/payment",
    tags = ["Orders"],
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Payment link created", body = StdResponse<StartPaymentRes, String>),
        (status = 404, description = "Order does not exist")
    )
)]
pub async fn start_payment(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let order = owned_order(conn, id, customer_id).await?;
    let description = format!(
        "{} ({} meals)",
        order.package_name, order.package_meal_count
    );

    let payment = ledger::create_payment_order(
        conn,
        order.id,
        "payment_link",
        order.total_cents,
        &order.currency,
        &description,
    )
    .await?;

    let link_request = PaymentLinkRequest {
        reference: payment.id.to_string(),
        concept: order.package_name.clone(),
        amount: payment.amount_cents,
        currency: payment.currency.clone(),
        description,
        url_success: format!("/orders/{}/payment-success", order.id),
        url_failed: format!("/orders/{}/payment-failed", order.id),
        client: None,
    };

    let link = match state.gateway.create_payment_link(&link_request).await {
        Ok(link) => link,
        Err(e) => {
            ledger::mark_failed(conn, payment.id, &e.to_string()).await?;
            return Err(e.into());
        }
    };

    let payment: PaymentOrderEntity = diesel::update(payment_orders::table.find(payment.id))
        .set((
            payment_orders::gateway_ref.eq(&link.id),
            payment_orders::short_url.eq(&link.short_url),
        ))
        .returning(PaymentOrderEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(StartPaymentRes { payment, link }),
        message: Some("Payment link created"),
    })
}

/// Loads an order and enforces that the caller owns it.
async fn owned_order(
    conn: &mut diesel_async::AsyncPgConnection,
    order_id: Uuid,
    customer_id: i32,
) -> Result<OrderEntity, AppError> {
    let order: OrderEntity = orders::table.find(order_id).get_result(conn).await?;
    if order.customer_id != customer_id {
        return Err(AppError::ForbiddenResource(
            "order belongs to another customer".into(),
        ));
    }
    Ok(order)
}
