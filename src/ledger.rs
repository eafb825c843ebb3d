//! Payment order and order lifecycle bookkeeping.
//!
//! Every mutation is a conditional update on the current status, so redundant
//! or concurrent invocations (gateway webhooks are delivered at least once)
//! settle on the same row state without lost updates.

use anyhow::anyhow;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl, scoped_futures::ScopedFutureExt};
use uuid::Uuid;

use crate::{
    aliases::DieselError,
    app_error::AppError,
    lifecycle::{self, DeliveryStatus, MealStatus, OrderStatus, PaymentStatus},
    models::{CreatePaymentOrderEntity, OrderEntity, PaymentOrderEntity},
    schema::{delivery_meals, order_deliveries, orders, payment_orders},
};

/// Creates a payment attempt in `pending` for an existing order.
pub async fn create_payment_order(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
    method: &str,
    amount_cents: i64,
    currency: &str,
    description: &str,
) -> Result<PaymentOrderEntity, AppError> {
    // The owning order must exist; attempts are never orphaned.
    let _: OrderEntity = orders::table.find(order_id).get_result(conn).await?;

    let payment = diesel::insert_into(payment_orders::table)
        .values(CreatePaymentOrderEntity {
            order_id,
            method: method.to_string(),
            amount_cents,
            currency: currency.to_string(),
            description: description.to_string(),
            status: PaymentStatus::Pending.as_str().to_string(),
        })
        .returning(PaymentOrderEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|e| AppError::Other(anyhow!(e).context("Failed to create payment order")))?;

    Ok(payment)
}

/// A terminal payment transition, with whether this call performed it.
/// Replayed webhooks resolve with `fresh = false` so side effects fire once.
pub struct SettledPayment {
    pub payment: PaymentOrderEntity,
    pub fresh: bool,
}

/// Transitions a payment attempt to `completed`. Replays of an already
/// completed attempt are a no-op; an attempt that already failed is immutable.
pub async fn mark_completed(
    conn: &mut AsyncPgConnection,
    payment_order_id: Uuid,
    gateway_reference: &str,
) -> Result<SettledPayment, AppError> {
    let updated: QueryResult<PaymentOrderEntity> = diesel::update(
        payment_orders::table
            .find(payment_order_id)
            .filter(payment_orders::status.eq(PaymentStatus::Pending.as_str())),
    )
    .set((
        payment_orders::status.eq(PaymentStatus::Completed.as_str()),
        payment_orders::gateway_ref.eq(gateway_reference),
        payment_orders::completed_at.eq(diesel::dsl::now),
    ))
    .returning(PaymentOrderEntity::as_returning())
    .get_result(conn)
    .await;

    resolve_terminal_update(conn, payment_order_id, updated, PaymentStatus::Completed).await
}

/// Transitions a payment attempt to `failed`, with the same idempotency rule
/// as [`mark_completed`].
pub async fn mark_failed(
    conn: &mut AsyncPgConnection,
    payment_order_id: Uuid,
    reason: &str,
) -> Result<SettledPayment, AppError> {
    let updated: QueryResult<PaymentOrderEntity> = diesel::update(
        payment_orders::table
            .find(payment_order_id)
            .filter(payment_orders::status.eq(PaymentStatus::Pending.as_str())),
    )
    .set((
        payment_orders::status.eq(PaymentStatus::Failed.as_str()),
        payment_orders::error_message.eq(reason),
        payment_orders::completed_at.eq(diesel::dsl::now),
    ))
    .returning(PaymentOrderEntity::as_returning())
    .get_result(conn)
    .await;

    resolve_terminal_update(conn, payment_order_id, updated, PaymentStatus::Failed).await
}

/// Interprets the outcome of a pending->terminal conditional update: zero
/// rows means the attempt was either already in the target state (idempotent
/// replay) or in the opposite terminal state (conflict).
async fn resolve_terminal_update(
    conn: &mut AsyncPgConnection,
    payment_order_id: Uuid,
    updated: QueryResult<PaymentOrderEntity>,
    target: PaymentStatus,
) -> Result<SettledPayment, AppError> {
    match updated {
        Ok(payment) => Ok(SettledPayment {
            payment,
            fresh: true,
        }),
        Err(DieselError::NotFound) => {
            let current: PaymentOrderEntity = payment_orders::table
                .find(payment_order_id)
                .get_result(conn)
                .await?;
            let status: PaymentStatus = current
                .status
                .parse()
                .map_err(|e: String| AppError::Other(anyhow!(e)))?;
            if status == target {
                Ok(SettledPayment {
                    payment: current,
                    fresh: false,
                })
            } else {
                Err(AppError::InvalidTransition(format!(
                    "payment order {payment_order_id} is already {}",
                    current.status
                )))
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Recomputes the owning order's status from its deliveries. Safe to call
/// redundantly from any trigger: both transitions are forward-only
/// conditional updates.
pub async fn reconcile_order_status(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
) -> Result<OrderEntity, AppError> {
    let raw: Vec<String> = order_deliveries::table
        .filter(order_deliveries::order_id.eq(order_id))
        .select(order_deliveries::status)
        .get_results(conn)
        .await?;
    let statuses = parse_statuses::<DeliveryStatus>(raw)?;

    if lifecycle::all_delivered(&statuses) {
        diesel::update(
            orders::table.find(order_id).filter(orders::status.eq_any([
                OrderStatus::Pending.as_str(),
                OrderStatus::Processing.as_str(),
            ])),
        )
        .set((
            orders::status.eq(OrderStatus::Completed.as_str()),
            orders::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    } else if lifecycle::any_started(&statuses) {
        diesel::update(
            orders::table
                .find(order_id)
                .filter(orders::status.eq(OrderStatus::Pending.as_str())),
        )
        .set((
            orders::status.eq(OrderStatus::Processing.as_str()),
            orders::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await?;
    }

    let order = orders::table.find(order_id).get_result(conn).await?;
    Ok(order)
}

/// Cancels a pending order whose deliveries and meals are all untouched.
/// Deliveries move to `failed` (their closest terminal state).
pub async fn cancel_order(
    conn: &mut AsyncPgConnection,
    order_id: Uuid,
) -> Result<OrderEntity, AppError> {
    conn.transaction(move |conn| {
        async move {
            let order: OrderEntity = orders::table.find(order_id).get_result(conn).await?;
            let order_status: OrderStatus = order
                .status
                .parse()
                .map_err(|e: String| AppError::Other(anyhow!(e)))?;

            let delivery_statuses = parse_statuses::<DeliveryStatus>(
                order_deliveries::table
                    .filter(order_deliveries::order_id.eq(order_id))
                    .select(order_deliveries::status)
                    .get_results(conn)
                    .await?,
            )?;
            let meal_statuses = parse_statuses::<MealStatus>(
                delivery_meals::table
                    .filter(
                        delivery_meals::delivery_id.eq_any(
                            order_deliveries::table
                                .filter(order_deliveries::order_id.eq(order_id))
                                .select(order_deliveries::id),
                        ),
                    )
                    .select(delivery_meals::status)
                    .get_results(conn)
                    .await?,
            )?;

            if !lifecycle::order_is_cancellable(order_status, &delivery_statuses, &meal_statuses) {
                return Err(AppError::NotCancellable);
            }

            // Conditional update closes the race with a concurrent transition.
            let cancelled: Option<OrderEntity> = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::status.eq(OrderStatus::Pending.as_str())),
            )
            .set((
                orders::status.eq(OrderStatus::Cancelled.as_str()),
                orders::updated_at.eq(diesel::dsl::now),
            ))
            .returning(OrderEntity::as_returning())
            .get_result(conn)
            .await
            .optional()?;
            let cancelled = cancelled.ok_or(AppError::NotCancellable)?;

            // Only still-pending deliveries may be closed out. A delivery
            // that left `pending` after the read above makes the row count
            // fall short; rolling back keeps the started fulfilment intact.
            let failed_rows = diesel::update(
                order_deliveries::table
                    .filter(order_deliveries::order_id.eq(order_id))
                    .filter(order_deliveries::status.eq(DeliveryStatus::Pending.as_str())),
            )
            .set(order_deliveries::status.eq(DeliveryStatus::Failed.as_str()))
            .execute(conn)
            .await?;
            if failed_rows != delivery_statuses.len() {
                return Err(AppError::NotCancellable);
            }

            Ok::<OrderEntity, AppError>(cancelled)
        }
        .scope_boxed()
    })
    .await
}

fn parse_statuses<T>(raw: Vec<String>) -> Result<Vec<T>, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.into_iter()
        .map(|s| s.parse::<T>().map_err(|e| AppError::Other(anyhow!(e))))
        .collect()
}
