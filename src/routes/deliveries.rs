use anyhow::Context;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl, scoped_futures::ScopedFutureExt};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    ledger,
    lifecycle::{self, DeliveryStatus, MealStatus},
    middleware::bearer_authorization,
    models::{DeliveryMealEntity, OrderDeliveryEntity, OrderEntity},
    schema::{delivery_meals, order_deliveries},
};

/// Fulfilment routes for kitchen and courier staff, behind the service bearer
/// token.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/deliveries",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(update_delivery_status))
            .routes(utoipa_axum::routes!(complete_delivery_meal))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                bearer_authorization,
            )),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateDeliveryStatusReq {
    pub status: String,
    pub notes: Option<String>,
}

#[derive(serde::Serialize, ToSchema)]
pub struct UpdateDeliveryStatusRes {
    pub delivery: OrderDeliveryEntity,
    pub order: OrderEntity,
}

/// Moves a delivery along its lifecycle and reconciles the owning order.
/// `ready` additionally requires every meal of the delivery to be completed.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Deliveries"],
    params(
        ("id" = Uuid, Path, description = "Delivery ID")
    ),
    responses(
        (status = 200, description = "Delivery status updated", body = StdResponse<UpdateDeliveryStatusRes, String>),
        (status = 409, description = "Transition not allowed from the current state")
    )
)]
pub async fn update_delivery_status(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    axum::Json(req): axum::Json<UpdateDeliveryStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let target: DeliveryStatus = req
        .status
        .parse()
        .map_err(|e: String| AppError::BadRequest(e))?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let notes = req.notes;
    let delivery = conn
        .transaction(move |conn| {
            async move {
                let delivery: OrderDeliveryEntity = order_deliveries::table
                    .find(id)
                    .get_result(conn)
                    .await?;
                let current: DeliveryStatus = delivery
                    .status
                    .parse()
                    .map_err(|e: String| AppError::Other(anyhow::anyhow!(e)))?;

                if !lifecycle::delivery_transition_allowed(current, target) {
                    return Err(AppError::InvalidTransition(format!(
                        "delivery cannot move from {} to {}",
                        current.as_str(),
                        target.as_str()
                    )));
                }

                if target == DeliveryStatus::Ready {
                    let meal_statuses: Vec<String> = delivery_meals::table
                        .filter(delivery_meals::delivery_id.eq(id))
                        .select(delivery_meals::status)
                        .get_results(conn)
                        .await?;
                    let meal_statuses: Vec<MealStatus> = meal_statuses
                        .into_iter()
                        .map(|s| s.parse().map_err(|e: String| AppError::Other(anyhow::anyhow!(e))))
                        .collect::<Result<_, _>>()?;
                    if !lifecycle::delivery_ready_allowed(&meal_statuses) {
                        return Err(AppError::InvalidTransition(
                            "delivery has uncompleted meals".into(),
                        ));
                    }
                }

                // Conditional on the observed status: a concurrent update by
                // another staff member makes this a zero-row update.
                let updated: Option<OrderDeliveryEntity> = diesel::update(
                    order_deliveries::table
                        .find(id)
                        .filter(order_deliveries::status.eq(current.as_str())),
                )
                .set((
                    order_deliveries::status.eq(target.as_str()),
                    (target == DeliveryStatus::Delivered)
                        .then(|| order_deliveries::delivered_at.eq(diesel::dsl::now)),
                    notes.map(|n| order_deliveries::notes.eq(n)),
                ))
                .returning(OrderDeliveryEntity::as_returning())
                .get_result(conn)
                .await
                .optional()?;

                updated.ok_or_else(|| {
                    AppError::InvalidTransition("delivery was updated concurrently".into())
                })
            }
            .scope_boxed()
        })
        .await?;

    let order = ledger::reconcile_order_status(conn, delivery.order_id).await?;

    Ok(StdResponse {
        data: Some(UpdateDeliveryStatusRes { delivery, order }),
        message: Some("Delivery status updated"),
    })
}

/// Marks one meal of a delivery as prepared. Replays are no-ops.
#[utoipa::path(
    post,
    path = "/{id}/meals/{meal_id}/complete",
    tags = ["Deliveries"],
    params(
        ("id" = Uuid, Path, description = "Delivery ID"),
        ("meal_id" = Uuid, Path, description = "Delivery meal ID")
    ),
    responses(
        (status = 200, description = "Meal completed", body = StdResponse<DeliveryMealEntity, String>),
        (status = 404, description = "Meal does not belong to this delivery")
    )
)]
pub async fn complete_delivery_meal(
    Path((id, meal_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let updated: Option<DeliveryMealEntity> = diesel::update(
        delivery_meals::table
            .find(meal_id)
            .filter(delivery_meals::delivery_id.eq(id))
            .filter(delivery_meals::status.eq(MealStatus::Pending.as_str())),
    )
    .set((
        delivery_meals::status.eq(MealStatus::Completed.as_str()),
        delivery_meals::completed_at.eq(diesel::dsl::now),
    ))
    .returning(DeliveryMealEntity::as_returning())
    .get_result(conn)
    .await
    .optional()?;

    let meal = match updated {
        Some(meal) => meal,
        // Zero rows: either already completed (idempotent) or not ours.
        None => {
            let current: DeliveryMealEntity = delivery_meals::table
                .find(meal_id)
                .filter(delivery_meals::delivery_id.eq(id))
                .get_result(conn)
                .await?;
            current
        }
    };

    Ok(StdResponse {
        data: Some(meal),
        message: Some("Meal completed"),
    })
}
