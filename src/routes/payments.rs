use anyhow::Context;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;
use serde_json::{Value, json};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    gateway::{ClientDetails, PaymentLink, PaymentLinkRequest},
    ledger,
    middleware::bearer_authorization,
    models::{OrderEntity, PaymentOrderEntity},
    schema::{orders, payment_orders},
};

/// Payment routes. The webhook and the status listing are reachable by the
/// gateway and the storefront poller; link creation requires the service
/// bearer token.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/payments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(webhook))
            .routes(utoipa_axum::routes!(payments_by_order))
            .routes(utoipa_axum::routes!(mock_pay))
            .merge(
                OpenApiRouter::new()
                    .routes(utoipa_axum::routes!(create_payment_link))
                    .route_layer(axum::middleware::from_fn_with_state(
                        state,
                        bearer_authorization,
                    )),
            ),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct WebhookReq {
    pub status: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    /// Amount in minor units; arrives as a string or a bare number depending
    /// on the gateway version.
    pub original_currency_amount: Option<Value>,
    pub bank_order_code: Option<String>,
    pub signaturev3: Option<String>,
    pub signaturev2: Option<String>,
    /// The reference we supplied at link creation (the payment order id).
    pub reference: Option<String>,
}

#[derive(serde::Serialize, ToSchema)]
pub struct WebhookRes {
    pub payment: PaymentOrderEntity,
    pub order_status: String,
}

/// Gateway notification for a settled payment attempt. Delivered at least
/// once; replays settle on the stored state.
#[utoipa::path(
    post,
    path = "/webhook",
    tags = ["Payments"],
    responses(
        (status = 200, description = "Notification processed", body = StdResponse<WebhookRes, String>),
        (status = 400, description = "Malformed notification or bad signature")
    )
)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WebhookReq>,
) -> Result<impl IntoResponse, AppError> {
    let status = req
        .status
        .ok_or_else(|| AppError::BadRequest("missing status".into()))?;
    let data = req
        .data
        .ok_or_else(|| AppError::BadRequest("missing data".into()))?;

    let test_bypass = state.config.gateway.allow_test_bypass
        && headers
            .get("x-test-mode")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "true");

    if test_bypass {
        tracing::warn!("webhook signature verification bypassed via x-test-mode");
    } else {
        // Amount and order code only exist to feed the digest; a bypassed
        // notification does not need them.
        let (amount_minor, bank_order_code) = verification_inputs(&data)?;
        let signature = select_signature(&data).ok_or(AppError::InvalidSignature)?;
        if !state
            .gateway
            .verify_payment(&amount_minor, bank_order_code, signature)
        {
            return Err(AppError::InvalidSignature);
        }
    }

    let bank_order_code = data.bank_order_code.clone().unwrap_or_default();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let payment = resolve_payment_order(conn, data.reference.as_deref()).await?;

    let settled = if status == "OK" {
        ledger::mark_completed(conn, payment.id, &bank_order_code).await
    } else {
        ledger::mark_failed(conn, payment.id, &format!("gateway reported {status}")).await
    };

    let payment = match settled {
        Ok(settled) => {
            // Redelivered notifications resolve with fresh = false; the
            // confirmation email and stats registration fire exactly once.
            if status == "OK" && settled.fresh {
                notify_settled(&state, conn, &settled.payment).await;
            }
            settled.payment
        }
        // Replay racing the opposite outcome: acknowledge with the stored
        // state so the gateway stops retrying.
        Err(AppError::InvalidTransition(detail)) => {
            tracing::warn!("webhook replay ignored: {detail}");
            payment_orders::table
                .find(payment.id)
                .get_result(conn)
                .await?
        }
        Err(e) => return Err(e),
    };

    let order: OrderEntity = orders::table
        .find(payment.order_id)
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(WebhookRes {
            payment,
            order_status: order.status,
        }),
        message: Some("Notification processed"),
    })
}

/// `originalCurrencyAmount` must reach the signature check exactly as the
/// gateway rendered it.
fn amount_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Prefer the v3 signature; older gateway versions only send v2.
fn select_signature(data: &WebhookData) -> Option<&str> {
    data.signaturev3.as_deref().or(data.signaturev2.as_deref())
}

/// The fields signature verification is computed over. Only required when
/// verification actually runs.
fn verification_inputs(data: &WebhookData) -> Result<(String, &str), AppError> {
    let amount_minor = data
        .original_currency_amount
        .as_ref()
        .and_then(amount_as_text)
        .ok_or_else(|| AppError::BadRequest("missing originalCurrencyAmount".into()))?;
    let bank_order_code = data
        .bank_order_code
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("missing bankOrderCode".into()))?;
    Ok((amount_minor, bank_order_code))
}

/// Locates the payment attempt a notification refers to: the reference we
/// issued is the attempt id, but some gateway versions echo the payment link
/// id instead, and legacy storefronts sent the order id.
async fn resolve_payment_order(
    conn: &mut AsyncPgConnection,
    reference: Option<&str>,
) -> Result<PaymentOrderEntity, AppError> {
    let reference = reference.ok_or_else(|| AppError::BadRequest("missing reference".into()))?;

    if let Ok(id) = reference.parse::<Uuid>() {
        let by_id: Option<PaymentOrderEntity> = payment_orders::table
            .find(id)
            .get_result(conn)
            .await
            .optional()?;
        if let Some(payment) = by_id {
            return Ok(payment);
        }

        let by_order: Option<PaymentOrderEntity> = payment_orders::table
            .filter(payment_orders::order_id.eq(id))
            .order(payment_orders::created_at.desc())
            .select(PaymentOrderEntity::as_select())
            .first(conn)
            .await
            .optional()?;
        if let Some(payment) = by_order {
            return Ok(payment);
        }
    }

    let by_gateway_ref: Option<PaymentOrderEntity> = payment_orders::table
        .filter(payment_orders::gateway_ref.eq(reference))
        .order(payment_orders::created_at.desc())
        .select(PaymentOrderEntity::as_select())
        .first(conn)
        .await
        .optional()?;

    by_gateway_ref.ok_or(AppError::NotFound)
}

/// Post-settlement side effects. Failures are logged, never bubbled: the
/// payment is already settled and the gateway must not retry.
async fn notify_settled(state: &AppState, conn: &mut AsyncPgConnection, payment: &PaymentOrderEntity) {
    let order: Result<OrderEntity, _> = orders::table
        .find(payment.order_id)
        .get_result(conn)
        .await;
    let order = match order {
        Ok(order) => order,
        Err(e) => {
            tracing::warn!("settled payment {} has no loadable order: {e}", payment.id);
            return;
        }
    };

    if let Err(e) = state.notifier.send_order_confirmation(&order).await {
        tracing::warn!("order confirmation for {} failed: {e:#}", order.id);
    }
    if let Err(e) = state.notifier.register_purchase(&order, payment).await {
        tracing::warn!("purchase registration for {} failed: {e:#}", order.id);
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentLinkReq {
    pub reference: Option<String>,
    pub concept: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub url_success: Option<String>,
    pub url_failed: Option<String>,
    pub client: Option<ClientDetails>,
}

/// Storefront-facing proxy that creates a hosted payment link at the gateway.
/// Responses carry no-store cache headers: they embed a live payment URL.
#[utoipa::path(
    post,
    path = "/create-payment-link",
    tags = ["Payments"],
    responses(
        (status = 200, description = "Payment link created"),
        (status = 400, description = "Missing required field"),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn create_payment_link(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentLinkReq>,
) -> Result<impl IntoResponse, AppError> {
    let request = PaymentLinkRequest {
        reference: require(req.reference, "reference")?,
        concept: require(req.concept, "concept")?,
        amount: require(req.amount, "amount")?,
        currency: require(req.currency, "currency")?,
        description: req.description.unwrap_or_default(),
        url_success: require(req.url_success, "urlSuccess")?,
        url_failed: require(req.url_failed, "urlFailed")?,
        client: req.client,
    };

    let link = state.gateway.create_payment_link(&request).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(link_response_body(&link)),
    ))
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::BadRequest(format!("missing required field {field}")))
}

/// The gateway's fields spread at the top level, with `success` and
/// `shortUrl` guaranteed present.
fn link_response_body(link: &PaymentLink) -> Value {
    let mut body = match &link.raw {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    body.insert("success".into(), json!(true));
    body.insert("shortUrl".into(), json!(link.short_url));
    Value::Object(body)
}

/// Payment attempts for an order, newest first. The storefront polls this
/// while the customer sits on the gateway's payment page.
#[utoipa::path(
    get,
    path = "/by-order/{order_id}",
    tags = ["Payments"],
    params(
        ("order_id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Payment attempts", body = StdResponse<Vec<PaymentOrderEntity>, String>)
    )
)]
pub async fn payments_by_order(
    Path(order_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let attempts: Vec<PaymentOrderEntity> = payment_orders::table
        .filter(payment_orders::order_id.eq(order_id))
        .order(payment_orders::created_at.desc())
        .select(PaymentOrderEntity::as_select())
        .get_results(conn)
        .await?;

    Ok(StdResponse {
        data: Some(attempts),
        message: None::<&str>,
    })
}

/// Settles a payment attempt without a gateway round trip. Only available
/// when the mock gateway is configured.
#[utoipa::path(
    patch,
    path = "/{id}/mock-pay",
    tags = ["Payments"],
    params(
        ("id" = Uuid, Path, description = "Payment order ID")
    ),
    responses(
        (status = 200, description = "Payment marked as completed", body = StdResponse<PaymentOrderEntity, String>),
        (status = 403, description = "Mock payments disabled")
    )
)]
pub async fn mock_pay(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if !state.config.gateway.mock_mode {
        return Err(AppError::ForbiddenResource("mock payments disabled".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection from the pool")?;

    let reference = format!("mock-settlement-{id}");
    let settled = ledger::mark_completed(conn, id, &reference).await?;
    if settled.fresh {
        notify_settled(&state, conn, &settled.payment).await;
    }

    Ok(StdResponse {
        data: Some(settled.payment),
        message: Some("Payment paid successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(v3: Option<&str>, v2: Option<&str>) -> WebhookData {
        WebhookData {
            original_currency_amount: None,
            bank_order_code: None,
            signaturev3: v3.map(str::to_string),
            signaturev2: v2.map(str::to_string),
            reference: None,
        }
    }

    #[test]
    fn newer_signature_version_wins() {
        assert_eq!(
            select_signature(&data(Some("sig3"), Some("sig2"))),
            Some("sig3")
        );
        assert_eq!(select_signature(&data(None, Some("sig2"))), Some("sig2"));
        assert_eq!(select_signature(&data(None, None)), None);
    }

    #[test]
    fn verification_inputs_required_only_for_verification() {
        let mut d = data(Some("sig3"), None);
        assert!(matches!(
            verification_inputs(&d),
            Err(AppError::BadRequest(_))
        ));

        d.original_currency_amount = Some(json!(2999));
        assert!(matches!(
            verification_inputs(&d),
            Err(AppError::BadRequest(_))
        ));

        d.bank_order_code = Some("BANK-1".into());
        let (amount, code) = verification_inputs(&d).unwrap();
        assert_eq!(amount, "2999");
        assert_eq!(code, "BANK-1");
    }

    #[test]
    fn link_response_spreads_gateway_fields() {
        let link = PaymentLink {
            id: "pl-1".into(),
            short_url: "https://pay.example.test/l/pl-1".into(),
            amount: 2999,
            currency: "EUR".into(),
            state: "pending".into(),
            raw: json!({"id": "pl-1", "state": "pending", "vendorField": "x"}),
        };

        let body = link_response_body(&link);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["shortUrl"], "https://pay.example.test/l/pl-1");
        assert_eq!(body["id"], "pl-1");
        assert_eq!(body["vendorField"], "x");
    }

    #[test]
    fn amount_text_survives_both_gateway_renderings() {
        assert_eq!(amount_as_text(&json!("2999")), Some("2999".into()));
        assert_eq!(amount_as_text(&json!(2999)), Some("2999".into()));
        assert_eq!(amount_as_text(&json!(null)), None);
        assert_eq!(amount_as_text(&json!({"v": 1})), None);
    }
}
