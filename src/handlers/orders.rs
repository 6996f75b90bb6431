use crate::{
    auth::AuthUser,
    entities::order::{Model as OrderModel, OrderStatus},
    entities::order_status_history::Model as HistoryModel,
    errors::ServiceError,
    handlers::common::{success_response, PaginatedResponse, PaginationParams},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OrderModel> for OrderView {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            status: model.status,
            payment_status: model.payment_status,
            payment_intent_id: model.payment_intent_id,
            subtotal: model.subtotal,
            shipping_cost: model.shipping_cost,
            tax_amount: model.tax_amount,
            discount_amount: model.discount_amount,
            total_amount: model.total_amount,
            currency: model.currency,
            cancellation_reason: model.cancellation_reason,
            cancelled_at: model.cancelled_at,
            cancelled_by: model.cancelled_by,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HistoryView {
    pub status: String,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<HistoryModel> for HistoryView {
    fn from(model: HistoryModel) -> Self {
        Self {
            status: model.status,
            note: model.note,
            created_by: model.created_by,
            created_at: model.created_at,
        }
    }
}

/// Customer-facing tracking view. No account or payment identifiers.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TrackingView {
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub timeline: Vec<HistoryView>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CancelOrderRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct OrderListFilter {
    pub status: Option<String>,
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/orders/track/:order_number", get(track_order))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_status))
        .route("/orders/:id/cancel", post(cancel_order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/track/{order_number}",
    params(("order_number" = String, Path, description = "Customer-facing order number")),
    responses(
        (status = 200, description = "Order status and timeline", body = TrackingView),
        (status = 404, description = "Unknown order number")
    ),
    tag = "orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Response, ServiceError> {
    let (order, history) = state.services.orders.track_by_number(&order_number).await?;
    Ok(success_response(TrackingView {
        order_number: order.order_number,
        status: order.status,
        payment_status: order.payment_status,
        total_amount: order.total_amount,
        currency: order.currency,
        created_at: order.created_at,
        timeline: history.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    params(PaginationParams, OrderListFilter),
    responses((status = 200, description = "Orders", body = [OrderView])),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
    Query(filter): Query<OrderListFilter>,
) -> Result<Response, ServiceError> {
    let (page, per_page) = params.normalized();
    let status = match filter.status.as_deref() {
        Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| {
            ServiceError::ValidationError(format!("Unknown order status {raw}"))
        })?),
        None => None,
    };
    let (orders, total) = state
        .services
        .orders
        .list_orders(page, per_page, status)
        .await?;
    let views: Vec<OrderView> = orders.into_iter().map(Into::into).collect();
    Ok(success_response(PaginatedResponse::new(
        views, page, per_page, total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items and timeline"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    let items = state.services.orders.get_order_items(id).await?;
    let history = state.services.orders.get_history(id).await?;
    Ok(success_response(serde_json::json!({
        "order": OrderView::from(order),
        "items": items,
        "timeline": history.into_iter().map(HistoryView::from).collect::<Vec<_>>(),
    })))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Order transitioned", body = OrderView),
        (status = 400, description = "Invalid transition"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(id, request.status, request.note, Some(user.email))
        .await?;
    Ok(success_response(OrderView::from(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = OrderView),
        (status = 400, description = "Order can no longer be cancelled"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .cancel_order(id, &request.reason, Some(user.email))
        .await?;
    Ok(success_response(OrderView::from(order)))
}
