use crate::{
    entities::inventory_log_entry::EntryType,
    errors::ServiceError,
    handlers::common::{success_response, PaginatedResponse, PaginationParams},
    handlers::products::ProductView,
    services::inventory::AdjustStockRequest,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AdjustStockBody {
    /// Signed delta; negative reduces stock
    pub delta: i32,
    pub entry_type: EntryType,
    pub reason: Option<String>,
    pub reference: Option<String>,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory/:product_id/adjust", post(adjust_stock))
        .route("/inventory/:product_id/ledger", get(list_ledger))
        .route("/inventory/:product_id/recount", post(recount))
        .route("/inventory/low-stock", get(low_stock_report))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/inventory/{product_id}/adjust",
    params(("product_id" = Uuid, Path, description = "Product id")),
    request_body = AdjustStockBody,
    responses(
        (status = 200, description = "Ledger entry written"),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "Unknown product")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(body): Json<AdjustStockBody>,
) -> Result<Response, ServiceError> {
    if body.delta == 0 {
        return Err(ServiceError::ValidationError(
            "Adjustment delta cannot be zero".to_string(),
        ));
    }
    let entry = state
        .services
        .inventory
        .adjust_stock(AdjustStockRequest {
            product_id,
            delta: body.delta,
            entry_type: body.entry_type,
            reason: body.reason,
            reference: body.reference,
        })
        .await?;
    Ok(success_response(entry))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/inventory/{product_id}/ledger",
    params(("product_id" = Uuid, Path, description = "Product id"), PaginationParams),
    responses((status = 200, description = "Ledger entries, newest first")),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn list_ledger(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ServiceError> {
    let (page, per_page) = params.normalized();
    let (entries, total) = state
        .services
        .inventory
        .list_ledger(product_id, page, per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        entries, page, per_page, total,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/inventory/{product_id}/recount",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Counter verified; the corrective entry when drift was found"),
        (status = 404, description = "Unknown product")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn recount(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let correction = state.services.inventory.recount(product_id).await?;
    Ok(success_response(serde_json::json!({
        "drift_detected": correction.is_some(),
        "correction": correction,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/inventory/low-stock",
    responses((status = 200, description = "Active products at or below threshold", body = [ProductView])),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn low_stock_report(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let products = state.services.inventory.low_stock_report().await?;
    let views: Vec<ProductView> = products.into_iter().map(Into::into).collect();
    Ok(success_response(views))
}
