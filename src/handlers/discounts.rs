use crate::{
    entities::discount_code::Model as DiscountModel,
    errors::ServiceError,
    handlers::common::{created_response, success_response, PaginatedResponse, PaginationParams},
    services::discounts::CreateDiscountRequest,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storefront projection: enough to apply the code, nothing operational.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AutoApplyView {
    pub code: String,
    pub percentage: i32,
    pub code_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<DiscountModel> for AutoApplyView {
    fn from(model: DiscountModel) -> Self {
        Self {
            code: model.code,
            percentage: model.percentage,
            code_type: model.code_type,
            expires_at: model.expires_at,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct AutoApplyParams {
    pub email: String,
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/discounts/auto-apply", get(auto_apply))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/discounts", get(list_discounts).post(create_discount))
        .route("/discounts/:id/invalidate", post(invalidate_discount))
}

#[utoipa::path(
    get,
    path = "/api/v1/discounts/auto-apply",
    params(AutoApplyParams),
    responses(
        (status = 200, description = "Best live code for the email, if any", body = AutoApplyView),
        (status = 400, description = "Invalid email")
    ),
    tag = "discounts"
)]
pub async fn auto_apply(
    State(state): State<AppState>,
    Query(params): Query<AutoApplyParams>,
) -> Result<Response, ServiceError> {
    let discount = state
        .services
        .discounts
        .check_user_discounts(&params.email)
        .await?;
    Ok(success_response(serde_json::json!({
        "discount": discount.map(AutoApplyView::from),
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/discounts",
    params(PaginationParams),
    responses((status = 200, description = "All discount codes")),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn list_discounts(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ServiceError> {
    let (page, per_page) = params.normalized();
    let (codes, total) = state.services.discounts.list(page, per_page).await?;
    Ok(success_response(PaginatedResponse::new(
        codes, page, per_page, total,
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/discounts",
    request_body = CreateDiscountRequest,
    responses(
        (status = 201, description = "Discount created"),
        (status = 409, description = "Code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn create_discount(
    State(state): State<AppState>,
    Json(request): Json<CreateDiscountRequest>,
) -> Result<Response, ServiceError> {
    let discount = state.services.discounts.create_discount(request).await?;
    Ok(created_response(discount))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/discounts/{id}/invalidate",
    params(("id" = Uuid, Path, description = "Discount id")),
    responses(
        (status = 200, description = "Discount invalidated"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn invalidate_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let discount = state.services.discounts.invalidate(id).await?;
    Ok(success_response(discount))
}
