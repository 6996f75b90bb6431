use crate::{
    entities::product::Model as ProductModel,
    errors::ServiceError,
    handlers::common::{created_response, success_response, PaginatedResponse, PaginationParams},
    services::catalog::{CreateProductRequest, UpdateProductRequest},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog projection with the JSON list columns decoded.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub properties: Vec<String>,
    pub colors: Vec<String>,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ProductModel> for ProductView {
    fn from(model: ProductModel) -> Self {
        Self {
            properties: model.properties_list(),
            colors: model.colors_list(),
            images: model.images_list(),
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            stock_quantity: model.stock_quantity,
            low_stock_threshold: model.low_stock_threshold,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id/deactivate", post(deactivate_product))
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(PaginationParams),
    responses((status = 200, description = "Active products", body = [ProductView])),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ServiceError> {
    let (page, per_page) = params.normalized();
    let (products, total) = state.services.catalog.list_active(page, per_page).await?;
    let views: Vec<ProductView> = products.into_iter().map(Into::into).collect();
    Ok(success_response(PaginatedResponse::new(
        views, page, per_page, total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product detail", body = ProductView),
        (status = 404, description = "Not found or inactive")
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.get(id).await?;
    // Deactivated products are invisible to the storefront
    if !product.is_active {
        return Err(ServiceError::NotFound(format!("Product {id} not found")));
    }
    Ok(success_response(ProductView::from(product)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductView),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn create_product(
    State(state): State<AppState>,
    axum::Json(request): axum::Json<CreateProductRequest>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.create_product(request).await?;
    Ok(created_response(ProductView::from(product)))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductView),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    axum::Json(request): axum::Json<UpdateProductRequest>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.update_product(id, request).await?;
    Ok(success_response(ProductView::from(product)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/products/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deactivated", body = ProductView),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn deactivate_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.deactivate(id).await?;
    Ok(success_response(ProductView::from(product)))
}
