//! Crystal Commerce API: storefront and back-office service for a crystal
//! jewelry shop. Catalog, stock ledger, discount codes, order lifecycle,
//! and payment-provider reconciliation over HTTP.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod request_id;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{AdminPolicy, AdminRouterExt, AuthService};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::catalog::CatalogService;
use crate::services::discounts::DiscountService;
use crate::services::inventory::InventoryService;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Service layer, wired once at startup and cloned into the router state.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub inventory: InventoryService,
    pub orders: OrderService,
    pub discounts: DiscountService,
    pub payments: PaymentService,
}

impl AppServices {
    pub fn build(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        default_currency: String,
    ) -> Self {
        let inventory = InventoryService::new(db.clone(), event_sender.clone());
        let discounts = DiscountService::new(db.clone(), event_sender.clone());
        let catalog = CatalogService::new(db.clone(), inventory.clone());
        let orders = OrderService::new(db.clone(), inventory.clone(), event_sender.clone());
        let payments = PaymentService::new(
            db,
            inventory.clone(),
            discounts.clone(),
            event_sender,
            default_currency,
        );
        Self {
            catalog,
            inventory,
            orders,
            discounts,
            payments,
        }
    }
}

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, services: AppServices) -> Self {
        Self {
            db,
            config,
            services,
        }
    }
}

/// Assembles the full application router: storefront routes, the admin
/// subtree behind token + policy middleware, auth, docs, and health.
pub fn app_router(
    state: AppState,
    auth_service: Arc<AuthService>,
    admin_policy: Arc<AdminPolicy>,
) -> Router {
    let public = Router::new()
        .merge(handlers::products::public_routes())
        .merge(handlers::orders::public_routes())
        .merge(handlers::discounts::public_routes())
        .merge(handlers::checkout::public_routes())
        .merge(handlers::payment_webhooks::public_routes());

    let admin = Router::new()
        .merge(handlers::products::admin_routes())
        .merge(handlers::orders::admin_routes())
        .merge(handlers::inventory::admin_routes())
        .merge(handlers::discounts::admin_routes())
        .with_admin(auth_service.clone(), admin_policy);

    let api = Router::new()
        .merge(public)
        .nest("/admin", admin)
        .route("/status", get(api_status));

    let cors = build_cors_layer(&state.config);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .with_state(state)
        .nest("/auth", auth::auth_routes(auth_service))
        .merge(openapi::swagger_ui())
        .layer(axum::middleware::from_fn(
            request_id::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    if config.should_allow_permissive_cors() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = trimmed, "ignoring unparseable CORS origin");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}

/// Liveness plus a database ping; a degraded database answers 503 so
/// load balancers stop routing here.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match db::check_connection(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => {
            warn!(error = %e, "health check could not reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded" })),
            )
        }
    }
}

async fn api_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
