use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use crystal_commerce_api::{
    app_router,
    auth::{hash_password, AdminPolicy, AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{product, user},
    events,
    notifications::RecordingSink,
    services::catalog::CreateProductRequest,
    services::payments::{PayloadItem, ReconcileOutcome, WebhookOrderPayload},
    AppServices, AppState,
};

const TEST_JWT_SECRET: &str =
    "integration_test_secret_0123456789_abcdefghijklmnopqrstuvwxyz_ABCDEFGH";

/// Test harness: application state and router backed by a fresh in-memory
/// SQLite database per instance.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub sink: Arc<RecordingSink>,
    auth_service: Arc<AuthService>,
    admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        // A named shared-cache memory database keeps the schema alive for
        // the lifetime of the pool and isolates parallel tests.
        let database_url = format!(
            "sqlite:file:testdb_{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        let cfg = test_config(database_url);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_sender, event_receiver) = events::event_channel(256);
        let sink = Arc::new(RecordingSink::default());
        let event_task = tokio::spawn(events::process_events(
            event_receiver,
            sink.clone() as Arc<dyn crystal_commerce_api::notifications::NotificationSink>,
        ));

        let auth_cfg = AuthConfig {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration_secs),
        };
        let auth_service = Arc::new(AuthService::new(auth_cfg, db_arc.clone()));
        let admin_policy = Arc::new(AdminPolicy::new(cfg.admin_allow_list()));

        let config = Arc::new(cfg);
        let services = AppServices::build(
            db_arc.clone(),
            Some(Arc::new(event_sender)),
            config.default_currency.clone(),
        );
        let state = AppState::new(db_arc, config, services);

        let admin = user::Model {
            id: Uuid::new_v4(),
            email: "admin@crystalshop.example".to_string(),
            name: Some("Test Admin".to_string()),
            password_hash: None,
            role: user::ROLE_ADMIN.to_string(),
            created_at: Utc::now(),
        };
        let admin_token = auth_service
            .generate_token(&admin)
            .expect("issue admin token")
            .access_token;

        let router = app_router(state.clone(), auth_service.clone(), admin_policy);

        Self {
            router,
            state,
            sink,
            auth_service,
            admin_token,
            _event_task: event_task,
        }
    }

    #[allow(dead_code)]
    pub fn auth_service(&self) -> Arc<AuthService> {
        self.auth_service.clone()
    }

    #[allow(dead_code)]
    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Send a request against the router with an optional bearer token.
    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {tok}"));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for requests carrying the admin token.
    #[allow(dead_code)]
    pub async fn request_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.admin_token.clone();
        self.request(method, uri, body, Some(&token)).await
    }

    #[allow(dead_code)]
    pub async fn request_raw(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed a catalog product with initial stock through the normal
    /// creation path, so the stock arrives via the ledger.
    #[allow(dead_code)]
    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        initial_stock: i32,
        low_stock_threshold: i32,
    ) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductRequest {
                name: name.to_string(),
                description: Some("Seeded for integration tests".to_string()),
                price,
                initial_stock: Some(initial_stock),
                low_stock_threshold: Some(low_stock_threshold),
                properties: None,
                colors: None,
                images: None,
            })
            .await
            .expect("seed product")
    }

    /// Seed a user account with a hashed password.
    #[allow(dead_code)]
    pub async fn seed_user(&self, email: &str, password: &str, role: &str) -> user::Model {
        use sea_orm::{ActiveModelTrait, Set};

        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_ascii_lowercase()),
            name: Set(None),
            password_hash: Set(Some(hash_password(password).expect("hash password"))),
            role: Set(role.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    /// Drive a paid order into existence through payment reconciliation.
    #[allow(dead_code)]
    pub async fn reconcile_order(
        &self,
        payment_intent_id: &str,
        email: &str,
        items: Vec<(Uuid, i32)>,
        amount_paid_cents: i64,
    ) -> ReconcileOutcome {
        let payload = WebhookOrderPayload {
            email: email.to_string(),
            name: None,
            items: items
                .into_iter()
                .map(|(product_id, quantity)| PayloadItem {
                    product_id,
                    quantity,
                })
                .collect(),
            shipping_address: None,
            discount_code: None,
            shipping_cost: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            currency: None,
        };
        self.state
            .services
            .payments
            .reconcile(payment_intent_id, amount_paid_cents, payload)
            .await
            .expect("reconcile order")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

#[allow(dead_code)]
pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        database_url,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expiration_secs: 3600,
        auth_issuer: "crystal-commerce-api".to_string(),
        auth_audience: "crystal-commerce".to_string(),
        host: "127.0.0.1".to_string(),
        port: 18_080,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        cors_allowed_origins: None,
        cors_allow_any_origin: true,
        admin_emails: Some("owner@crystalshop.example".to_string()),
        payment_webhook_secret: None,
        payment_webhook_tolerance_secs: 300,
        low_stock_webhook_url: None,
        default_currency: "USD".to_string(),
    }
}
