mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{response_json, TestApp};
use crystal_commerce_api::entities::user;
use serde_json::json;
use test_case::test_case;
use uuid::Uuid;

#[test_case(Method::GET, "/api/v1/admin/orders" ; "order list")]
#[test_case(Method::GET, "/api/v1/admin/discounts" ; "discount list")]
#[test_case(Method::GET, "/api/v1/admin/inventory/low-stock" ; "low stock report")]
#[test_case(Method::POST, "/api/v1/admin/products" ; "product creation")]
#[tokio::test]
async fn admin_endpoints_require_a_token(method: Method, uri: &str) {
    let app = TestApp::new().await;
    let response = app.request(method, uri, None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customer_tokens_are_forbidden_from_the_admin_subtree() {
    let app = TestApp::new().await;
    let shopper = user::Model {
        id: Uuid::new_v4(),
        email: "shopper@example.com".to_string(),
        name: None,
        password_hash: None,
        role: user::ROLE_CUSTOMER.to_string(),
        created_at: Utc::now(),
    };
    let token = app
        .auth_service()
        .generate_token(&shopper)
        .expect("token")
        .access_token;

    let response = app
        .request(Method::GET, "/api/v1/admin/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn allow_listed_email_is_admin_without_the_role_flag() {
    let app = TestApp::new().await;
    // owner@crystalshop.example is on the configured allow-list
    let owner = user::Model {
        id: Uuid::new_v4(),
        email: "Owner@CrystalShop.example".to_string(),
        name: None,
        password_hash: None,
        role: user::ROLE_CUSTOMER.to_string(),
        created_at: Utc::now(),
    };
    let token = app
        .auth_service()
        .generate_token(&owner)
        .expect("token")
        .access_token;

    let response = app
        .request(Method::GET, "/api/v1/admin/orders", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn product_lifecycle_over_http() {
    let app = TestApp::new().await;

    let created = app
        .request_admin(
            Method::POST,
            "/api/v1/admin/products",
            Some(json!({
                "name": "Celestite Cluster",
                "description": "Sky blue, palm sized",
                "price": "34.00",
                "initial_stock": 12,
                "low_stock_threshold": 3,
                "colors": ["blue"],
                "properties": ["calming"]
            })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = response_json(created).await;
    assert_eq!(body["stock_quantity"], 12);
    assert_eq!(body["colors"], json!(["blue"]));
    let product_id = body["id"].as_str().expect("product id").to_string();

    // Publicly listed while active
    let listing = app
        .request(Method::GET, "/api/v1/products", None, None)
        .await;
    assert_eq!(listing.status(), StatusCode::OK);
    let listing = response_json(listing).await;
    assert_eq!(listing["pagination"]["total"], 1);
    assert_eq!(listing["data"][0]["name"], "Celestite Cluster");

    let updated = app
        .request_admin(
            Method::PUT,
            &format!("/api/v1/admin/products/{product_id}"),
            Some(json!({ "price": "39.00" })),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);

    app.request_admin(
        Method::POST,
        &format!("/api/v1/admin/products/{product_id}/deactivate"),
        None,
    )
    .await;

    // Deactivated products vanish from the storefront
    let gone = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{product_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_issues_a_usable_token() {
    let app = TestApp::new().await;
    app.seed_user("staff@example.com", "rose-quartz-rising", user::ROLE_ADMIN)
        .await;

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({
                "email": "Staff@Example.com",
                "password": "rose-quartz-rising"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let token = body["access_token"].as_str().expect("token").to_string();
    assert_eq!(body["token_type"], "Bearer");

    let admin = app
        .request(Method::GET, "/api/v1/admin/orders", None, Some(&token))
        .await;
    assert_eq!(admin.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_credentials_are_uniformly_rejected() {
    let app = TestApp::new().await;
    app.seed_user("staff@example.com", "rose-quartz-rising", user::ROLE_ADMIN)
        .await;

    for (email, password) in [
        ("staff@example.com", "wrong-password"),
        ("nobody@example.com", "rose-quartz-rising"),
    ] {
        let response = app
            .request(
                Method::POST,
                "/auth/login",
                Some(json!({ "email": email, "password": password })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response_json(response).await;
        assert_eq!(body["message"], "Authentication error: Invalid credentials");
    }
}

#[tokio::test]
async fn webhook_creates_an_order_end_to_end() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Kyanite Blade", rust_decimal::Decimal::new(4_500, 2), 5, 1)
        .await;

    let payload = json!({
        "email": "luna@example.com",
        "items": [{ "product_id": product.id, "quantity": 1 }]
    });
    let event = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": "pi_http_1",
            "amount_received": 4500,
            "metadata": { "order_payload": payload.to_string() }
        }}
    });

    let response = app
        .request(Method::POST, "/api/v1/payments/webhook", Some(event), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (orders, total) = app
        .state
        .services
        .orders
        .list_orders(1, 10, None)
        .await
        .expect("orders");
    assert_eq!(total, 1);
    assert_eq!(orders[0].payment_intent_id.as_deref(), Some("pi_http_1"));

    // Unrelated event types are acknowledged and dropped
    let ignored = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            Some(json!({ "type": "payment_intent.created" })),
            None,
        )
        .await;
    assert_eq!(ignored.status(), StatusCode::OK);
}

#[tokio::test]
async fn tracking_endpoint_hides_account_and_payment_identifiers() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Chrysoprase Ring", rust_decimal::Decimal::new(5_400, 2), 5, 1)
        .await;
    let order = app
        .reconcile_order("pi_track_http", "luna@example.com", vec![(product.id, 1)], 5_400)
        .await
        .order;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/track/{}", order.order_number),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["order_number"], order.order_number);
    assert_eq!(body["status"], "processing");
    assert!(body.get("user_id").is_none());
    assert!(body.get("payment_intent_id").is_none());
    assert!(body["timeline"].is_array());
}

#[tokio::test]
async fn health_and_status_respond() {
    let app = TestApp::new().await;

    // Health answers ok only after reaching the database
    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    let body = response_json(health).await;
    assert_eq!(body["status"], "ok");

    let status = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(status.status(), StatusCode::OK);
    let body = response_json(status).await;
    assert_eq!(body["name"], "crystal-commerce-api");
}
