mod common;

use assert_matches::assert_matches;
use common::TestApp;
use crystal_commerce_api::{
    entities::discount_code::{CodeType, Entity as DiscountEntity},
    errors::ServiceError,
    services::discounts::CreateDiscountRequest,
};
use rust_decimal::Decimal;
use sea_orm::EntityTrait;

fn shared_code(code: &str, usage_limit: Option<i32>) -> CreateDiscountRequest {
    CreateDiscountRequest {
        code: code.to_string(),
        email: None,
        percentage: 20,
        code_type: Some(CodeType::Percentage),
        usage_limit,
        expires_in_days: Some(30),
        reason: Some("seasonal".to_string()),
    }
}

#[tokio::test]
async fn first_time_customers_get_a_welcome_code_exactly_once() {
    let app = TestApp::new().await;
    let discounts = &app.state.services.discounts;

    let issued = discounts
        .check_user_discounts("Luna@Example.com")
        .await
        .expect("lookup")
        .expect("welcome code issued");
    assert!(issued.code.starts_with("WELCOME-"));
    assert_eq!(issued.percentage, 15);
    assert_eq!(issued.email.as_deref(), Some("luna@example.com"));
    assert!(issued.expires_at.is_some());

    // A repeat lookup returns the same live code instead of minting another
    let again = discounts
        .check_user_discounts("luna@example.com")
        .await
        .expect("lookup")
        .expect("existing code returned");
    assert_eq!(again.id, issued.id);
}

#[tokio::test]
async fn customers_with_order_history_get_no_welcome_code() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Hematite Ring", Decimal::new(2_000, 2), 5, 1)
        .await;
    app.reconcile_order("pi_welcome_1", "returning@example.com", vec![(product.id, 1)], 2_000)
        .await;

    let result = app
        .state
        .services
        .discounts
        .check_user_discounts("returning@example.com")
        .await
        .expect("lookup");
    assert!(result.is_none());
}

#[tokio::test]
async fn cancelled_orders_do_not_count_as_history() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Agate Coaster", Decimal::new(1_500, 2), 5, 1)
        .await;
    let order = app
        .reconcile_order("pi_welcome_2", "undecided@example.com", vec![(product.id, 1)], 1_500)
        .await
        .order;
    app.state
        .services
        .orders
        .cancel_order(order.id, "customer_request", None)
        .await
        .expect("cancel");

    let result = app
        .state
        .services
        .discounts
        .check_user_discounts("undecided@example.com")
        .await
        .expect("lookup");
    assert!(result.is_some(), "only non-cancelled orders block the welcome code");
}

#[tokio::test]
async fn expired_codes_are_rejected_even_with_the_valid_flag_set() {
    let app = TestApp::new().await;
    let discounts = &app.state.services.discounts;

    let mut request = shared_code("BYGONE", None);
    request.expires_in_days = Some(-1);
    let expired = discounts.create_discount(request).await.expect("create");
    assert!(expired.is_valid);

    let err = discounts
        .redeem("BYGONE", "luna@example.com")
        .await
        .expect_err("expired code");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn shared_codes_stop_at_their_usage_limit() {
    let app = TestApp::new().await;
    let discounts = &app.state.services.discounts;
    discounts
        .create_discount(shared_code("EQUINOX", Some(2)))
        .await
        .expect("create");

    discounts
        .redeem("EQUINOX", "first@example.com")
        .await
        .expect("first redemption");
    let second = discounts
        .redeem("equinox", "second@example.com")
        .await
        .expect("second redemption, case-insensitive code");
    assert_eq!(second.usage_count, 2);
    assert!(!second.is_valid, "exhausting the limit invalidates the code");

    let err = discounts
        .redeem("EQUINOX", "third@example.com")
        .await
        .expect_err("limit reached");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn concurrent_redemptions_cannot_overrun_a_shared_limit() {
    let app = TestApp::new().await;
    let discounts = &app.state.services.discounts;
    let created = discounts
        .create_discount(shared_code("LASTONE", Some(1)))
        .await
        .expect("create");

    let (a, b) = tokio::join!(
        discounts.redeem("LASTONE", "first@example.com"),
        discounts.redeem("LASTONE", "second@example.com"),
    );
    assert_eq!(
        [&a, &b].iter().filter(|r| r.is_ok()).count(),
        1,
        "exactly one redemption wins the last use"
    );

    let row = DiscountEntity::find_by_id(created.id)
        .one(&*app.state.db)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(row.usage_count, 1);
    assert!(!row.is_valid);
}

#[tokio::test]
async fn personal_codes_only_work_for_their_owner() {
    let app = TestApp::new().await;
    let discounts = &app.state.services.discounts;
    let code = discounts
        .check_user_discounts("owner@example.com")
        .await
        .expect("lookup")
        .expect("welcome code");

    let err = discounts
        .redeem(&code.code, "interloper@example.com")
        .await
        .expect_err("wrong customer");
    assert_matches!(err, ServiceError::ValidationError(_));

    // The owner can still spend it, once
    discounts
        .redeem(&code.code, "owner@example.com")
        .await
        .expect("owner redeems");
    let err = discounts
        .redeem(&code.code, "owner@example.com")
        .await
        .expect_err("single use");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn duplicate_codes_conflict() {
    let app = TestApp::new().await;
    let discounts = &app.state.services.discounts;
    discounts
        .create_discount(shared_code("SOLSTICE", None))
        .await
        .expect("create");

    let err = discounts
        .create_discount(shared_code("solstice", None))
        .await
        .expect_err("codes are upper-cased before the uniqueness check");
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn invalidated_codes_cannot_be_redeemed() {
    let app = TestApp::new().await;
    let discounts = &app.state.services.discounts;
    let created = discounts
        .create_discount(shared_code("PAUSED", None))
        .await
        .expect("create");

    let invalidated = discounts.invalidate(created.id).await.expect("invalidate");
    assert!(!invalidated.is_valid);

    let err = discounts
        .redeem("PAUSED", "luna@example.com")
        .await
        .expect_err("invalidated code");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn percentage_bounds_are_validated() {
    let app = TestApp::new().await;
    let mut request = shared_code("TOOBIG", None);
    request.percentage = 150;

    let err = app
        .state
        .services
        .discounts
        .create_discount(request)
        .await
        .expect_err("percentage above 100");
    assert_matches!(err, ServiceError::ValidationError(_));
}
