mod common;

use assert_matches::assert_matches;
use common::TestApp;
use crystal_commerce_api::{
    entities::inventory_log_entry::{Column as LedgerColumn, Entity as LedgerEntity, EntryType},
    entities::order::{OrderStatus, PaymentStatus},
    errors::ServiceError,
    services::orders::REASON_OUT_OF_STOCK,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use test_case::test_case;

#[test_case(OrderStatus::Pending, OrderStatus::Processing, true ; "pending to processing")]
#[test_case(OrderStatus::Pending, OrderStatus::Shipped, false ; "pending cannot skip to shipped")]
#[test_case(OrderStatus::Pending, OrderStatus::Delivered, false ; "pending cannot skip to delivered")]
#[test_case(OrderStatus::Pending, OrderStatus::Cancelled, true ; "pending to cancelled")]
#[test_case(OrderStatus::Processing, OrderStatus::Pending, false ; "processing cannot reverse")]
#[test_case(OrderStatus::Processing, OrderStatus::Shipped, true ; "processing to shipped")]
#[test_case(OrderStatus::Processing, OrderStatus::Delivered, false ; "processing cannot skip to delivered")]
#[test_case(OrderStatus::Processing, OrderStatus::Cancelled, true ; "processing to cancelled")]
#[test_case(OrderStatus::Shipped, OrderStatus::Processing, false ; "shipped cannot reverse")]
#[test_case(OrderStatus::Shipped, OrderStatus::Delivered, true ; "shipped to delivered")]
#[test_case(OrderStatus::Shipped, OrderStatus::Cancelled, false ; "shipped cannot be cancelled")]
#[test_case(OrderStatus::Delivered, OrderStatus::Shipped, false ; "delivered is terminal")]
#[test_case(OrderStatus::Delivered, OrderStatus::Cancelled, false ; "delivered cannot be cancelled")]
#[test_case(OrderStatus::Cancelled, OrderStatus::Pending, false ; "cancelled is terminal")]
#[test_case(OrderStatus::Cancelled, OrderStatus::Cancelled, false ; "cancelled cannot re-cancel")]
fn transition_table(from: OrderStatus, to: OrderStatus, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[tokio::test]
async fn fulfillment_path_walks_forward_and_records_history() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Clear Quartz Point", Decimal::new(2_500, 2), 10, 2)
        .await;
    let outcome = app
        .reconcile_order("pi_lifecycle_1", "luna@example.com", vec![(product.id, 1)], 2_500)
        .await;
    let order = outcome.order;
    assert_eq!(order.status(), Some(OrderStatus::Processing));

    let orders = &app.state.services.orders;
    let shipped = orders
        .update_status(
            order.id,
            OrderStatus::Shipped,
            Some("Handed to carrier".to_string()),
            Some("staff@crystalshop.example".to_string()),
        )
        .await
        .expect("processing moves to shipped");
    assert_eq!(shipped.status(), Some(OrderStatus::Shipped));
    assert_eq!(shipped.version, order.version + 1);

    let delivered = orders
        .update_status(order.id, OrderStatus::Delivered, None, None)
        .await
        .expect("shipped moves to delivered");
    assert_eq!(delivered.status(), Some(OrderStatus::Delivered));

    let history = orders.get_history(order.id).await.expect("history");
    let statuses: Vec<&str> = history.iter().map(|h| h.status.as_str()).collect();
    assert_eq!(statuses, vec!["processing", "shipped", "delivered"]);
    assert_eq!(
        history[1].created_by.as_deref(),
        Some("staff@crystalshop.example")
    );
    assert_eq!(history[1].note.as_deref(), Some("Handed to carrier"));
}

#[tokio::test]
async fn skipping_states_is_rejected() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Tigers Eye Sphere", Decimal::new(3_100, 2), 5, 1)
        .await;
    let order = app
        .reconcile_order("pi_lifecycle_2", "luna@example.com", vec![(product.id, 1)], 3_100)
        .await
        .order;

    let err = app
        .state
        .services
        .orders
        .update_status(order.id, OrderStatus::Delivered, None, None)
        .await
        .expect_err("processing cannot jump to delivered");
    assert_matches!(err, ServiceError::InvalidTransition(_));

    // Nothing was written
    let current = app
        .state
        .services
        .orders
        .get_order(order.id)
        .await
        .expect("order");
    assert_eq!(current.status(), Some(OrderStatus::Processing));
    assert_eq!(current.version, order.version);
}

#[tokio::test]
async fn cancellation_must_use_the_cancel_operation() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Fluorite Tower", Decimal::new(4_400, 2), 5, 1)
        .await;
    let order = app
        .reconcile_order("pi_lifecycle_3", "luna@example.com", vec![(product.id, 1)], 4_400)
        .await
        .order;

    let err = app
        .state
        .services
        .orders
        .update_status(order.id, OrderStatus::Cancelled, None, None)
        .await
        .expect_err("status update rejects cancelled");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn cancelling_a_paid_order_flags_the_refund_and_writes_one_history_row() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Selenite Wand", Decimal::new(1_800, 2), 8, 1)
        .await;
    let order = app
        .reconcile_order("pi_cancel_1", "luna@example.com", vec![(product.id, 2)], 3_600)
        .await
        .order;
    assert_eq!(order.payment_status(), Some(PaymentStatus::Paid));

    let cancelled = app
        .state
        .services
        .orders
        .cancel_order(order.id, "customer_request", Some("admin@crystalshop.example".to_string()))
        .await
        .expect("cancel succeeds");

    assert_eq!(cancelled.status(), Some(OrderStatus::Cancelled));
    assert_eq!(cancelled.payment_status(), Some(PaymentStatus::Refunded));
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("customer_request"));
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(
        cancelled.cancelled_by.as_deref(),
        Some("admin@crystalshop.example")
    );

    let history = app
        .state
        .services
        .orders
        .get_history(order.id)
        .await
        .expect("history");
    let cancel_rows: Vec<_> = history
        .iter()
        .filter(|h| h.status == OrderStatus::Cancelled.as_str())
        .collect();
    assert_eq!(cancel_rows.len(), 1);
    assert_eq!(
        cancel_rows[0].note.as_deref(),
        Some("Cancelled (customer_request); payment marked refunded")
    );

    // A plain cancellation does not restore stock
    let product_after = app
        .state
        .services
        .catalog
        .get(product.id)
        .await
        .expect("product");
    assert_eq!(product_after.stock_quantity, 6);
}

#[tokio::test]
async fn out_of_stock_cancellation_restores_the_sold_quantities() {
    let app = TestApp::new().await;
    let quartz = app
        .seed_product("Smoky Quartz Cluster", Decimal::new(5_200, 2), 4, 1)
        .await;
    let jade = app
        .seed_product("Jade Bangle", Decimal::new(9_900, 2), 6, 1)
        .await;
    let order = app
        .reconcile_order(
            "pi_cancel_2",
            "luna@example.com",
            vec![(quartz.id, 3), (jade.id, 2)],
            35_400,
        )
        .await
        .order;

    assert_eq!(
        app.state.services.catalog.get(quartz.id).await.unwrap().stock_quantity,
        1
    );

    app.state
        .services
        .orders
        .cancel_order(order.id, REASON_OUT_OF_STOCK, None)
        .await
        .expect("cancel succeeds");

    assert_eq!(
        app.state.services.catalog.get(quartz.id).await.unwrap().stock_quantity,
        4
    );
    assert_eq!(
        app.state.services.catalog.get(jade.id).await.unwrap().stock_quantity,
        6
    );

    // The restore is itself ledgered against the order, as corrective
    // adjustments rather than supplier restocks
    let restores = LedgerEntity::find()
        .filter(LedgerColumn::Reference.eq(order.id.to_string()))
        .filter(LedgerColumn::EntryType.eq(EntryType::Adjustment.as_str()))
        .all(&*app.state.db)
        .await
        .expect("ledger rows");
    assert_eq!(restores.len(), 2);
    assert!(restores
        .iter()
        .all(|e| e.reason.as_deref() == Some("order_cancelled")));
    assert!(restores.iter().all(|e| e.quantity > 0));
}

#[tokio::test]
async fn shipped_orders_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Malachite Egg", Decimal::new(6_700, 2), 5, 1)
        .await;
    let order = app
        .reconcile_order("pi_cancel_3", "luna@example.com", vec![(product.id, 1)], 6_700)
        .await
        .order;

    app.state
        .services
        .orders
        .update_status(order.id, OrderStatus::Shipped, None, None)
        .await
        .expect("ship the order");

    let err = app
        .state
        .services
        .orders
        .cancel_order(order.id, "changed_mind", None)
        .await
        .expect_err("shipped orders are not cancellable");
    assert_matches!(err, ServiceError::InvalidTransition(_));
}

#[tokio::test]
async fn tracking_by_order_number_returns_order_and_timeline() {
    let app = TestApp::new().await;
    let product = app
        .seed_product("Lapis Lazuli Pendant", Decimal::new(7_300, 2), 5, 1)
        .await;
    let order = app
        .reconcile_order("pi_track_1", "luna@example.com", vec![(product.id, 1)], 7_300)
        .await
        .order;

    let (tracked, history) = app
        .state
        .services
        .orders
        .track_by_number(&order.order_number)
        .await
        .expect("tracking succeeds");
    assert_eq!(tracked.id, order.id);
    assert_eq!(history.len(), 1);

    let err = app
        .state
        .services
        .orders
        .track_by_number("CRY-19700101-XXXXXX")
        .await
        .expect_err("unknown number");
    assert_matches!(err, ServiceError::NotFound(_));
}
