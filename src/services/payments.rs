use crate::{
    db::DbPool,
    entities::checkout_draft::{
        self, ActiveModel as DraftActiveModel, Entity as DraftEntity, Model as DraftModel,
    },
    entities::inventory_log_entry::EntryType,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentStatus},
    entities::order_item::ActiveModel as OrderItemActiveModel,
    entities::product::Entity as ProductEntity,
    entities::shipping_address::ActiveModel as AddressActiveModel,
    entities::user::{self, ActiveModel as UserActiveModel, Entity as UserEntity, ROLE_CUSTOMER},
    errors::ServiceError,
    events::{Event, EventSender},
    services::discounts::DiscountService,
    services::inventory::{AdjustStockRequest, InventoryService},
    services::orders::append_history,
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_MAX_ATTEMPTS: usize = 3;
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;
const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Metadata keys recognized on the payment intent.
const META_DRAFT_ID: &str = "checkout_draft_id";
const META_INLINE: &str = "order_payload";
const META_CHUNK_PREFIX: &str = "order_payload_";

/// Order payload carried through the payment provider (or a checkout
/// draft). Amounts are authoritative for the stored order; the provider's
/// paid amount is cross-checked against the total.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WebhookOrderPayload {
    pub email: String,
    pub name: Option<String>,
    pub items: Vec<PayloadItem>,
    pub shipping_address: Option<PayloadAddress>,
    pub discount_code: Option<String>,
    #[serde(default)]
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PayloadItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PayloadAddress {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub order: OrderModel,
    pub duplicate: bool,
}

/// Turns confirmed payment events into orders, exactly once per
/// payment intent.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    inventory: InventoryService,
    discounts: DiscountService,
    event_sender: Option<Arc<EventSender>>,
    default_currency: String,
}

impl PaymentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        inventory: InventoryService,
        discounts: DiscountService,
        event_sender: Option<Arc<EventSender>>,
        default_currency: String,
    ) -> Self {
        Self {
            db_pool,
            inventory,
            discounts,
            event_sender,
            default_currency,
        }
    }

    /// Stores a checkout draft so the payment intent only needs to carry
    /// its id.
    #[instrument(skip(self, payload))]
    pub async fn create_draft(
        &self,
        payload: &WebhookOrderPayload,
    ) -> Result<DraftModel, ServiceError> {
        let db = &*self.db_pool;
        let draft = DraftActiveModel {
            id: Set(Uuid::new_v4()),
            payload: Set(serde_json::to_string(payload)?),
            email: Set(Some(payload.email.to_ascii_lowercase())),
            created_at: Set(Utc::now()),
            consumed_at: Set(None),
        }
        .insert(db)
        .await?;
        info!(draft_id = %draft.id, "checkout draft created");
        Ok(draft)
    }

    /// Resolves the order payload from intent metadata. Sources in order:
    /// a checkout draft reference, the inline payload, then reassembled
    /// `order_payload_0..n` chunks (providers cap metadata value length,
    /// so large carts arrive split).
    #[instrument(skip(self, metadata))]
    pub async fn resolve_payload(
        &self,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<WebhookOrderPayload, ServiceError> {
        if let Some(draft_id) = metadata.get(META_DRAFT_ID).and_then(|v| v.as_str()) {
            let id = Uuid::parse_str(draft_id).map_err(|_| {
                ServiceError::ValidationError(format!("Invalid checkout draft id {draft_id}"))
            })?;
            return self.consume_draft(id).await;
        }

        if let Some(inline) = metadata.get(META_INLINE).and_then(|v| v.as_str()) {
            return Ok(serde_json::from_str(inline)?);
        }

        let mut raw = String::new();
        let mut index = 0usize;
        while let Some(chunk) = metadata
            .get(&format!("{META_CHUNK_PREFIX}{index}"))
            .and_then(|v| v.as_str())
        {
            raw.push_str(chunk);
            index += 1;
        }
        if raw.is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment metadata carries no order payload".to_string(),
            ));
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn consume_draft(&self, id: Uuid) -> Result<WebhookOrderPayload, ServiceError> {
        let db = &*self.db_pool;
        let draft = DraftEntity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Checkout draft {id} not found")))?;

        let payload: WebhookOrderPayload = serde_json::from_str(&draft.payload)?;

        // Consumption is informational; reconciliation idempotency comes
        // from the payment intent, not the draft.
        if draft.consumed_at.is_none() {
            let mut active: checkout_draft::ActiveModel = draft.into();
            active.consumed_at = Set(Some(Utc::now()));
            active.update(db).await?;
        }
        Ok(payload)
    }

    /// Idempotent reconciliation of a confirmed payment into an order.
    /// Replays and concurrent duplicate deliveries converge on the first
    /// order created for the payment intent.
    #[instrument(skip(self, payload), fields(payment_intent_id = %payment_intent_id))]
    pub async fn reconcile(
        &self,
        payment_intent_id: &str,
        amount_paid_cents: i64,
        payload: WebhookOrderPayload,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let db = &*self.db_pool;

        if let Some(existing) = self.find_by_intent(payment_intent_id).await? {
            info!(order_id = %existing.id, "duplicate webhook delivery, returning existing order");
            self.publish_reconciled(&existing, payment_intent_id, true).await;
            return Ok(ReconcileOutcome {
                order: existing,
                duplicate: true,
            });
        }

        let email = payload.email.trim().to_ascii_lowercase();
        if email.is_empty() || payload.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order payload requires an email and at least one item".to_string(),
            ));
        }

        let txn = db.begin().await?;
        let build = self
            .build_order(&txn, payment_intent_id, amount_paid_cents, &payload, &email)
            .await;

        let order = match build {
            Ok(order) => {
                txn.commit().await?;
                order
            }
            Err(e) => {
                txn.rollback().await?;
                // Lost the insert race: the winner's order is the answer
                if is_unique_violation(&e) {
                    if let Some(existing) = self.find_by_intent(payment_intent_id).await? {
                        info!(order_id = %existing.id, "reconcile race lost, using existing order");
                        self.publish_reconciled(&existing, payment_intent_id, true).await;
                        return Ok(ReconcileOutcome {
                            order: existing,
                            duplicate: true,
                        });
                    }
                }
                return Err(e);
            }
        };

        info!(order_id = %order.id, order_number = %order.order_number, "order reconciled from payment");

        // Personal discount burn is best-effort after the order exists
        if let Some(code) = &payload.discount_code {
            if let Err(e) = self.discounts.redeem(code, &email).await {
                warn!(code, error = %e, "post-reconcile discount redemption failed");
            }
        }

        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::OrderCreated {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                })
                .await;
        }
        self.publish_reconciled(&order, payment_intent_id, false).await;

        Ok(ReconcileOutcome {
            order,
            duplicate: false,
        })
    }

    async fn find_by_intent(&self, intent: &str) -> Result<Option<OrderModel>, ServiceError> {
        let db = &*self.db_pool;
        Ok(OrderEntity::find()
            .filter(order::Column::PaymentIntentId.eq(intent))
            .one(db)
            .await?)
    }

    async fn build_order<C: ConnectionTrait>(
        &self,
        txn: &C,
        payment_intent_id: &str,
        amount_paid_cents: i64,
        payload: &WebhookOrderPayload,
        email: &str,
    ) -> Result<OrderModel, ServiceError> {
        let user = self.resolve_user(txn, email, payload.name.as_deref()).await?;

        let address_id = match &payload.shipping_address {
            Some(address) => Some(
                AddressActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user.id),
                    recipient: Set(address.recipient.clone()),
                    line1: Set(address.line1.clone()),
                    line2: Set(address.line2.clone()),
                    city: Set(address.city.clone()),
                    region: Set(address.region.clone()),
                    postal_code: Set(address.postal_code.clone()),
                    country: Set(address.country.clone()),
                    phone: Set(address.phone.clone()),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await?
                .id,
            ),
            None => None,
        };

        // Price snapshots come from the catalog at reconciliation time
        let mut lines = Vec::with_capacity(payload.items.len());
        let mut subtotal = Decimal::ZERO;
        for item in &payload.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "Item quantities must be positive".to_string(),
                ));
            }
            let product = ProductEntity::find_by_id(item.product_id)
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
            subtotal += product.price * Decimal::from(item.quantity);
            lines.push((product, item.quantity));
        }

        let total_amount =
            subtotal + payload.shipping_cost + payload.tax_amount - payload.discount_amount;
        let paid = Decimal::new(amount_paid_cents, 2);
        let amount_note = if paid != total_amount {
            warn!(%paid, %total_amount, "paid amount differs from payload total");
            Some(format!(
                "Order created from payment {payment_intent_id}; provider amount {paid} differs from order total {total_amount}"
            ))
        } else {
            Some(format!("Order created from payment {payment_intent_id}"))
        };

        let order_id = Uuid::new_v4();
        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            user_id: Set(user.id),
            status: Set(OrderStatus::Processing.as_str().to_string()),
            payment_status: Set(PaymentStatus::Paid.as_str().to_string()),
            payment_intent_id: Set(Some(payment_intent_id.to_string())),
            subtotal: Set(subtotal),
            shipping_cost: Set(payload.shipping_cost),
            tax_amount: Set(payload.tax_amount),
            discount_amount: Set(payload.discount_amount),
            total_amount: Set(total_amount),
            currency: Set(payload
                .currency
                .clone()
                .unwrap_or_else(|| self.default_currency.clone())),
            shipping_address_id: Set(address_id),
            cancellation_reason: Set(None),
            cancelled_at: Set(None),
            cancelled_by: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            version: Set(1),
        };

        // An order-number collision is also a unique violation; retry with
        // a fresh number before giving up
        let order = insert_order_with_retries(txn, order_model, payment_intent_id).await?;

        for (product, quantity) in &lines {
            OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(product.id),
                name: Set(product.name.clone()),
                quantity: Set(*quantity),
                unit_price: Set(product.price),
                created_at: Set(Utc::now()),
            }
            .insert(txn)
            .await?;

            self.inventory
                .apply_adjustment(
                    txn,
                    &AdjustStockRequest {
                        product_id: product.id,
                        delta: -*quantity,
                        entry_type: EntryType::Sale,
                        reason: Some("order_sale".to_string()),
                        reference: Some(order.id.to_string()),
                    },
                )
                .await?;
        }

        append_history(txn, order.id, OrderStatus::Processing, amount_note, None).await?;
        Ok(order)
    }

    async fn resolve_user<C: ConnectionTrait>(
        &self,
        txn: &C,
        email: &str,
        name: Option<&str>,
    ) -> Result<user::Model, ServiceError> {
        if let Some(existing) = UserEntity::find()
            .filter(user::Column::Email.eq(email))
            .one(txn)
            .await?
        {
            return Ok(existing);
        }

        let created = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            name: Set(name.map(str::to_string)),
            password_hash: Set(None),
            role: Set(ROLE_CUSTOMER.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await;

        match created {
            Ok(user) => Ok(user),
            // Concurrent creation of the same customer
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                UserEntity::find()
                    .filter(user::Column::Email.eq(email))
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::InternalError("User row vanished".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish_reconciled(&self, order: &OrderModel, intent: &str, duplicate: bool) {
        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::PaymentReconciled {
                    order_id: order.id,
                    payment_intent_id: intent.to_string(),
                    duplicate,
                })
                .await;
        }
    }
}

async fn insert_order_with_retries<C: ConnectionTrait>(
    txn: &C,
    mut model: order::ActiveModel,
    payment_intent_id: &str,
) -> Result<OrderModel, ServiceError> {
    for attempt in 1..=ORDER_NUMBER_MAX_ATTEMPTS {
        match model.clone().insert(txn).await {
            Ok(order) => return Ok(order),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(detail)) => {
                    // The payment-intent constraint means a concurrent
                    // reconcile won; propagate so the caller re-reads.
                    // Only an order-number collision is retriable here.
                    if detail.contains("order_number") && attempt < ORDER_NUMBER_MAX_ATTEMPTS {
                        warn!(attempt, "order number collision, regenerating");
                        model.order_number = Set(generate_order_number());
                        continue;
                    }
                    return Err(ServiceError::Conflict(format!(
                        "Order for payment {payment_intent_id} already exists"
                    )));
                }
                _ => return Err(e.into()),
            },
        }
    }
    unreachable!("loop always returns")
}

fn is_unique_violation(err: &ServiceError) -> bool {
    match err {
        ServiceError::DatabaseError(db_err) => {
            matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        }
        ServiceError::Conflict(_) => true,
        _ => false,
    }
}

/// `CRY-{yyyymmdd}-{6 base36 chars}`. Collisions are negligible and backed
/// by the unique index plus regeneration.
pub fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("CRY-{date}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrator::Migrator;
    use assert_matches::assert_matches;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    async fn test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        Migrator::up(&db, None).await.expect("migrations");
        db
    }

    fn order_model(order_number: &str, intent: &str) -> order::ActiveModel {
        order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.to_string()),
            user_id: Set(Uuid::new_v4()),
            status: Set(OrderStatus::Processing.as_str().to_string()),
            payment_status: Set(PaymentStatus::Paid.as_str().to_string()),
            payment_intent_id: Set(Some(intent.to_string())),
            subtotal: Set(Decimal::new(2_500, 2)),
            shipping_cost: Set(Decimal::ZERO),
            tax_amount: Set(Decimal::ZERO),
            discount_amount: Set(Decimal::ZERO),
            total_amount: Set(Decimal::new(2_500, 2)),
            currency: Set("EUR".to_string()),
            shipping_address_id: Set(None),
            cancellation_reason: Set(None),
            cancelled_at: Set(None),
            cancelled_by: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            version: Set(1),
        }
    }

    #[tokio::test]
    async fn order_number_collision_regenerates_and_inserts() {
        let db = test_db().await;
        insert_order_with_retries(&db, order_model("CRY-20260101-AAAAAA", "pi_first"), "pi_first")
            .await
            .expect("first insert");

        // Same number, different payment: retried under a fresh number
        let second =
            insert_order_with_retries(&db, order_model("CRY-20260101-AAAAAA", "pi_second"), "pi_second")
                .await
                .expect("collision resolved by regeneration");
        assert_ne!(second.order_number, "CRY-20260101-AAAAAA");
        assert_eq!(second.payment_intent_id.as_deref(), Some("pi_second"));
    }

    #[tokio::test]
    async fn payment_intent_collision_is_not_retried() {
        let db = test_db().await;
        insert_order_with_retries(&db, order_model("CRY-20260101-BBBBBB", "pi_dup"), "pi_dup")
            .await
            .expect("first insert");

        // A duplicate intent means a concurrent reconcile already won;
        // regenerating numbers would not help
        let err =
            insert_order_with_retries(&db, order_model("CRY-20260101-CCCCCC", "pi_dup"), "pi_dup")
                .await
                .expect_err("duplicate payment intent");
        assert_matches!(err, ServiceError::Conflict(_));
    }

    #[test]
    fn order_number_shape() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CRY");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn chunked_payload_reassembly_order() {
        // Keys iterate by explicit index, not map order
        let mut metadata = serde_json::Map::new();
        metadata.insert("order_payload_1".into(), serde_json::json!("\"b\":1}"));
        metadata.insert("order_payload_0".into(), serde_json::json!("{\"a\":0,"));

        let mut raw = String::new();
        let mut index = 0usize;
        while let Some(chunk) = metadata
            .get(&format!("order_payload_{index}"))
            .and_then(|v| v.as_str())
        {
            raw.push_str(chunk);
            index += 1;
        }
        assert_eq!(raw, "{\"a\":0,\"b\":1}");
    }
}
