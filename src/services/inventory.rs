use crate::{
    db::DbPool,
    entities::inventory_log_entry::{
        self, ActiveModel as LedgerActiveModel, Entity as LedgerEntity, EntryType,
        Model as LedgerModel,
    },
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::product::{self, Entity as ProductEntity, Model as ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Bounded retries for the stock compare-and-swap.
const CAS_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    /// Signed delta; negative reduces stock
    pub delta: i32,
    pub entry_type: EntryType,
    pub reason: Option<String>,
    /// Optional order id the adjustment traces back to
    pub reference: Option<String>,
}

/// Inventory ledger service. The product counter is a cache of the ledger;
/// every counter mutation goes through here so the two stay in lockstep.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Applies one adjustment on the given connection: counter update plus
    /// ledger insert. The counter update is a compare-and-swap against the
    /// stock value read at the start, so a concurrent writer surfaces as
    /// `Conflict` instead of a silent lost update. Callers embedding this in
    /// a larger transaction decide whether to retry or roll back.
    pub async fn apply_adjustment<C: ConnectionTrait>(
        &self,
        conn: &C,
        request: &AdjustStockRequest,
    ) -> Result<(LedgerModel, ProductModel), ServiceError> {
        let product = ProductEntity::find_by_id(request.product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        let previous = product.stock_quantity;
        let new_quantity = previous + request.delta;

        if new_quantity < 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "{}: requested {}, available {}",
                product.name,
                request.delta.unsigned_abs(),
                previous
            )));
        }

        if !cas_update_counter(conn, request.product_id, previous, new_quantity).await? {
            return Err(ServiceError::Conflict(format!(
                "Stock level for product {} changed concurrently",
                request.product_id
            )));
        }

        let entry = LedgerActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(request.product_id),
            entry_type: Set(request.entry_type.as_str().to_string()),
            quantity: Set(request.delta),
            previous_quantity: Set(previous),
            new_quantity: Set(new_quantity),
            reason: Set(request.reason.clone()),
            reference: Set(request.reference.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        let mut snapshot = product;
        snapshot.stock_quantity = new_quantity;
        Ok((entry, snapshot))
    }

    /// Standalone adjustment: opens its own transaction and retries the
    /// compare-and-swap a bounded number of times.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, delta = request.delta))]
    pub async fn adjust_stock(
        &self,
        request: AdjustStockRequest,
    ) -> Result<LedgerModel, ServiceError> {
        let db = &*self.db_pool;

        for attempt in 1..=CAS_MAX_ATTEMPTS {
            let txn = db.begin().await?;
            match self.apply_adjustment(&txn, &request).await {
                Ok((entry, snapshot)) => {
                    txn.commit().await?;
                    info!(
                        entry_id = %entry.id,
                        new_quantity = entry.new_quantity,
                        "stock adjusted"
                    );
                    self.publish_adjustment(&entry, &snapshot).await;
                    return Ok(entry);
                }
                Err(ServiceError::Conflict(_)) if attempt < CAS_MAX_ATTEMPTS => {
                    txn.rollback().await?;
                    warn!(attempt, "stock CAS conflict, retrying");
                }
                Err(e) => {
                    txn.rollback().await?;
                    return Err(e);
                }
            }
        }

        Err(ServiceError::Conflict(format!(
            "Stock level for product {} kept changing, giving up",
            request.product_id
        )))
    }

    /// Emits the post-commit events for an adjustment. Low-stock alerting
    /// is fire-and-forget; it never affects the adjustment outcome.
    pub async fn publish_adjustment(&self, entry: &LedgerModel, product: &ProductModel) {
        let Some(sender) = &self.event_sender else {
            return;
        };

        sender
            .send(Event::StockAdjusted {
                product_id: entry.product_id,
                old_quantity: entry.previous_quantity,
                new_quantity: entry.new_quantity,
                entry_type: entry.entry_type.clone(),
            })
            .await;

        if entry.new_quantity <= product.low_stock_threshold {
            sender
                .send(Event::LowStock {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: entry.new_quantity,
                    threshold: product.low_stock_threshold,
                })
                .await;
        }
    }

    /// Restores stock sold for an order, on the caller's transaction.
    /// Quantities come from the order's original sale ledger rows; orders
    /// that predate ledger coverage fall back to their item quantities.
    pub async fn restore_for_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<LedgerModel>, ServiceError> {
        let sales = LedgerEntity::find()
            .filter(inventory_log_entry::Column::Reference.eq(order_id.to_string()))
            .filter(inventory_log_entry::Column::EntryType.eq(EntryType::Sale.as_str()))
            .all(conn)
            .await?;

        let mut per_product: BTreeMap<Uuid, i32> = BTreeMap::new();
        if sales.is_empty() {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(conn)
                .await?;
            for item in items {
                *per_product.entry(item.product_id).or_insert(0) += item.quantity;
            }
        } else {
            for sale in sales {
                // Sale deltas are negative; restore the absolute amount
                *per_product.entry(sale.product_id).or_insert(0) += -sale.quantity;
            }
        }

        let mut entries = Vec::with_capacity(per_product.len());
        for (product_id, quantity) in per_product {
            if quantity <= 0 {
                continue;
            }
            let (entry, _) = self
                .apply_adjustment(
                    conn,
                    &AdjustStockRequest {
                        product_id,
                        delta: quantity,
                        entry_type: EntryType::Adjustment,
                        reason: Some("order_cancelled".to_string()),
                        reference: Some(order_id.to_string()),
                    },
                )
                .await?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Paginated ledger history for a product, newest first.
    #[instrument(skip(self))]
    pub async fn list_ledger(
        &self,
        product_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<LedgerModel>, u64), ServiceError> {
        let db = &*self.db_pool;
        let paginator = LedgerEntity::find()
            .filter(inventory_log_entry::Column::ProductId.eq(product_id))
            .order_by_desc(inventory_log_entry::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await?;
        let entries = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((entries, total))
    }

    /// Active products at or below their low-stock threshold.
    #[instrument(skip(self))]
    pub async fn low_stock_report(&self) -> Result<Vec<ProductModel>, ServiceError> {
        let db = &*self.db_pool;
        let products = ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .filter(
                sea_orm::sea_query::Expr::col(product::Column::StockQuantity)
                    .lte(sea_orm::sea_query::Expr::col(
                        product::Column::LowStockThreshold,
                    )),
            )
            .order_by_asc(product::Column::StockQuantity)
            .all(db)
            .await?;
        Ok(products)
    }

    /// Recomputes the counter from the newest ledger entry and repairs any
    /// drift with a corrective adjustment entry. Returns the correction,
    /// or None when the counter already matched.
    #[instrument(skip(self))]
    pub async fn recount(&self, product_id: Uuid) -> Result<Option<LedgerModel>, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let product = ProductEntity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {product_id} not found")))?;

        let newest = LedgerEntity::find()
            .filter(inventory_log_entry::Column::ProductId.eq(product_id))
            .order_by_desc(inventory_log_entry::Column::CreatedAt)
            .order_by_desc(inventory_log_entry::Column::Id)
            .one(&txn)
            .await?;

        // With no ledger history the counter is its own source of truth.
        let expected = match newest {
            Some(entry) => entry.new_quantity,
            None => {
                txn.commit().await?;
                return Ok(None);
            }
        };

        if product.stock_quantity == expected {
            txn.commit().await?;
            return Ok(None);
        }

        error!(
            %product_id,
            counter = product.stock_quantity,
            ledger = expected,
            "inventory counter drift detected"
        );

        let correction = self
            .apply_adjustment(
                &txn,
                &AdjustStockRequest {
                    product_id,
                    delta: expected - product.stock_quantity,
                    entry_type: EntryType::Adjustment,
                    reason: Some("ledger_recount".to_string()),
                    reference: None,
                },
            )
            .await?;
        txn.commit().await?;

        info!(%product_id, repaired_to = expected, "inventory counter repaired");
        Ok(Some(correction.0))
    }
}

/// Guarded counter write: only succeeds when the stored quantity still
/// matches the value the caller read. A writer that lost the race sees
/// `false` and nothing is changed.
async fn cas_update_counter<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    previous: i32,
    new_quantity: i32,
) -> Result<bool, ServiceError> {
    let updated = ProductEntity::update_many()
        .col_expr(
            product::Column::StockQuantity,
            sea_orm::sea_query::Expr::value(new_quantity),
        )
        .col_expr(
            product::Column::Version,
            sea_orm::sea_query::Expr::col(product::Column::Version).add(1),
        )
        .col_expr(
            product::Column::UpdatedAt,
            sea_orm::sea_query::Expr::value(Utc::now()),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::StockQuantity.eq(previous))
        .exec(conn)
        .await?;
    Ok(updated.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrator::Migrator;
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    async fn test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        Migrator::up(&db, None).await.expect("migrations");
        db
    }

    async fn seed_product(db: &DatabaseConnection, stock: i32) -> ProductModel {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Quartz Point".to_string()),
            description: Set(None),
            price: Set(rust_decimal::Decimal::new(1_000, 2)),
            stock_quantity: Set(stock),
            low_stock_threshold: Set(1),
            is_active: Set(true),
            properties: Set(None),
            colors: Set(None),
            images: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(db)
        .await
        .expect("seed product")
    }

    #[tokio::test]
    async fn stale_counter_write_touches_no_rows() {
        let db = test_db().await;
        let product = seed_product(&db, 5).await;

        // A writer holding a stale read loses without changing anything
        let applied = cas_update_counter(&db, product.id, 4, 9)
            .await
            .expect("cas runs");
        assert!(!applied);

        let current = ProductEntity::find_by_id(product.id)
            .one(&db)
            .await
            .expect("query")
            .expect("product");
        assert_eq!(current.stock_quantity, 5);
        assert_eq!(current.version, 1);

        // The same write against the live value lands and bumps the version
        let applied = cas_update_counter(&db, product.id, 5, 9)
            .await
            .expect("cas runs");
        assert!(applied);

        let current = ProductEntity::find_by_id(product.id)
            .one(&db)
            .await
            .expect("query")
            .expect("product");
        assert_eq!(current.stock_quantity, 9);
        assert_eq!(current.version, 2);
    }
}
