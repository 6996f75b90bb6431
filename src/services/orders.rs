use crate::{
    db::DbPool,
    entities::order::{
        self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentStatus,
    },
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    entities::order_status_history::{
        self, ActiveModel as HistoryActiveModel, Entity as HistoryEntity, Model as HistoryModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Cancellation reason that triggers a stock restore.
pub const REASON_OUT_OF_STOCK: &str = "out_of_stock";

/// Order lifecycle management: validated transitions, append-only history,
/// and transactional cancellation side effects.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    inventory: InventoryService,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        inventory: InventoryService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            inventory,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        let db = &*self.db_pool;
        OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderItemModel>, ServiceError> {
        let db = &*self.db_pool;
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?)
    }

    pub async fn get_history(&self, order_id: Uuid) -> Result<Vec<HistoryModel>, ServiceError> {
        let db = &*self.db_pool;
        Ok(HistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(db)
            .await?)
    }

    /// Public order tracking by order number.
    #[instrument(skip(self))]
    pub async fn track_by_number(
        &self,
        order_number: &str,
    ) -> Result<(OrderModel, Vec<HistoryModel>), ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_number} not found")))?;
        let history = self.get_history(order.id).await?;
        Ok((order, history))
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let db = &*self.db_pool;
        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status.as_str()));
        }
        let paginator = query.paginate(db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Moves an order along the fulfillment path. Cancellation has its own
    /// operation because of its side effects; this path rejects it.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
        actor: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        if new_status == OrderStatus::Cancelled {
            return Err(ServiceError::ValidationError(
                "Use the cancellation operation to cancel an order".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let current = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let current_status = current.status().ok_or_else(|| {
            ServiceError::InternalError(format!("Order {order_id} has unknown status"))
        })?;

        if !current_status.can_transition_to(new_status) {
            txn.rollback().await?;
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot move order from {current_status} to {new_status}"
            )));
        }

        let updated = self
            .write_transition(&txn, &current, new_status, note, actor)
            .await?;
        txn.commit().await?;

        info!(old = %current_status, new = %new_status, "order status changed");
        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::OrderStatusChanged {
                    order_id,
                    old_status: current_status.as_str().to_string(),
                    new_status: new_status.as_str().to_string(),
                })
                .await;
        }
        Ok(updated)
    }

    /// Cancels an order that has not shipped. In one transaction: status
    /// and cancellation fields, a refunded flag for paid orders (no
    /// provider call is made), the history row, and a stock restore when
    /// the cancellation was for missing stock.
    #[instrument(skip(self), fields(order_id = %order_id, reason = %reason))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: &str,
        cancelled_by: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let current = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let current_status = current.status().ok_or_else(|| {
            ServiceError::InternalError(format!("Order {order_id} has unknown status"))
        })?;

        if !current_status.can_transition_to(OrderStatus::Cancelled) {
            txn.rollback().await?;
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot cancel an order in status {current_status}"
            )));
        }

        let restore_stock = reason == REASON_OUT_OF_STOCK;
        if restore_stock {
            self.inventory.restore_for_order(&txn, order_id).await?;
        }

        let was_paid = current.payment_status() == Some(PaymentStatus::Paid);
        let now = Utc::now();

        let mut active: order::ActiveModel = current.clone().into();
        active.status = Set(OrderStatus::Cancelled.as_str().to_string());
        active.cancellation_reason = Set(Some(reason.to_string()));
        active.cancelled_at = Set(Some(now));
        active.cancelled_by = Set(cancelled_by.clone());
        if was_paid {
            active.payment_status = Set(PaymentStatus::Refunded.as_str().to_string());
        }
        active.version = Set(current.version + 1);
        active.updated_at = Set(Some(now));
        let updated = active.update(&txn).await?;

        let note = if was_paid {
            format!("Cancelled ({reason}); payment marked refunded")
        } else {
            format!("Cancelled ({reason})")
        };
        append_history(&txn, order_id, OrderStatus::Cancelled, Some(note), cancelled_by).await?;

        txn.commit().await?;
        info!(restored = restore_stock, "order cancelled");

        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::OrderCancelled {
                    order_id,
                    reason: reason.to_string(),
                    stock_restored: restore_stock,
                })
                .await;
        }
        Ok(updated)
    }

    async fn write_transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: &OrderModel,
        new_status: OrderStatus,
        note: Option<String>,
        actor: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let mut active: order::ActiveModel = current.clone().into();
        active.status = Set(new_status.as_str().to_string());
        active.version = Set(current.version + 1);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(conn).await?;

        append_history(conn, current.id, new_status, note, actor).await?;
        Ok(updated)
    }
}

/// Appends the single history row recorded for a transition.
pub async fn append_history<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    status: OrderStatus,
    note: Option<String>,
    created_by: Option<String>,
) -> Result<HistoryModel, ServiceError> {
    let row = HistoryActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(status.as_str().to_string()),
        note: Set(note),
        created_by: Set(created_by),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await;

    row.map_err(|e| {
        warn!(%order_id, error = %e, "failed to append status history");
        e.into()
    })
}
