use crate::notifications::{LowStockAlert, NotificationSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events emitted by the service layer. Consumers must never affect the
/// outcome of the transaction that produced the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
        stock_restored: bool,
    },

    // Inventory events
    StockAdjusted {
        product_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        entry_type: String,
    },
    LowStock {
        product_id: Uuid,
        product_name: String,
        quantity: i32,
        threshold: i32,
    },

    // Discount events
    DiscountIssued {
        code: String,
        email: Option<String>,
    },
    DiscountRedeemed {
        code: String,
        email: String,
    },

    // Payment events
    PaymentReconciled {
        order_id: Uuid,
        payment_intent_id: String,
        duplicate: bool,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event. Failures are reported but callers treat them as
    /// non-fatal; the originating transaction has already committed.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "event channel closed, event dropped");
        }
    }
}

/// Creates the event channel used to wire services to the consumer task.
pub fn event_channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Consumer loop. Logs every event; low-stock events are forwarded to the
/// notification sink. Runs until the channel closes.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>, sink: Arc<dyn NotificationSink>) {
    info!("event consumer started");
    while let Some(event) = receiver.recv().await {
        debug!(?event, "processing event");
        match event {
            Event::LowStock {
                product_id,
                product_name,
                quantity,
                threshold,
            } => {
                let alert = LowStockAlert {
                    product_id,
                    product_name,
                    quantity,
                    threshold,
                };
                if let Err(e) = sink.notify_low_stock(alert).await {
                    error!(%product_id, error = %e, "low stock notification failed");
                }
            }
            Event::OrderCancelled {
                order_id,
                ref reason,
                stock_restored,
            } => {
                info!(%order_id, reason, stock_restored, "order cancelled");
            }
            other => {
                debug!(event = ?other, "no consumer action");
            }
        }
    }
    info!("event consumer stopped");
}
