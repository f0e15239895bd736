use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Cloneable handle for publishing domain events onto the in-process bus.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the bus is gone.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "event dropped");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCompleted(Uuid),
    PaymentCreated {
        payment_id: Uuid,
        order_id: Uuid,
    },
    PaymentCancelled {
        payment_id: Uuid,
        order_id: Uuid,
    },
    CheckoutStarted {
        payment_id: Uuid,
        session_id: String,
    },
    PaymentCompleted {
        payment_id: Uuid,
        order_id: Uuid,
    },
    /// A settled line whose variant could not cover the ordered quantity
    StockShortfall {
        order_id: Uuid,
        product_id: Uuid,
        size: String,
        color: String,
        requested: i32,
        available: Option<i32>,
    },
    ProductCreated(Uuid),
    ProductDeleted(Uuid),
    AddressCreated {
        address_id: Uuid,
        user_id: Uuid,
    },
    AddressUpdated(Uuid),
}

impl Event {
    /// Snake-case event name used in logs and metric names
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated(_) => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCompleted(_) => "order_completed",
            Event::PaymentCreated { .. } => "payment_created",
            Event::PaymentCancelled { .. } => "payment_cancelled",
            Event::CheckoutStarted { .. } => "checkout_started",
            Event::PaymentCompleted { .. } => "payment_completed",
            Event::StockShortfall { .. } => "stock_shortfall",
            Event::ProductCreated(_) => "product_created",
            Event::ProductDeleted(_) => "product_deleted",
            Event::AddressCreated { .. } => "address_created",
            Event::AddressUpdated(_) => "address_updated",
        }
    }
}

/// Drains the event bus until every sender is dropped.
///
/// Returns the number of events handled.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) -> u64 {
    info!("Starting event processing loop");
    let mut handled = 0u64;

    while let Some(event) = rx.recv().await {
        crate::metrics::increment_counter(&format!("events_{}_total", event.name()));

        match &event {
            Event::StockShortfall {
                order_id,
                product_id,
                size,
                color,
                requested,
                available,
            } => {
                warn!(
                    %order_id,
                    %product_id,
                    size = %size,
                    color = %color,
                    requested,
                    available = ?available,
                    "settled order has a stock shortfall and needs manual fulfilment"
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            other => {
                info!(event = other.name(), payload = ?other, "event received");
            }
        }

        handled += 1;
    }

    info!(handled, "Event processing loop stopped");
    handled
}
