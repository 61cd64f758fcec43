use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::PaymentMethod;
use crate::errors::ErrorKind;

/// Domain events emitted once the work that produced them has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Checkout events
    CheckoutCompleted {
        transaction_id: Uuid,
        user_id: Uuid,
        total: Decimal,
        payment_method: PaymentMethod,
        order_ids: Vec<Uuid>,
        completed_at: DateTime<Utc>,
    },
    CheckoutFailed {
        user_id: Uuid,
        kind: ErrorKind,
        message: String,
    },

    // Order events
    OrderCreated {
        order_id: Uuid,
        transaction_id: Uuid,
        seller_id: Uuid,
        total: Decimal,
    },

    // Stock events
    StockReserved {
        variant_id: Uuid,
        quantity: i32,
        remaining: i32,
    },
    StockReplenished {
        variant_id: Uuid,
        quantity: i32,
        stock: i32,
    },

    // Wallet events
    WalletDebited {
        wallet_id: Uuid,
        transaction_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
    },
    WalletCredited {
        wallet_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
    },

    // Cart events
    CartItemAdded {
        user_id: Uuid,
        item_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        user_id: Uuid,
        item_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving half of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when nobody is listening.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Drains the channel, logging each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CheckoutCompleted {
                transaction_id,
                user_id,
                total,
                order_ids,
                ..
            } => {
                info!(
                    %transaction_id,
                    %user_id,
                    %total,
                    orders = order_ids.len(),
                    "checkout completed"
                );
            }
            Event::CheckoutFailed {
                user_id,
                kind,
                message,
            } => {
                warn!(%user_id, %kind, "checkout failed: {}", message);
            }
            Event::StockReserved {
                variant_id,
                remaining,
                ..
            } if *remaining == 0 => {
                warn!(%variant_id, "variant sold out");
            }
            other => info!("Received event: {:?}", other),
        }
    }

    warn!("Event processing loop has ended");
}
