use crate::{
    config::CheckoutConfig,
    entities::{
        order::Model as OrderModel,
        transaction::{self, Model as TransactionModel},
        wallet_transaction, FulfillmentStatus, PaymentMethod,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::voucher_service::{VoucherScope, VoucherService},
        orders::{OrderAssembler, SellerGroup, StockReservation},
        wallet::WalletLedger,
    },
};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DatabaseTransaction, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Cart lines of a single seller inside a checkout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerCart {
    pub seller_id: Uuid,
    #[serde(default)]
    pub voucher_code: String,
    pub cart_item_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub global_voucher_code: String,
    pub cart: Vec<SellerCart>,
    pub payment_method: PaymentMethod,
}

impl CheckoutRequest {
    /// Shape checks that need no database access.
    pub fn validate_against(&self, config: &CheckoutConfig) -> Result<(), ServiceError> {
        if self.cart.is_empty() {
            return Err(ServiceError::ValidationError(
                "Checkout cart must not be empty".to_string(),
            ));
        }

        let mut sellers = HashSet::with_capacity(self.cart.len());
        let mut lines = 0usize;
        for group in &self.cart {
            if group.cart_item_ids.is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "Seller {} has no cart items",
                    group.seller_id
                )));
            }
            if !sellers.insert(group.seller_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Seller {} appears more than once",
                    group.seller_id
                )));
            }
            lines += group.cart_item_ids.len();
        }

        if lines > config.max_lines_per_checkout {
            return Err(ServiceError::ValidationError(format!(
                "Checkout has {} lines, limit is {}",
                lines, config.max_lines_per_checkout
            )));
        }

        Ok(())
    }
}

/// What a caller sees after a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

/// Everything a committed checkout produced, kept until events go out.
struct CheckoutOutcome {
    transaction: TransactionModel,
    orders: Vec<OrderModel>,
    reservations: Vec<StockReservation>,
    wallet_entry: Option<wallet_transaction::Model>,
}

/// Converts a multi-seller cart into one transaction with an order per seller.
///
/// The whole conversion is a single database transaction: vouchers, stock,
/// orders, cart lines and the wallet debit either all commit or none do.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, sellers = request.cart.len()))]
    pub async fn checkout_cart(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutSummary, ServiceError> {
        let started = Instant::now();

        match self.run_checkout(user_id, &request).await {
            Ok(outcome) => {
                histogram!(
                    "marketplace.checkout.duration",
                    started.elapsed().as_secs_f64()
                );
                counter!("marketplace.checkout.completed", 1);

                let summary = CheckoutSummary {
                    user_id,
                    transaction_id: outcome.transaction.id,
                    total: outcome.transaction.total,
                    payment_method: outcome.transaction.payment_method,
                    created_at: outcome.transaction.created_at,
                };

                info!(
                    transaction_id = %summary.transaction_id,
                    total = %summary.total,
                    currency = %self.config.currency,
                    orders = outcome.orders.len(),
                    "Checkout completed"
                );

                self.publish(outcome).await;
                Ok(summary)
            }
            Err(err) => {
                let kind: &'static str = err.kind().into();
                counter!("marketplace.checkout.failed", 1, "kind" => kind);

                if err.status_code().is_server_error() {
                    error!(error = %err, "Checkout failed");
                } else {
                    warn!(error = %err, "Checkout rejected");
                }

                self.event_sender
                    .send_or_log(Event::CheckoutFailed {
                        user_id,
                        kind: err.kind(),
                        message: err.response_message(),
                    })
                    .await;

                Err(err)
            }
        }
    }

    async fn run_checkout(
        &self,
        user_id: Uuid,
        request: &CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        request.validate_against(&self.config)?;

        let txn = self.db.begin().await?;
        match checkout_in(&txn, user_id, request, &self.config, Utc::now()).await {
            Ok(outcome) => {
                txn.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Failed to roll back checkout");
                }
                Err(err)
            }
        }
    }

    async fn publish(&self, outcome: CheckoutOutcome) {
        let transaction = &outcome.transaction;

        for order in &outcome.orders {
            self.event_sender
                .send_or_log(Event::OrderCreated {
                    order_id: order.id,
                    transaction_id: transaction.id,
                    seller_id: order.seller_id,
                    total: order.total,
                })
                .await;
        }

        for reservation in &outcome.reservations {
            self.event_sender
                .send_or_log(Event::StockReserved {
                    variant_id: reservation.variant_id,
                    quantity: reservation.quantity,
                    remaining: reservation.remaining,
                })
                .await;
        }

        if let Some(entry) = &outcome.wallet_entry {
            self.event_sender
                .send_or_log(Event::WalletDebited {
                    wallet_id: entry.wallet_id,
                    transaction_id: transaction.id,
                    amount: entry.total,
                    balance_after: entry.balance_after,
                })
                .await;
        }

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                transaction_id: transaction.id,
                user_id: transaction.user_id,
                total: transaction.total,
                payment_method: transaction.payment_method,
                order_ids: outcome.orders.iter().map(|o| o.id).collect(),
                completed_at: Utc::now(),
            })
            .await;
    }
}

async fn checkout_in(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    request: &CheckoutRequest,
    config: &CheckoutConfig,
    now: DateTime<Utc>,
) -> Result<CheckoutOutcome, ServiceError> {
    let global_voucher =
        VoucherService::resolve(txn, &request.global_voucher_code, VoucherScope::Global, now)
            .await?;

    let transaction = transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        voucher_id: Set(global_voucher.as_ref().map(|v| v.id)),
        payment_method: Set(request.payment_method),
        subtotal: Set(Decimal::ZERO),
        discount: Set(Decimal::ZERO),
        total: Set(Decimal::ZERO),
        status: Set(FulfillmentStatus::WaitingForSeller),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    let mut orders = Vec::with_capacity(request.cart.len());
    let mut reservations = Vec::new();
    let mut orders_total = Decimal::ZERO;

    for group in &request.cart {
        let seller_voucher = VoucherService::resolve(
            txn,
            &group.voucher_code,
            VoucherScope::Seller(group.seller_id),
            now,
        )
        .await?;

        let assembled = OrderAssembler::assemble(
            txn,
            transaction.id,
            user_id,
            SellerGroup {
                seller_id: group.seller_id,
                voucher: seller_voucher.as_ref(),
                cart_item_ids: &group.cart_item_ids,
            },
            now,
            config.enforce_min_spending,
        )
        .await?;

        orders_total += assembled.order.total;
        reservations.extend(assembled.reservations);
        orders.push(assembled.order);
    }

    let discount = match &global_voucher {
        Some(voucher) => {
            VoucherService::discount_for(voucher, orders_total, config.enforce_min_spending)?
        }
        None => Decimal::ZERO,
    };
    let total = orders_total - discount;

    let wallet = match request.payment_method {
        PaymentMethod::Wallet => {
            let wallet = WalletLedger::require_by_user(txn, user_id).await?;
            if wallet.balance < total {
                return Err(ServiceError::InsufficientBalance {
                    balance: wallet.balance,
                    required: total,
                });
            }
            Some(wallet)
        }
        PaymentMethod::External => None,
    };

    let mut active: transaction::ActiveModel = transaction.into();
    active.subtotal = Set(orders_total);
    active.discount = Set(discount);
    active.total = Set(total);
    let transaction = active.update(txn).await?;

    let wallet_entry = match wallet {
        Some(wallet) => Some(WalletLedger::debit(txn, wallet.id, transaction.id, total).await?),
        None => None,
    };

    Ok(CheckoutOutcome {
        transaction,
        orders,
        reservations,
        wallet_entry,
    })
}
