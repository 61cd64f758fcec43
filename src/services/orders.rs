use crate::{
    db::DbPool,
    entities::{
        commerce::{CartItem, VoucherModel},
        order::{self, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
        FulfillmentStatus,
    },
    errors::ServiceError,
    services::{
        commerce::{cart_service::CartService, pricing_service, voucher_service::VoucherService},
        inventory::StockLedger,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// One seller's slice of a checkout request, with its voucher already resolved.
#[derive(Debug, Clone, Copy)]
pub struct SellerGroup<'a> {
    pub seller_id: Uuid,
    pub voucher: Option<&'a VoucherModel>,
    pub cart_item_ids: &'a [Uuid],
}

/// Stock taken for one order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub remaining: i32,
}

#[derive(Debug, Clone)]
pub struct AssembledOrder {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
    pub reservations: Vec<StockReservation>,
}

/// Turns one seller group of cart lines into a persisted order.
pub struct OrderAssembler;

impl OrderAssembler {
    /// Creates the order, prices and reserves every line, consumes the cart
    /// lines and settles the seller voucher.
    ///
    /// Every write goes through `conn`; the caller owns commit and rollback.
    pub async fn assemble<C>(
        conn: &C,
        transaction_id: Uuid,
        user_id: Uuid,
        group: SellerGroup<'_>,
        now: DateTime<Utc>,
        enforce_min_spending: bool,
    ) -> Result<AssembledOrder, ServiceError>
    where
        C: ConnectionTrait,
    {
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(transaction_id),
            seller_id: Set(group.seller_id),
            user_id: Set(user_id),
            voucher_id: Set(group.voucher.map(|v| v.id)),
            subtotal: Set(Decimal::ZERO),
            discount: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            status: Set(FulfillmentStatus::WaitingForSeller),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        let mut items = Vec::with_capacity(group.cart_item_ids.len());
        let mut reservations = Vec::with_capacity(group.cart_item_ids.len());

        for &cart_item_id in group.cart_item_ids {
            let line = CartService::load_for_checkout(conn, cart_item_id, now).await?;

            if line.item.user_id != user_id {
                return Err(ServiceError::NotFound(format!(
                    "Cart item {} not found",
                    cart_item_id
                )));
            }
            if line.item.is_removed() {
                return Err(ServiceError::ValidationError(format!(
                    "Cart item {} has been removed",
                    cart_item_id
                )));
            }
            if line.seller_id() != group.seller_id {
                return Err(ServiceError::MismatchedSeller {
                    cart_item_id,
                    expected: group.seller_id,
                    actual: line.seller_id(),
                });
            }

            let quantity = line.item.quantity;
            let remaining = StockLedger::check_and_reserve(
                conn,
                line.variant.id,
                &line.product.name,
                quantity,
            )
            .await?;

            let price = pricing_service::price_line(
                line.variant.price,
                quantity,
                line.promotion.as_ref(),
                now,
            );

            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                variant_id: Set(line.variant.id),
                quantity: Set(quantity),
                unit_price: Set(price.unit_price),
                subtotal: Set(price.subtotal),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;

            CartItem::delete_by_id(cart_item_id).exec(conn).await?;

            debug!(
                order_id = %order.id,
                variant_id = %line.variant.id,
                quantity,
                subtotal = %price.subtotal,
                "Added order line"
            );

            reservations.push(StockReservation {
                variant_id: line.variant.id,
                quantity,
                remaining,
            });
            items.push(item);
        }

        let subtotal: Decimal = items.iter().map(|item| item.subtotal).sum();
        let discount = match group.voucher {
            Some(voucher) => VoucherService::discount_for(voucher, subtotal, enforce_min_spending)?,
            None => Decimal::ZERO,
        };

        let mut active: order::ActiveModel = order.into();
        active.subtotal = Set(subtotal);
        active.discount = Set(discount);
        active.total = Set(subtotal - discount);
        let order = active.update(conn).await?;

        Ok(AssembledOrder {
            order,
            items,
            reservations,
        })
    }
}

/// Read access to orders and fulfillment status changes after checkout.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Loads an order with its items.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?;

        Ok((order, items))
    }

    /// Orders belonging to a transaction.
    #[instrument(skip(self))]
    pub async fn orders_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<OrderModel>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::TransactionId.eq(transaction_id))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;

        Ok(orders)
    }

    /// Moves an order to `to` in its own unit of work.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        to: FulfillmentStatus,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to start transaction for status update");
            ServiceError::DatabaseError(e)
        })?;

        let order = Self::transition(&txn, order_id, to).await?;

        txn.commit().await?;
        Ok(order)
    }

    /// Applies a status change if the fulfillment lifecycle allows it.
    pub async fn transition<C>(
        conn: &C,
        order_id: Uuid,
        to: FulfillmentStatus,
    ) -> Result<OrderModel, ServiceError>
    where
        C: ConnectionTrait,
    {
        let order = OrderEntity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let from = order.status;
        if !from.can_transition_to(to) {
            warn!(%order_id, %from, %to, "Rejected status transition");
            return Err(ServiceError::InvalidStatusTransition { from, to });
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(to);
        let order = active.update(conn).await?;

        info!(%order_id, %from, %to, "Order status updated");
        Ok(order)
    }
}
