use crate::{
    entities::commerce::{
        cart_item, product, product_variant, promotion, CartItem, CartItemModel, Product,
        ProductVariant, Promotion,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Manages a user's cart lines.
///
/// Lines are keyed by `(user_id, variant_id)`. Removing a line zeroes its
/// quantity; the row itself is only deleted when a checkout consumes it.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for adding a variant to a cart
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddToCartInput {
    pub variant_id: Uuid,
    #[validate(range(
        min = 1,
        max = 10000,
        message = "Quantity must be between 1 and 10000"
    ))]
    pub quantity: i32,
}

/// Cart line with everything checkout needs to price and route it.
#[derive(Debug, Clone)]
pub struct CheckoutLine {
    pub item: cart_item::Model,
    pub variant: product_variant::Model,
    pub product: product::Model,
    /// The promotion active at load time, if any
    pub promotion: Option<promotion::Model>,
}

impl CheckoutLine {
    pub fn seller_id(&self) -> Uuid {
        self.product.seller_id
    }
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds a variant to the user's cart, incrementing an existing line.
    ///
    /// A previously removed line for the same variant is revived with the
    /// requested quantity.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartItemModel, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;

        ProductVariant::find_by_id(input.variant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", input.variant_id))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::VariantId.eq(input.variant_id))
            .one(&txn)
            .await?;

        let now = Utc::now();
        let item = match existing {
            Some(item) => {
                let quantity = item
                    .quantity
                    .max(0)
                    .checked_add(input.quantity)
                    .ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "Quantity for variant {} is too large",
                            input.variant_id
                        ))
                    })?;
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(quantity);
                item.updated_at = Set(now);
                item.update(&txn).await?
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    variant_id: Set(input.variant_id),
                    quantity: Set(input.quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                item_id: item.id,
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .await;

        info!(
            "Added variant {} x{} to cart of user {}",
            input.variant_id, input.quantity, user_id
        );
        Ok(item)
    }

    /// Soft-removes a cart line by zeroing its quantity.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .filter(|item| item.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(0);
        item.updated_at = Set(Utc::now());
        item.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { user_id, item_id })
            .await;

        info!("Removed cart item {} for user {}", item_id, user_id);
        Ok(())
    }

    /// Active lines of the user's cart, oldest first.
    #[instrument(skip(self))]
    pub async fn list_items(&self, user_id: Uuid) -> Result<Vec<CartItemModel>, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::Quantity.gt(0))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(items)
    }

    /// Loads a cart line with its variant, product and the promotion active
    /// at `now`. When promotions overlap the one that started last wins.
    pub async fn load_for_checkout<C>(
        conn: &C,
        cart_item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CheckoutLine, ServiceError>
    where
        C: ConnectionTrait,
    {
        let item = CartItem::find_by_id(cart_item_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Cart item {} not found", cart_item_id))
            })?;

        let variant = ProductVariant::find_by_id(item.variant_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", item.variant_id))
            })?;

        let product = Product::find_by_id(variant.product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", variant.product_id))
            })?;

        let promotion = Promotion::find()
            .filter(promotion::Column::ProductId.eq(product.id))
            .all(conn)
            .await?
            .into_iter()
            .filter(|p| p.is_active_at(now))
            .max_by_key(|p| p.start_date);

        Ok(CheckoutLine {
            item,
            variant,
            product,
            promotion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_stay_within_bounds() {
        let input = |quantity| AddToCartInput {
            variant_id: Uuid::new_v4(),
            quantity,
        };

        assert!(input(1).validate().is_ok());
        assert!(input(10000).validate().is_ok());
        assert!(input(0).validate().is_err());
        assert!(input(10001).validate().is_err());
        assert!(input(i32::MAX).validate().is_err());
    }
}
