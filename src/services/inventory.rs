use crate::{
    entities::commerce::{product_variant, ProductVariant},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Per-variant stock counter.
///
/// Stock only ever changes through a single conditional `UPDATE`, so two
/// concurrent reservations against the same variant cannot both pass the
/// availability check.
#[derive(Clone)]
pub struct StockLedger {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl StockLedger {
    pub fn new(db_pool: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Current stock of a variant.
    #[instrument(skip(self))]
    pub async fn available(&self, variant_id: Uuid) -> Result<i32, ServiceError> {
        Self::current_stock(&*self.db_pool, variant_id).await
    }

    /// Adds `quantity` units to a variant and returns the new stock level.
    #[instrument(skip(self))]
    pub async fn replenish(&self, variant_id: Uuid, quantity: i32) -> Result<i32, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Replenish quantity must be positive".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Variant {} not found",
                variant_id
            )));
        }

        let stock = Self::current_stock(db, variant_id).await?;

        self.event_sender
            .send_or_log(Event::StockReplenished {
                variant_id,
                quantity,
                stock,
            })
            .await;

        info!(%variant_id, quantity, stock, "Replenished stock");
        Ok(stock)
    }

    /// Takes `quantity` units of a variant if that many are left and
    /// returns the remaining stock.
    ///
    /// Runs on the caller's connection so the decrement commits or rolls
    /// back with the rest of the unit of work.
    pub async fn check_and_reserve<C>(
        conn: &C,
        variant_id: Uuid,
        product_name: &str,
        quantity: i32,
    ) -> Result<i32, ServiceError>
    where
        C: ConnectionTrait,
    {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for {} must be positive",
                product_name
            )));
        }

        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let available = Self::current_stock(conn, variant_id).await?;
            counter!("marketplace.stock.out_of_stock", 1);
            warn!(%variant_id, requested = quantity, available, "Out of stock");
            return Err(ServiceError::OutOfStock {
                product: product_name.to_string(),
                requested: quantity,
                available,
            });
        }

        let remaining = Self::current_stock(conn, variant_id).await?;
        debug!(%variant_id, quantity, remaining, "Reserved stock");
        Ok(remaining)
    }

    async fn current_stock<C>(conn: &C, variant_id: Uuid) -> Result<i32, ServiceError>
    where
        C: ConnectionTrait,
    {
        ProductVariant::find_by_id(variant_id)
            .one(conn)
            .await?
            .map(|variant| variant.stock)
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))
    }
}
