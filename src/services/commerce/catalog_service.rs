use crate::{
    entities::commerce::{
        product, product_variant, promotion, AmountType, Product, ProductModel, ProductVariant,
        ProductVariantModel, PromotionModel,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Seller catalog writes: products, their variants and promotions.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductInput {
    pub seller_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateVariantInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_promotion_input", skip_on_field_errors = false))]
pub struct CreatePromotionInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub amount_type: AmountType,
    pub amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("value must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_promotion_input(input: &CreatePromotionInput) -> Result<(), ValidationError> {
    if let Err(message) = input.amount_type.validate_amount(input.amount) {
        let mut err = ValidationError::new("amount");
        err.message = Some(message.into());
        return Err(err);
    }
    if input.start_date >= input.end_date {
        let mut err = ValidationError::new("window");
        err.message = Some("start_date must be before end_date".into());
        return Err(err);
    }
    Ok(())
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            seller_id: Set(input.seller_id),
            name: Set(input.name),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!("Created product {} for seller {}", product.id, product.seller_id);
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn create_variant(
        &self,
        input: CreateVariantInput,
    ) -> Result<ProductVariantModel, ServiceError> {
        input.validate()?;
        self.ensure_product(input.product_id).await?;
        self.ensure_unique_sku(&input.sku).await?;

        let now = Utc::now();
        let variant = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(input.product_id),
            sku: Set(input.sku),
            name: Set(input.name),
            price: Set(input.price),
            stock: Set(input.stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(
            "Created variant {} ({}) with stock {}",
            variant.id, variant.sku, variant.stock
        );
        Ok(variant)
    }

    #[instrument(skip(self))]
    pub async fn create_promotion(
        &self,
        input: CreatePromotionInput,
    ) -> Result<PromotionModel, ServiceError> {
        input.validate()?;
        self.ensure_product(input.product_id).await?;

        let promotion = promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(input.product_id),
            name: Set(input.name),
            amount_type: Set(input.amount_type),
            amount: Set(input.amount),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(
            "Created promotion {} for product {}",
            promotion.id, promotion.product_id
        );
        Ok(promotion)
    }

    async fn ensure_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    async fn ensure_unique_sku(&self, sku: &str) -> Result<(), ServiceError> {
        let exists = ProductVariant::find()
            .filter(product_variant::Column::Sku.eq(sku))
            .one(&*self.db)
            .await?
            .is_some();

        if exists {
            return Err(ServiceError::Conflict(format!("SKU {} already exists", sku)));
        }
        Ok(())
    }
}
