#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use marketplace_checkout::{
    config::{AppConfig, CheckoutConfig},
    db,
    entities::{
        commerce::{
            AmountType, CartItemModel, ProductModel, ProductVariant, ProductVariantModel,
            PromotionModel, VoucherModel,
        },
        order::{self, Entity as OrderEntity},
        order_item::Entity as OrderItemEntity,
        transaction::Entity as TransactionEntity,
        PaymentMethod,
    },
    events::{self, EventSender},
    services::commerce::{
        AddToCartInput, CreateProductInput, CreatePromotionInput, CreateVariantInput,
        CreateVoucherInput,
    },
    AppState, CheckoutRequest, SellerCart,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tempfile::TempDir;
use uuid::Uuid;

/// Application state backed by a throwaway SQLite file with migrations applied.
pub struct TestApp {
    pub state: AppState,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

/// A seeded product with one variant.
pub struct SeededVariant {
    pub seller_id: Uuid,
    pub product: ProductModel,
    pub variant: ProductVariantModel,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_checkout_config(CheckoutConfig::default()).await
    }

    pub async fn with_checkout_config(checkout: CheckoutConfig) -> Self {
        Self::build(checkout, 1).await
    }

    /// Pool with `connections` connections so checkouts can interleave.
    pub async fn with_pool_size(connections: u32) -> Self {
        Self::build(CheckoutConfig::default(), connections).await
    }

    async fn build(checkout: CheckoutConfig, connections: u32) -> Self {
        let db_dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = db_dir.path().join("checkout.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test".to_string(),
        );
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        cfg.checkout = checkout;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let (event_sender, event_rx) = EventSender::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, Arc::new(event_sender));

        Self {
            state,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Creates a product for a fresh seller with a single variant.
    pub async fn seed_variant(&self, price: Decimal, stock: i32) -> SeededVariant {
        self.seed_variant_for(Uuid::new_v4(), price, stock).await
    }

    pub async fn seed_variant_for(
        &self,
        seller_id: Uuid,
        price: Decimal,
        stock: i32,
    ) -> SeededVariant {
        let product = self
            .state
            .catalog
            .create_product(CreateProductInput {
                seller_id,
                name: format!("Product {}", &Uuid::new_v4().to_string()[..8]),
            })
            .await
            .expect("failed to create product");

        let variant = self
            .state
            .catalog
            .create_variant(CreateVariantInput {
                product_id: product.id,
                sku: format!("SKU-{}", Uuid::new_v4()),
                name: "Default".to_string(),
                price,
                stock,
            })
            .await
            .expect("failed to create variant");

        SeededVariant {
            seller_id,
            product,
            variant,
        }
    }

    pub async fn seed_promotion(
        &self,
        product_id: Uuid,
        amount_type: AmountType,
        amount: Decimal,
    ) -> PromotionModel {
        let now = Utc::now();
        self.seed_promotion_window(
            product_id,
            amount_type,
            amount,
            now - Duration::days(1),
            now + Duration::days(1),
        )
        .await
    }

    pub async fn seed_promotion_window(
        &self,
        product_id: Uuid,
        amount_type: AmountType,
        amount: Decimal,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> PromotionModel {
        self.state
            .catalog
            .create_promotion(CreatePromotionInput {
                product_id,
                name: "Promo".to_string(),
                amount_type,
                amount,
                start_date,
                end_date,
            })
            .await
            .expect("failed to create promotion")
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn seed_voucher(
        &self,
        code: &str,
        seller_id: Option<Uuid>,
        amount_type: AmountType,
        amount: Decimal,
        min_spending: Decimal,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> VoucherModel {
        self.state
            .vouchers
            .create_voucher(CreateVoucherInput {
                code: code.to_string(),
                seller_id,
                amount_type,
                amount,
                min_spending,
                start_date,
                end_date,
            })
            .await
            .expect("failed to create voucher")
    }

    /// A voucher valid from yesterday until tomorrow.
    pub async fn seed_active_voucher(
        &self,
        code: &str,
        seller_id: Option<Uuid>,
        amount_type: AmountType,
        amount: Decimal,
    ) -> VoucherModel {
        let now = Utc::now();
        self.seed_voucher(
            code,
            seller_id,
            amount_type,
            amount,
            Decimal::ZERO,
            now - Duration::days(1),
            now + Duration::days(1),
        )
        .await
    }

    /// Opens a wallet for the user and credits `amount` when positive.
    pub async fn fund_wallet(&self, user_id: Uuid, amount: Decimal) {
        self.state
            .wallets
            .create_wallet(user_id)
            .await
            .expect("failed to create wallet");
        if amount > Decimal::ZERO {
            self.state
                .wallets
                .top_up(user_id, amount)
                .await
                .expect("failed to top up wallet");
        }
    }

    pub async fn add_to_cart(
        &self,
        user_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> CartItemModel {
        self.state
            .carts
            .add_item(
                user_id,
                AddToCartInput {
                    variant_id,
                    quantity,
                },
            )
            .await
            .expect("failed to add cart item")
    }

    pub async fn stock_of(&self, variant_id: Uuid) -> i32 {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.state.db)
            .await
            .expect("variant query")
            .expect("variant exists")
            .stock
    }

    pub async fn balance_of(&self, user_id: Uuid) -> Decimal {
        self.state
            .wallets
            .get_balance(user_id)
            .await
            .expect("wallet balance")
    }

    pub async fn order_count(&self) -> u64 {
        OrderEntity::find()
            .count(&*self.state.db)
            .await
            .expect("order count")
    }

    pub async fn order_item_count(&self) -> u64 {
        OrderItemEntity::find()
            .count(&*self.state.db)
            .await
            .expect("order item count")
    }

    pub async fn transaction_count(&self) -> u64 {
        TransactionEntity::find()
            .count(&*self.state.db)
            .await
            .expect("transaction count")
    }

    pub async fn orders_of_transaction(&self, transaction_id: Uuid) -> Vec<order::Model> {
        OrderEntity::find()
            .filter(order::Column::TransactionId.eq(transaction_id))
            .all(&*self.state.db)
            .await
            .expect("orders query")
    }
}

/// Request with a single seller group and no vouchers.
pub fn single_seller_request(
    seller_id: Uuid,
    cart_item_ids: Vec<Uuid>,
    payment_method: PaymentMethod,
) -> CheckoutRequest {
    CheckoutRequest {
        global_voucher_code: String::new(),
        cart: vec![SellerCart {
            seller_id,
            voucher_code: String::new(),
            cart_item_ids,
        }],
        payment_method,
    }
}
