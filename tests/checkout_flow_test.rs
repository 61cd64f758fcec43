//! End-to-end checkout scenarios against a real SQLite database.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::{single_seller_request, TestApp};
use marketplace_checkout::{
    config::CheckoutConfig,
    entities::{
        commerce::{AmountType, CartItem},
        order_item,
        transaction::Entity as TransactionEntity,
        wallet_transaction::PaymentType,
        FulfillmentStatus, PaymentMethod,
    },
    CheckoutRequest, ServiceError, SellerCart,
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

#[tokio::test]
async fn percent_promotion_discounts_line_subtotal() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    app.seed_promotion(seeded.product.id, AmountType::Percent, dec!(10))
        .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 2).await;

    let summary = app
        .state
        .checkout
        .checkout_cart(
            user_id,
            single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External),
        )
        .await
        .expect("checkout should succeed");

    assert_eq!(summary.total, dec!(180));
    assert_eq!(summary.payment_method, PaymentMethod::External);

    let orders = app.orders_of_transaction(summary.transaction_id).await;
    assert_eq!(orders.len(), 1);
    let (_, items) = app
        .state
        .orders
        .get_order(orders[0].id)
        .await
        .expect("order exists");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, dec!(100));
    assert_eq!(items[0].subtotal, dec!(180));
    assert_eq!(app.stock_of(seeded.variant.id).await, 8);
}

#[tokio::test]
async fn nominal_promotion_lowers_unit_price() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    app.seed_promotion(seeded.product.id, AmountType::Nominal, dec!(15))
        .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 2).await;

    let summary = app
        .state
        .checkout
        .checkout_cart(
            user_id,
            single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External),
        )
        .await
        .expect("checkout should succeed");

    assert_eq!(summary.total, dec!(170));

    let items = order_item::Entity::find()
        .all(&*app.state.db)
        .await
        .expect("order items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, dec!(85));
    assert_eq!(items[0].subtotal, dec!(170));
}

#[tokio::test]
async fn expired_promotion_is_ignored() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    let now = Utc::now();
    app.seed_promotion_window(
        seeded.product.id,
        AmountType::Percent,
        dec!(50),
        now - Duration::days(10),
        now - Duration::days(1),
    )
    .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let summary = app
        .state
        .checkout
        .checkout_cart(
            user_id,
            single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External),
        )
        .await
        .expect("checkout should succeed");

    assert_eq!(summary.total, dec!(100));
}

#[tokio::test]
async fn voucher_not_yet_active_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    let now = Utc::now();
    app.seed_voucher(
        "FUTURE",
        Some(seeded.seller_id),
        AmountType::Nominal,
        dec!(10),
        dec!(0),
        now + Duration::days(1),
        now + Duration::days(2),
    )
    .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let mut request =
        single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External);
    request.cart[0].voucher_code = "FUTURE".to_string();

    let result = app.state.checkout.checkout_cart(user_id, request).await;

    assert_matches!(result, Err(ServiceError::VoucherInvalid(_)));
    assert_eq!(app.transaction_count().await, 0);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock_of(seeded.variant.id).await, 10);
}

#[tokio::test]
async fn expired_voucher_is_rejected() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    let now = Utc::now();
    app.seed_voucher(
        "PAST",
        None,
        AmountType::Percent,
        dec!(10),
        dec!(0),
        now - Duration::days(5),
        now - Duration::days(1),
    )
    .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let mut request =
        single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External);
    request.global_voucher_code = "PAST".to_string();

    let result = app.state.checkout.checkout_cart(user_id, request).await;

    assert_matches!(result, Err(ServiceError::VoucherInvalid(_)));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn active_seller_voucher_reduces_order_total() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    let voucher = app
        .seed_active_voucher("SELLER10", Some(seeded.seller_id), AmountType::Nominal, dec!(10))
        .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 2).await;

    let mut request =
        single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External);
    request.cart[0].voucher_code = "SELLER10".to_string();

    let summary = app
        .state
        .checkout
        .checkout_cart(user_id, request)
        .await
        .expect("checkout should succeed");

    assert_eq!(summary.total, dec!(190));

    let orders = app.orders_of_transaction(summary.transaction_id).await;
    assert_eq!(orders[0].subtotal, dec!(200));
    assert_eq!(orders[0].discount, dec!(10));
    assert_eq!(orders[0].total, dec!(190));
    assert_eq!(orders[0].voucher_id, Some(voucher.id));
}

#[tokio::test]
async fn seller_voucher_code_does_not_resolve_globally() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    app.seed_active_voucher("SELLERONLY", Some(seeded.seller_id), AmountType::Nominal, dec!(5))
        .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let mut request =
        single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External);
    request.global_voucher_code = "SELLERONLY".to_string();

    let result = app.state.checkout.checkout_cart(user_id, request).await;

    assert_matches!(result, Err(ServiceError::VoucherInvalid(_)));
}

#[tokio::test]
async fn minimum_spending_is_enforced_by_default() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    let now = Utc::now();
    app.seed_voucher(
        "BIGSPENDER",
        Some(seeded.seller_id),
        AmountType::Nominal,
        dec!(20),
        dec!(500),
        now - Duration::days(1),
        now + Duration::days(1),
    )
    .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let mut request =
        single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External);
    request.cart[0].voucher_code = "BIGSPENDER".to_string();

    let result = app.state.checkout.checkout_cart(user_id, request).await;

    assert_matches!(result, Err(ServiceError::VoucherInvalid(_)));
    assert_eq!(app.stock_of(seeded.variant.id).await, 10);
}

#[tokio::test]
async fn minimum_spending_can_be_disabled() {
    let app = TestApp::with_checkout_config(CheckoutConfig {
        enforce_min_spending: false,
        ..CheckoutConfig::default()
    })
    .await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(100), 10).await;
    let now = Utc::now();
    app.seed_voucher(
        "BIGSPENDER",
        Some(seeded.seller_id),
        AmountType::Nominal,
        dec!(20),
        dec!(500),
        now - Duration::days(1),
        now + Duration::days(1),
    )
    .await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let mut request =
        single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External);
    request.cart[0].voucher_code = "BIGSPENDER".to_string();

    let summary = app
        .state
        .checkout
        .checkout_cart(user_id, request)
        .await
        .expect("checkout should succeed");

    assert_eq!(summary.total, dec!(80));
}

#[tokio::test]
async fn insufficient_wallet_balance_leaves_everything_untouched() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(60), 5).await;
    app.fund_wallet(user_id, dec!(50)).await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let result = app
        .state
        .checkout
        .checkout_cart(
            user_id,
            single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::Wallet),
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::InsufficientBalance { balance, required })
            if balance == dec!(50) && required == dec!(60)
    );
    assert_eq!(app.balance_of(user_id).await, dec!(50));
    assert_eq!(app.stock_of(seeded.variant.id).await, 5);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.order_item_count().await, 0);
    assert_eq!(app.transaction_count().await, 0);
    assert!(CartItem::find_by_id(item.id)
        .one(&*app.state.db)
        .await
        .expect("cart query")
        .is_some());
}

#[tokio::test]
async fn wallet_checkout_without_wallet_is_not_found() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(10), 5).await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;

    let result = app
        .state
        .checkout
        .checkout_cart(
            user_id,
            single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::Wallet),
        )
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
    assert_eq!(app.stock_of(seeded.variant.id).await, 5);
}

#[tokio::test]
async fn multi_seller_cart_splits_into_orders_under_one_transaction() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let first = app.seed_variant(dec!(100), 10).await;
    let second = app.seed_variant(dec!(50), 10).await;
    app.seed_active_voucher("GLOBAL20", None, AmountType::Nominal, dec!(20))
        .await;
    app.fund_wallet(user_id, dec!(300)).await;

    let first_item = app.add_to_cart(user_id, first.variant.id, 1).await;
    let second_item = app.add_to_cart(user_id, second.variant.id, 2).await;

    let request = CheckoutRequest {
        global_voucher_code: "GLOBAL20".to_string(),
        cart: vec![
            SellerCart {
                seller_id: first.seller_id,
                voucher_code: String::new(),
                cart_item_ids: vec![first_item.id],
            },
            SellerCart {
                seller_id: second.seller_id,
                voucher_code: String::new(),
                cart_item_ids: vec![second_item.id],
            },
        ],
        payment_method: PaymentMethod::Wallet,
    };

    let summary = app
        .state
        .checkout
        .checkout_cart(user_id, request)
        .await
        .expect("checkout should succeed");

    let orders = app.orders_of_transaction(summary.transaction_id).await;
    assert_eq!(orders.len(), 2);
    assert!(orders
        .iter()
        .all(|o| o.status == FulfillmentStatus::WaitingForSeller && o.user_id == user_id));

    let orders_total: rust_decimal::Decimal = orders.iter().map(|o| o.total).sum();
    assert_eq!(orders_total, dec!(200));
    assert_eq!(summary.total, orders_total - dec!(20));

    let transaction = TransactionEntity::find_by_id(summary.transaction_id)
        .one(&*app.state.db)
        .await
        .expect("transaction query")
        .expect("transaction exists");
    assert_eq!(transaction.total, dec!(180));
    assert_eq!(transaction.discount, dec!(20));
    assert_eq!(transaction.status, FulfillmentStatus::WaitingForSeller);

    assert_eq!(app.balance_of(user_id).await, dec!(120));
    assert_eq!(app.stock_of(first.variant.id).await, 9);
    assert_eq!(app.stock_of(second.variant.id).await, 8);

    let history = app
        .state
        .wallets
        .history(user_id)
        .await
        .expect("wallet history");
    let payment = history
        .iter()
        .find(|entry| entry.payment_type == PaymentType::Payment)
        .expect("payment entry");
    assert_eq!(payment.transaction_id, Some(summary.transaction_id));
    assert_eq!(payment.total, dec!(180));
    assert_eq!(payment.balance_after, dec!(120));

    let remaining = CartItem::find()
        .filter(
            marketplace_checkout::entities::commerce::cart_item::Column::UserId.eq(user_id),
        )
        .all(&*app.state.db)
        .await
        .expect("cart query");
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn failure_in_later_group_rolls_back_earlier_groups() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let plenty = app.seed_variant(dec!(10), 10).await;
    let scarce = app.seed_variant(dec!(10), 1).await;

    let plenty_item = app.add_to_cart(user_id, plenty.variant.id, 3).await;
    let scarce_item = app.add_to_cart(user_id, scarce.variant.id, 2).await;

    let request = CheckoutRequest {
        global_voucher_code: String::new(),
        cart: vec![
            SellerCart {
                seller_id: plenty.seller_id,
                voucher_code: String::new(),
                cart_item_ids: vec![plenty_item.id],
            },
            SellerCart {
                seller_id: scarce.seller_id,
                voucher_code: String::new(),
                cart_item_ids: vec![scarce_item.id],
            },
        ],
        payment_method: PaymentMethod::External,
    };

    let result = app.state.checkout.checkout_cart(user_id, request).await;

    assert_matches!(
        result,
        Err(ServiceError::OutOfStock { requested: 2, available: 1, .. })
    );
    assert_eq!(app.stock_of(plenty.variant.id).await, 10);
    assert_eq!(app.stock_of(scarce.variant.id).await, 1);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.order_item_count().await, 0);
    assert_eq!(
        app.state
            .carts
            .list_items(user_id)
            .await
            .expect("cart items")
            .len(),
        2
    );
}

#[tokio::test]
async fn out_of_stock_checkout_succeeds_after_replenish() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(25), 1).await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 3).await;
    let request = single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External);

    let result = app
        .state
        .checkout
        .checkout_cart(user_id, request.clone())
        .await;
    assert_matches!(
        result,
        Err(ServiceError::OutOfStock { ref product, requested: 3, available: 1 })
            if product == &seeded.product.name
    );

    let stock = app
        .state
        .stock
        .replenish(seeded.variant.id, 5)
        .await
        .expect("replenish");
    assert_eq!(stock, 6);

    let summary = app
        .state
        .checkout
        .checkout_cart(user_id, request)
        .await
        .expect("resubmitted checkout should succeed");

    assert_eq!(summary.total, dec!(75));
    assert_eq!(app.stock_of(seeded.variant.id).await, 3);
    assert_eq!(app.transaction_count().await, 1);
    assert_eq!(app.order_count().await, 1);
}

#[tokio::test]
async fn item_from_another_seller_is_rejected() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(10), 5).await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;
    let wrong_seller = Uuid::new_v4();

    let result = app
        .state
        .checkout
        .checkout_cart(
            user_id,
            single_seller_request(wrong_seller, vec![item.id], PaymentMethod::External),
        )
        .await;

    assert_matches!(
        result,
        Err(ServiceError::MismatchedSeller { cart_item_id, expected, actual })
            if cart_item_id == item.id && expected == wrong_seller && actual == seeded.seller_id
    );
    assert_eq!(app.stock_of(seeded.variant.id).await, 5);
}

#[tokio::test]
async fn item_of_another_user_is_not_found() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(10), 5).await;
    let item = app.add_to_cart(owner, seeded.variant.id, 1).await;

    let result = app
        .state
        .checkout
        .checkout_cart(
            intruder,
            single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External),
        )
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
    assert_eq!(app.stock_of(seeded.variant.id).await, 5);
}

#[tokio::test]
async fn removed_cart_item_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let seeded = app.seed_variant(dec!(10), 5).await;
    let item = app.add_to_cart(user_id, seeded.variant.id, 1).await;
    app.state
        .carts
        .remove_item(user_id, item.id)
        .await
        .expect("remove item");

    let result = app
        .state
        .checkout
        .checkout_cart(
            user_id,
            single_seller_request(seeded.seller_id, vec![item.id], PaymentMethod::External),
        )
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let request = CheckoutRequest {
        global_voucher_code: String::new(),
        cart: vec![],
        payment_method: PaymentMethod::Wallet,
    };

    let result = app
        .state
        .checkout
        .checkout_cart(Uuid::new_v4(), request)
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
    assert_eq!(app.transaction_count().await, 0);
}
