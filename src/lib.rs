//! Marketplace checkout library
//!
//! Converts multi-seller carts into orders under a single payment
//! transaction, with promotions, vouchers, stock reservation and wallet
//! payment applied atomically.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    commerce::{CartService, CatalogService, CheckoutService, VoucherService},
    inventory::StockLedger,
    orders::OrderService,
    wallet::WalletLedger,
};

/// Services wired against one connection pool and event channel.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub catalog: CatalogService,
    pub carts: CartService,
    pub vouchers: VoucherService,
    pub stock: StockLedger,
    pub orders: OrderService,
    pub wallets: WalletLedger,
    pub checkout: CheckoutService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        Self {
            catalog: CatalogService::new(db.clone()),
            carts: CartService::new(db.clone(), event_sender.clone()),
            vouchers: VoucherService::new(db.clone()),
            stock: StockLedger::new(db.clone(), event_sender.clone()),
            orders: OrderService::new(db.clone()),
            wallets: WalletLedger::new(db.clone(), event_sender.clone()),
            checkout: CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                config.checkout.clone(),
            ),
            db,
            config,
            event_sender,
        }
    }
}

// Re-export commonly used items
pub use errors::{ErrorKind, ServiceError};
pub use services::commerce::{CheckoutRequest, CheckoutSummary, SellerCart};
