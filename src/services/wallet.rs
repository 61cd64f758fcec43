use crate::{
    db::DbPool,
    entities::{
        wallet::{self, Entity as WalletEntity, Model as WalletModel},
        wallet_transaction::{self, Entity as WalletTransactionEntity, PaymentType},
        PaymentMethod,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const PIN_LENGTH: usize = 6;

/// Stored-value balances and their append-only ledger.
///
/// Balances change only through conditional updates in this module and
/// every change appends a ledger entry carrying the resulting balance.
#[derive(Clone)]
pub struct WalletLedger {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl WalletLedger {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Opens an empty wallet for a user. A user holds at most one wallet.
    #[instrument(skip(self))]
    pub async fn create_wallet(&self, user_id: Uuid) -> Result<WalletModel, ServiceError> {
        let db = &*self.db_pool;
        if Self::find_by_user(db, user_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "User {} already has a wallet",
                user_id
            )));
        }

        let now = Utc::now();
        let wallet = wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            balance: Set(Decimal::ZERO),
            pin_hash: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        info!(wallet_id = %wallet.id, %user_id, "Created wallet");
        Ok(wallet)
    }

    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(Self::require_by_user(&*self.db_pool, user_id).await?.balance)
    }

    /// Ledger entries of the user's wallet, newest first.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<wallet_transaction::Model>, ServiceError> {
        let db = &*self.db_pool;
        let wallet = Self::require_by_user(db, user_id).await?;

        let entries = WalletTransactionEntity::find()
            .filter(wallet_transaction::Column::WalletId.eq(wallet.id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(entries)
    }

    /// Credits the user's wallet from an external account.
    #[instrument(skip(self))]
    pub async fn top_up(
        &self,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<wallet_transaction::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Top-up amount must be positive".to_string(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        let wallet = Self::require_by_user(&txn, user_id).await?;

        WalletEntity::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).add(amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(wallet::Column::Id.eq(wallet.id))
            .exec(&txn)
            .await?;

        let balance_after = Self::balance_of(&txn, wallet.id).await?;
        let entry = Self::append_entry(
            &txn,
            wallet.id,
            None,
            PaymentMethod::External,
            PaymentType::TopUp,
            amount,
            balance_after,
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::WalletCredited {
                wallet_id: wallet.id,
                amount,
                balance_after,
            })
            .await;

        info!(wallet_id = %wallet.id, %amount, %balance_after, "Wallet topped up");
        Ok(entry)
    }

    /// Takes `amount` from a wallet as payment for `transaction_id` and
    /// appends the matching ledger entry.
    ///
    /// Fails with `NegativeBalance` rather than letting the balance drop
    /// below zero. Runs on the caller's connection.
    pub async fn debit<C>(
        conn: &C,
        wallet_id: Uuid,
        transaction_id: Uuid,
        amount: Decimal,
    ) -> Result<wallet_transaction::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        if amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Debit amount must not be negative".to_string(),
            ));
        }

        let result = WalletEntity::update_many()
            .col_expr(
                wallet::Column::Balance,
                Expr::col(wallet::Column::Balance).sub(amount),
            )
            .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(wallet::Column::Id.eq(wallet_id))
            .filter(wallet::Column::Balance.gte(amount))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let balance = Self::balance_of(conn, wallet_id).await?;
            warn!(%wallet_id, %balance, %amount, "Debit would overdraw wallet");
            return Err(ServiceError::NegativeBalance(format!(
                "debiting {} from wallet {} would leave {}",
                amount,
                wallet_id,
                balance - amount
            )));
        }

        let balance_after = Self::balance_of(conn, wallet_id).await?;
        let entry = Self::append_entry(
            conn,
            wallet_id,
            Some(transaction_id),
            PaymentMethod::Wallet,
            PaymentType::Payment,
            amount,
            balance_after,
        )
        .await?;

        counter!("marketplace.wallet.debited", 1);
        Ok(entry)
    }

    /// Stores a new wallet PIN. PINs are exactly six ASCII digits.
    #[instrument(skip(self, pin))]
    pub async fn set_pin(&self, user_id: Uuid, pin: &str) -> Result<(), ServiceError> {
        validate_pin(pin)?;

        let db = &*self.db_pool;
        let wallet = Self::require_by_user(db, user_id).await?;

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| {
                error!("Failed to hash wallet PIN: {}", e);
                ServiceError::InternalError("Failed to hash PIN".to_string())
            })?
            .to_string();

        let mut active: wallet::ActiveModel = wallet.into();
        active.pin_hash = Set(Some(hash));
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        info!(%user_id, "Wallet PIN updated");
        Ok(())
    }

    /// Checks `pin` against the stored hash.
    #[instrument(skip(self, pin))]
    pub async fn verify_pin(&self, user_id: Uuid, pin: &str) -> Result<(), ServiceError> {
        let wallet = Self::require_by_user(&*self.db_pool, user_id).await?;
        let stored = wallet
            .pin_hash
            .ok_or_else(|| ServiceError::AuthError("Wallet PIN is not set".to_string()))?;

        let parsed = PasswordHash::new(&stored).map_err(|e| {
            error!("Stored wallet PIN hash is malformed: {}", e);
            ServiceError::InternalError("Malformed PIN hash".to_string())
        })?;

        Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .map_err(|_| ServiceError::AuthError("Invalid wallet PIN".to_string()))
    }

    pub async fn find_by_user<C>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<Option<WalletModel>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(WalletEntity::find()
            .filter(wallet::Column::UserId.eq(user_id))
            .one(conn)
            .await?)
    }

    pub async fn require_by_user<C>(conn: &C, user_id: Uuid) -> Result<WalletModel, ServiceError>
    where
        C: ConnectionTrait,
    {
        Self::find_by_user(conn, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Wallet for user {} not found", user_id)))
    }

    async fn balance_of<C>(conn: &C, wallet_id: Uuid) -> Result<Decimal, ServiceError>
    where
        C: ConnectionTrait,
    {
        WalletEntity::find_by_id(wallet_id)
            .one(conn)
            .await?
            .map(|wallet| wallet.balance)
            .ok_or_else(|| ServiceError::NotFound(format!("Wallet {} not found", wallet_id)))
    }

    async fn append_entry<C>(
        conn: &C,
        wallet_id: Uuid,
        transaction_id: Option<Uuid>,
        payment_method: PaymentMethod,
        payment_type: PaymentType,
        total: Decimal,
        balance_after: Decimal,
    ) -> Result<wallet_transaction::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let entry = wallet_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            wallet_id: Set(wallet_id),
            transaction_id: Set(transaction_id),
            payment_method: Set(payment_method),
            payment_type: Set(payment_type),
            total: Set(total),
            balance_after: Set(balance_after),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        Ok(entry)
    }
}

fn validate_pin(pin: &str) -> Result<(), ServiceError> {
    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ServiceError::ValidationError(format!(
            "PIN must be exactly {} digits",
            PIN_LENGTH
        )));
    }
    Ok(())
}
