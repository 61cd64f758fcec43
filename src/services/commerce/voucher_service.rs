use crate::{
    entities::commerce::{voucher, AmountType, Voucher, VoucherModel},
    errors::ServiceError,
    services::commerce::pricing_service,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Where a voucher code is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherScope {
    /// Vouchers with no seller, applied to the whole transaction
    Global,
    /// Vouchers owned by one seller, applied to that seller's order
    Seller(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_voucher_input", skip_on_field_errors = false))]
pub struct CreateVoucherInput {
    #[validate(length(min = 1, max = 64, message = "Voucher code must be 1-64 characters"))]
    pub code: String,
    pub seller_id: Option<Uuid>,
    pub amount_type: AmountType,
    pub amount: Decimal,
    #[serde(default)]
    pub min_spending: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

fn validate_voucher_input(input: &CreateVoucherInput) -> Result<(), ValidationError> {
    if input.code.trim().is_empty() {
        let mut err = ValidationError::new("code");
        err.message = Some("Voucher code must not be blank".into());
        return Err(err);
    }
    if let Err(message) = input.amount_type.validate_amount(input.amount) {
        let mut err = ValidationError::new("amount");
        err.message = Some(message.into());
        return Err(err);
    }
    if input.min_spending < Decimal::ZERO {
        let mut err = ValidationError::new("min_spending");
        err.message = Some("min_spending must not be negative".into());
        return Err(err);
    }
    if input.start_date >= input.end_date {
        let mut err = ValidationError::new("window");
        err.message = Some("start_date must be before end_date".into());
        return Err(err);
    }
    Ok(())
}

/// Voucher creation and lookup.
#[derive(Clone)]
pub struct VoucherService {
    db: Arc<DatabaseConnection>,
}

impl VoucherService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(code = %input.code))]
    pub async fn create_voucher(
        &self,
        input: CreateVoucherInput,
    ) -> Result<VoucherModel, ServiceError> {
        input.validate()?;

        let code = input.code.trim().to_string();
        let taken = Voucher::find()
            .filter(voucher::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?
            .is_some();
        if taken {
            return Err(ServiceError::Conflict(format!(
                "Voucher code {} already exists",
                code
            )));
        }

        let voucher = voucher::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            seller_id: Set(input.seller_id),
            amount_type: Set(input.amount_type),
            amount: Set(input.amount),
            min_spending: Set(input.min_spending),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!("Created voucher {} ({})", voucher.code, voucher.id);
        Ok(voucher)
    }

    /// Resolves `code` within `scope` and checks its validity window.
    ///
    /// A blank code means no voucher was requested and yields `Ok(None)`.
    pub async fn resolve<C>(
        conn: &C,
        code: &str,
        scope: VoucherScope,
        now: DateTime<Utc>,
    ) -> Result<Option<VoucherModel>, ServiceError>
    where
        C: ConnectionTrait,
    {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }

        let query = Voucher::find().filter(voucher::Column::Code.eq(code));
        let query = match scope {
            VoucherScope::Global => query.filter(voucher::Column::SellerId.is_null()),
            VoucherScope::Seller(seller_id) => {
                query.filter(voucher::Column::SellerId.eq(seller_id))
            }
        };

        let voucher = query
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::VoucherInvalid(format!("voucher {} not found", code)))?;

        if now < voucher.start_date {
            return Err(ServiceError::VoucherInvalid(format!(
                "voucher {} is not active yet",
                code
            )));
        }
        if now >= voucher.end_date {
            return Err(ServiceError::VoucherInvalid(format!(
                "voucher {} has expired",
                code
            )));
        }

        debug!(voucher_id = %voucher.id, ?scope, "voucher resolved");
        Ok(Some(voucher))
    }

    /// Discount `voucher` grants against `base`.
    ///
    /// With `enforce_min_spending` a base below the voucher's threshold is
    /// rejected instead of discounted.
    pub fn discount_for(
        voucher: &VoucherModel,
        base: Decimal,
        enforce_min_spending: bool,
    ) -> Result<Decimal, ServiceError> {
        if enforce_min_spending && base < voucher.min_spending {
            return Err(ServiceError::VoucherInvalid(format!(
                "voucher {} requires a minimum spend of {}",
                voucher.code, voucher.min_spending
            )));
        }

        Ok(pricing_service::voucher_discount(
            base,
            voucher.amount_type,
            voucher.amount,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn voucher(amount_type: AmountType, amount: Decimal, min_spending: Decimal) -> VoucherModel {
        let now = Utc::now();
        VoucherModel {
            id: Uuid::new_v4(),
            code: "SAVE".into(),
            seller_id: None,
            amount_type,
            amount,
            min_spending,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            created_at: now,
        }
    }

    fn input() -> CreateVoucherInput {
        let now = Utc::now();
        CreateVoucherInput {
            code: "SPRING".into(),
            seller_id: None,
            amount_type: AmountType::Percent,
            amount: dec!(10),
            min_spending: dec!(0),
            start_date: now,
            end_date: now + Duration::days(7),
        }
    }

    #[test]
    fn min_spending_is_enforced_when_enabled() {
        let v = voucher(AmountType::Nominal, dec!(10), dec!(100));
        assert_matches!(
            VoucherService::discount_for(&v, dec!(99), true),
            Err(ServiceError::VoucherInvalid(_))
        );
        assert_eq!(
            VoucherService::discount_for(&v, dec!(99), false).unwrap(),
            dec!(10)
        );
        assert_eq!(
            VoucherService::discount_for(&v, dec!(100), true).unwrap(),
            dec!(10)
        );
    }

    #[test]
    fn percent_voucher_discounts_a_share_of_the_base() {
        let v = voucher(AmountType::Percent, dec!(25), dec!(0));
        assert_eq!(
            VoucherService::discount_for(&v, dec!(80), true).unwrap(),
            dec!(20)
        );
    }

    #[test]
    fn create_input_validation() {
        assert!(input().validate().is_ok());

        let mut too_much = input();
        too_much.amount = dec!(101);
        assert!(too_much.validate().is_err());

        let mut inverted = input();
        inverted.end_date = inverted.start_date - Duration::hours(1);
        assert!(inverted.validate().is_err());

        let mut blank = input();
        blank.code = String::new();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn whitespace_only_code_is_rejected() {
        let mut spaces = input();
        spaces.code = "   ".into();
        assert!(spaces.validate().is_err());

        let mut padded = input();
        padded.code = "  SPRING  ".into();
        assert!(padded.validate().is_ok());
    }
}
