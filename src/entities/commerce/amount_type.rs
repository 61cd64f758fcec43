use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a promotion or voucher amount is interpreted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum AmountType {
    /// `amount` is a percentage in `[0, 100]`
    #[sea_orm(string_value = "percent")]
    Percent,
    /// `amount` is an absolute currency value
    #[sea_orm(string_value = "nominal")]
    Nominal,
}

impl AmountType {
    /// Checks the amount against the type's domain.
    pub fn validate_amount(self, amount: Decimal) -> Result<(), String> {
        if amount < Decimal::ZERO {
            return Err("amount must not be negative".to_string());
        }
        if self == AmountType::Percent && amount > Decimal::ONE_HUNDRED {
            return Err("percent amount must not exceed 100".to_string());
        }
        Ok(())
    }
}
