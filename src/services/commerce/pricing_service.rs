use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::commerce::{promotion, AmountType};

/// Priced cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePrice {
    /// Unit price after any nominal promotion
    pub unit_price: Decimal,
    /// Quantity-weighted total after promotion
    pub subtotal: Decimal,
}

/// Prices one cart line against the product's promotion, if it is active at `now`.
///
/// Percent promotions discount only the subtotal and leave the unit price as
/// listed. Nominal promotions lower the unit price, floored at zero.
pub fn price_line(
    price: Decimal,
    quantity: i32,
    promotion: Option<&promotion::Model>,
    now: DateTime<Utc>,
) -> LinePrice {
    let qty = Decimal::from(quantity);
    let undiscounted = LinePrice {
        unit_price: price,
        subtotal: price * qty,
    };

    let Some(promo) = promotion.filter(|p| p.is_active_at(now)) else {
        return undiscounted;
    };

    match promo.amount_type {
        AmountType::Percent => {
            let pct = promo.amount.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
            LinePrice {
                unit_price: price,
                subtotal: undiscounted.subtotal * (Decimal::ONE_HUNDRED - pct)
                    / Decimal::ONE_HUNDRED,
            }
        }
        AmountType::Nominal => {
            let unit_price = (price - promo.amount).max(Decimal::ZERO);
            LinePrice {
                unit_price,
                subtotal: unit_price * qty,
            }
        }
    }
}

/// Discount a voucher grants against `base`.
///
/// Percent vouchers take `amount` percent of the base, nominal vouchers take
/// `amount` flat. The result is always within `[0, base]`.
pub fn voucher_discount(base: Decimal, amount_type: AmountType, amount: Decimal) -> Decimal {
    if base <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let raw = match amount_type {
        AmountType::Percent => base * amount / Decimal::ONE_HUNDRED,
        AmountType::Nominal => amount,
    };

    raw.clamp(Decimal::ZERO, base)
}
