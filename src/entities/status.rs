use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle shared by orders and the transaction envelope that owns them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[sea_orm(string_value = "waiting for payment")]
    #[strum(serialize = "waiting for payment")]
    WaitingForPayment,
    #[sea_orm(string_value = "waiting for seller")]
    #[strum(serialize = "waiting for seller")]
    WaitingForSeller,
    #[sea_orm(string_value = "on delivery")]
    #[strum(serialize = "on delivery")]
    OnDelivery,
    #[sea_orm(string_value = "delivered")]
    #[strum(serialize = "delivered")]
    Delivered,
    #[sea_orm(string_value = "done")]
    #[strum(serialize = "done")]
    Done,
    #[sea_orm(string_value = "complained")]
    #[strum(serialize = "complained")]
    Complained,
    #[sea_orm(string_value = "refunded")]
    #[strum(serialize = "refunded")]
    Refunded,
    #[sea_orm(string_value = "cancelled")]
    #[strum(serialize = "cancelled")]
    Cancelled,
}

impl FulfillmentStatus {
    pub fn can_transition_to(self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;

        matches!(
            (self, next),
            (WaitingForPayment, WaitingForSeller)
                | (WaitingForPayment, Cancelled)
                | (WaitingForSeller, OnDelivery)
                | (WaitingForSeller, Cancelled)
                | (OnDelivery, Delivered)
                | (Delivered, Done)
                | (Delivered, Complained)
                | (Complained, Refunded)
                | (Complained, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Done | FulfillmentStatus::Refunded | FulfillmentStatus::Cancelled
        )
    }
}

/// How a transaction is paid. Anything other than the internal wallet is
/// settled by an external payment account.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "wallet")]
    Wallet,
    #[sea_orm(string_value = "external")]
    #[serde(other)]
    External,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(FulfillmentStatus::WaitingForPayment, FulfillmentStatus::WaitingForSeller, true)]
    #[test_case(FulfillmentStatus::WaitingForSeller, FulfillmentStatus::OnDelivery, true)]
    #[test_case(FulfillmentStatus::OnDelivery, FulfillmentStatus::Delivered, true)]
    #[test_case(FulfillmentStatus::Delivered, FulfillmentStatus::Complained, true)]
    #[test_case(FulfillmentStatus::Complained, FulfillmentStatus::Refunded, true)]
    #[test_case(FulfillmentStatus::WaitingForSeller, FulfillmentStatus::Done, false)]
    #[test_case(FulfillmentStatus::OnDelivery, FulfillmentStatus::Cancelled, false)]
    #[test_case(FulfillmentStatus::Refunded, FulfillmentStatus::Done, false)]
    #[test_case(FulfillmentStatus::Done, FulfillmentStatus::Complained, false)]
    fn transition_table(from: FulfillmentStatus, to: FulfillmentStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states_have_no_successors() {
        use sea_orm::Iterable;

        for status in FulfillmentStatus::iter().filter(|s| s.is_terminal()) {
            assert!(
                FulfillmentStatus::iter().all(|next| !status.can_transition_to(next)),
                "{status} should be terminal"
            );
        }
    }

    #[test]
    fn display_matches_stored_value() {
        assert_eq!(
            FulfillmentStatus::WaitingForSeller.to_string(),
            "waiting for seller"
        );
        assert_eq!(PaymentMethod::Wallet.to_string(), "wallet");
    }

    #[test]
    fn unknown_payment_methods_are_external() {
        let method: PaymentMethod = serde_json::from_str("\"bank_transfer\"").unwrap();
        assert_eq!(method, PaymentMethod::External);
        let method: PaymentMethod = serde_json::from_str("\"wallet\"").unwrap();
        assert_eq!(method, PaymentMethod::Wallet);
    }
}
