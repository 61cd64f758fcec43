/// Commerce catalog, cart and voucher entities
pub mod commerce;
pub mod order;
pub mod order_item;
pub mod status;
pub mod transaction;
pub mod wallet;
pub mod wallet_transaction;

pub use status::{FulfillmentStatus, PaymentMethod};
