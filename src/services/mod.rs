// Commerce: catalog, cart, vouchers and the checkout coordinator
pub mod commerce;

// Ledgers touched by checkout
pub mod inventory;
pub mod orders;
pub mod wallet;
