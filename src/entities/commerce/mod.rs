/// Commerce entities module
pub mod amount_type;
pub mod cart_item;
pub mod product;
pub mod product_variant;
pub mod promotion;
pub mod voucher;

// Re-export entities
pub use amount_type::AmountType;
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use promotion::{Entity as Promotion, Model as PromotionModel};
pub use voucher::{Entity as Voucher, Model as VoucherModel};
