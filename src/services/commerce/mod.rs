/// Commerce services: catalog, cart, pricing, vouchers and checkout
pub mod cart_service;
pub mod catalog_service;
pub mod checkout_service;
pub mod pricing_service;
pub mod voucher_service;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, CartService, CheckoutLine};
pub use catalog_service::{
    CatalogService, CreateProductInput, CreatePromotionInput, CreateVariantInput,
};
pub use checkout_service::{CheckoutRequest, CheckoutService, CheckoutSummary, SellerCart};
pub use pricing_service::LinePrice;
pub use voucher_service::{CreateVoucherInput, VoucherScope, VoucherService};
