//! sea-orm entities for the storefront schema.

pub mod address;
pub mod address_order;
pub mod order;
pub mod order_line;
pub mod payment;
pub mod product;
pub mod product_variant;
pub mod user;
pub mod user_order;
