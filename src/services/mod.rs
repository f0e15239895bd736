//! Business services. Handlers stay thin and call into these.

pub mod addresses;
pub mod catalog;
pub mod gateway;
pub mod money;
pub mod orders;
pub mod payments;
pub mod settlement;
pub mod stripe;
pub mod users;

pub use addresses::AddressService;
pub use catalog::CatalogService;
pub use gateway::PaymentGateway;
pub use orders::OrderService;
pub use payments::{CheckoutSettings, PaymentService};
pub use settlement::SettlementService;
pub use users::UserService;
