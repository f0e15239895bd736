pub mod addresses;
pub mod auth;
pub mod common;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    AddressService, CatalogService, CheckoutSettings, OrderService, PaymentGateway,
    PaymentService, SettlementService, UserService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub addresses: Arc<AddressService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub settlement: Arc<SettlementService>,
    pub users: Arc<UserService>,
}

impl AppServices {
    /// Wires every service to one pool, one event bus and one payment gateway.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.default_product_image.clone(),
        ));
        let addresses = Arc::new(AddressService::new(db_pool.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.client_base(),
            config.delivery_lead_days,
        ));
        let payments = Arc::new(PaymentService::new(
            db_pool.clone(),
            event_sender.clone(),
            gateway.clone(),
            CheckoutSettings::from(config),
        ));
        let settlement = Arc::new(SettlementService::new(
            db_pool.clone(),
            event_sender,
            gateway,
        ));
        let users = Arc::new(UserService::new(db_pool));

        Self {
            catalog,
            addresses,
            orders,
            payments,
            settlement,
            users,
        }
    }
}
