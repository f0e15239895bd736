//! Seed data script - populates the database with a small demo catalog
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - 4 products with size/color variants
//! - an admin user and a shopper with a shipping address
//! - a one-time sign-in session for each user

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use storefront_api::{
    auth::{AuthConfig, AuthService, InMemoryHandoffStore, RedisHandoffStore, SessionHandoffStore},
    config, db,
    events::{self, EventSender},
    services::{
        addresses::AddressInput,
        catalog::{CreateProductRequest, VariantInput},
        AddressService, CatalogService, UserService,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing("info", false);

    info!("=== Storefront Seed Data ===");

    let pool = Arc::new(db::establish_connection_from_app_config(&cfg).await?);
    db::run_migrations(&pool).await?;

    let (tx, rx) = mpsc::channel(cfg.event_channel_capacity.max(1));
    let sender = Arc::new(EventSender::new(tx));
    let drain = tokio::spawn(events::process_events(rx));

    let catalog = CatalogService::new(
        pool.clone(),
        sender.clone(),
        cfg.default_product_image.clone(),
    );
    let addresses = AddressService::new(pool.clone(), sender.clone());
    let users = UserService::new(pool.clone());

    info!("Creating products...");
    let mut created = 0;
    for request in demo_products() {
        let product = catalog.create_product(request).await?;
        info!(product_id = %product.id, name = %product.name, "  created");
        created += 1;
    }
    info!("  Created {} products", created);

    info!("Creating users...");
    let admin = users
        .find_or_create("Store Admin", "admin@storefront.test", &["admin", "user"])
        .await?;
    let shopper = users
        .find_or_create("Asha Verma", "asha@storefront.test", &["user"])
        .await?;

    let address = addresses
        .add_address(
            shopper.id,
            AddressInput {
                full_name: "Asha Verma".to_string(),
                phone: "9876543210".to_string(),
                pincode: "560001".to_string(),
                state: "Karnataka".to_string(),
                city: "Bengaluru".to_string(),
                house_no: "42".to_string(),
                road: Some("MG Road".to_string()),
                area: Some("Ashok Nagar".to_string()),
            },
        )
        .await?;
    info!(address_id = %address.id, "  Shopper address created");

    let handoff: Arc<dyn SessionHandoffStore> =
        if cfg.handoff_store_backend.eq_ignore_ascii_case("redis") {
            Arc::new(RedisHandoffStore::connect(redis::Client::open(cfg.redis_url.clone())?).await?)
        } else {
            Arc::new(InMemoryHandoffStore::new())
        };
    let auth = AuthService::new(AuthConfig::from(&cfg), handoff.clone());

    for user in [&admin, &shopper] {
        let session = auth.begin_handoff(user).await?;
        info!(
            email = %user.email,
            "  Sign in at {}/auth/session/{}",
            cfg.client_base(),
            session.session_id
        );
    }
    if handoff.backend() == "in-memory" {
        info!("  (in-memory handoff store: sessions above are only valid inside this process)");
    }

    drop(catalog);
    drop(addresses);
    drop(sender);
    let handled = drain.await?;
    info!(events = handled, "\n=== Seed Data Complete ===");
    info!("Try: curl http://{}:{}/getProduct", cfg.host, cfg.port);
    info!("Or explore interactively at: http://{}:{}/swagger-ui", cfg.host, cfg.port);

    Ok(())
}

fn variant(size: &str, color: &str, stock: i32, price: rust_decimal::Decimal) -> VariantInput {
    VariantInput {
        size: size.to_string(),
        color: color.to_string(),
        stock,
        price,
    }
}

fn demo_products() -> Vec<CreateProductRequest> {
    vec![
        CreateProductRequest {
            name: "Classic Cotton T-Shirt".to_string(),
            description: "Premium organic cotton t-shirt with a relaxed fit.".to_string(),
            category: "Apparel".to_string(),
            price: dec!(499.00),
            discount: dec!(10),
            images: vec![],
            rating: dec!(4.3),
            brand: Some("Northline".to_string()),
            tags: vec!["basics".to_string(), "cotton".to_string()],
            variants: vec![
                variant("S", "Black", 25, dec!(499.00)),
                variant("M", "Black", 40, dec!(499.00)),
                variant("L", "White", 15, dec!(549.00)),
            ],
        },
        CreateProductRequest {
            name: "Slim Fit Denim Jeans".to_string(),
            description: "Stretch denim jeans with a modern slim fit.".to_string(),
            category: "Apparel".to_string(),
            price: dec!(1899.00),
            discount: dec!(0),
            images: vec![],
            rating: dec!(4.6),
            brand: Some("Northline".to_string()),
            tags: vec!["denim".to_string()],
            variants: vec![
                variant("30", "Indigo", 12, dec!(1899.00)),
                variant("32", "Indigo", 8, dec!(1899.00)),
            ],
        },
        CreateProductRequest {
            name: "Canvas Backpack 25L".to_string(),
            description: "Water-resistant canvas backpack with a laptop sleeve.".to_string(),
            category: "Accessories".to_string(),
            price: dec!(2499.00),
            discount: dec!(15),
            images: vec![],
            rating: dec!(4.1),
            brand: None,
            tags: vec!["bags".to_string(), "travel".to_string()],
            variants: vec![variant("One Size", "Olive", 30, dec!(2499.00))],
        },
        CreateProductRequest {
            name: "Merino Wool Sweater".to_string(),
            description: "Temperature-regulating merino sweater for cool evenings.".to_string(),
            category: "Apparel".to_string(),
            price: dec!(3299.00),
            discount: dec!(5),
            images: vec![],
            rating: dec!(4.8),
            brand: Some("Fjellwear".to_string()),
            tags: vec!["wool".to_string(), "winter".to_string()],
            variants: vec![
                variant("M", "Grey", 0, dec!(3299.00)),
                variant("L", "Navy", 6, dec!(3299.00)),
            ],
        },
    ]
}
