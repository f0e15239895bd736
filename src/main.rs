use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
};
use tracing::{error, info, warn};

use storefront_api as api;
use storefront_api::auth::handoff::{InMemoryHandoffStore, RedisHandoffStore, SessionHandoffStore};
use storefront_api::services::gateway::{DisabledGateway, PaymentGateway};
use storefront_api::services::stripe::StripeGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate || !cfg.is_production() {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    let handoff_store: Arc<dyn SessionHandoffStore> =
        match cfg.handoff_store_backend.to_ascii_lowercase().as_str() {
            "redis" => {
                let client = redis::Client::open(cfg.redis_url.clone())
                    .context("invalid redis url")?;
                Arc::new(
                    RedisHandoffStore::connect(client)
                        .await
                        .context("failed to connect to redis")?,
                )
            }
            _ => Arc::new(InMemoryHandoffStore::new()),
        };
    info!(backend = handoff_store.backend(), "Session handoff store ready");

    let gateway: Arc<dyn PaymentGateway> = match cfg.stripe_secret_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Arc::new(
            StripeGateway::new(
                key.trim(),
                &cfg.stripe_api_base,
                Duration::from_secs(cfg.stripe_timeout_secs),
            )
            .context("failed to build Stripe client")?,
        ),
        _ => {
            warn!("STRIPE secret key not configured; checkout is disabled");
            Arc::new(DisabledGateway)
        }
    };

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity.max(1));
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    let auth_service = Arc::new(api::auth::AuthService::new(
        api::auth::AuthConfig::from(&cfg),
        handoff_store,
    ));

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        Arc::new(event_sender.clone()),
        gateway,
        &cfg,
    );

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
        auth: auth_service,
    };

    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let cors_layer = if origins.is_empty() {
        info!("No CORS origins configured; using permissive CORS for development");
        CorsLayer::permissive()
    } else {
        // Credentials cannot be combined with wildcard headers or methods
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                http::Method::GET,
                http::Method::POST,
                http::Method::PUT,
                http::Method::DELETE,
                http::Method::OPTIONS,
            ])
            .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
            .allow_credentials(cfg.cors_allow_credentials)
    };

    api::handlers::health::init_start_time();

    let app = api::app_router(app_state)
        .layer(TimeoutLayer::new(Duration::from_secs(cfg.request_timeout_secs)))
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address '{}'", cfg.host))?;
    let addr = SocketAddr::new(host, cfg.port);
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
