use std::net::SocketAddr;
use std::sync::Arc;

use cartage_api::{app, metrics::Metrics, AppState};
use cartage_core::store::DocumentStore;
use cartage_dispatch::{
    DeliveryLifecycleCoordinator, MockGateway, PaymentRules, PaymentSynchronizer,
};
use cartage_store::{MemoryStore, StoreNotificationSink};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartage_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cartage_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Cartage API on port {}", config.server.port);

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let notifications = Arc::new(StoreNotificationSink::new(store.clone()));

    // The production gateway client is wired here from `config.gateway`;
    // without credentials the in-memory gateway stands in.
    if config.gateway.secret_key.is_none() {
        tracing::warn!("no gateway credentials configured; using the in-memory gateway");
    }
    let gateway = Arc::new(MockGateway::new());

    let rules = PaymentRules {
        due_days: config.business_rules.payment_due_days,
        default_rate: config.business_rules.default_rate,
        currency: config.business_rules.currency.clone(),
    };

    let payments = Arc::new(PaymentSynchronizer::new(
        store.clone(),
        gateway,
        rules.clone(),
    ));
    let coordinator = Arc::new(DeliveryLifecycleCoordinator::new(
        store.clone(),
        notifications,
        payments.clone(),
    ));

    let app_state = AppState {
        store,
        coordinator,
        payments,
        metrics: Arc::new(Metrics::new()),
        rules,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
