use std::sync::Arc;

use cartage_core::store::DocumentStore;
use cartage_dispatch::{DeliveryLifecycleCoordinator, PaymentRules, PaymentSynchronizer};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub coordinator: Arc<DeliveryLifecycleCoordinator>,
    pub payments: Arc<PaymentSynchronizer>,
    pub metrics: Arc<Metrics>,
    pub rules: PaymentRules,
}
