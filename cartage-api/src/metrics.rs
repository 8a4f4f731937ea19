use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub delivery_transitions_total: IntCounterVec,
    pub driver_assignments_total: IntCounterVec,
    pub payment_webhooks_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let delivery_transitions_total = IntCounterVec::new(
            Opts::new(
                "delivery_transitions_total",
                "Delivery status transitions by target status and outcome",
            ),
            &["status", "outcome"],
        )
        .expect("valid delivery_transitions_total metric");

        let driver_assignments_total = IntCounterVec::new(
            Opts::new(
                "driver_assignments_total",
                "Random driver assignments by outcome",
            ),
            &["outcome"],
        )
        .expect("valid driver_assignments_total metric");

        let payment_webhooks_total = IntCounterVec::new(
            Opts::new(
                "payment_webhooks_total",
                "Gateway webhook deliveries by outcome",
            ),
            &["outcome"],
        )
        .expect("valid payment_webhooks_total metric");

        registry
            .register(Box::new(delivery_transitions_total.clone()))
            .expect("register delivery_transitions_total");
        registry
            .register(Box::new(driver_assignments_total.clone()))
            .expect("register driver_assignments_total");
        registry
            .register(Box::new(payment_webhooks_total.clone()))
            .expect("register payment_webhooks_total");

        Self {
            registry,
            delivery_transitions_total,
            driver_assignments_total,
            payment_webhooks_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
