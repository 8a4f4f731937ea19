pub mod assignment;
pub mod fees;
pub mod lifecycle;
pub mod models;
pub mod payments;

pub use assignment::AssignmentOutcome;
pub use lifecycle::{DeliveryLifecycleCoordinator, LifecycleError, TransitionOutcome};
pub use models::{
    CrewStatus, Delivery, DeliveryStatus, GeoPoint, PaymentRecord, PaymentRules, PaymentState,
    TruckStatus,
};
pub use payments::{
    payment_view, CompletionOutcome, MockGateway, PaymentError, PaymentSynchronizer, PaymentView,
    Reconciliation,
};
