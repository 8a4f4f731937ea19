pub mod gateway;
pub mod notify;
pub mod store;

pub use gateway::{GatewayError, IntentStatus, PaymentGateway, PaymentIntent, PaymentSource};
pub use notify::{Notification, NotificationPriority, NotificationSink, NotifyError};
pub use store::{BatchEntry, Document, DocumentStore, FieldOp, QueryOp, StoreError, WriteBatch};
