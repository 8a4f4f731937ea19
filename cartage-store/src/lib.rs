pub mod app_config;
pub mod memory;
pub mod notifications;

pub use memory::MemoryStore;
pub use notifications::StoreNotificationSink;
