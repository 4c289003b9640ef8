pub mod in_memory_queue;
pub mod memory_repository;
pub mod notifier;
pub mod observability;
pub mod rabbitmq_queue;
pub mod sqlite_audit_store;

pub use in_memory_queue::*;
pub use memory_repository::*;
pub use notifier::*;
pub use observability::*;
pub use rabbitmq_queue::*;
pub use sqlite_audit_store::*;
