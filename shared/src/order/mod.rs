//! Order lifecycle module
//!
//! Types shared by the server and its clients:
//! - Snapshots: the authoritative order record
//! - Requests: transition, reassignment and payment-flag inputs
//! - Events: pushed to observers after each committed mutation
//! - Topics: tenant-scoped broadcast channels

pub mod event;
pub mod snapshot;
pub mod topic;
pub mod types;

// Re-exports
pub use event::{OrderEvent, OrderEventKind};
pub use snapshot::{OrderSnapshot, OrderStatus, OrderTimestamps};
pub use topic::{Topic, TopicError};
pub use types::*;
