//! Order lifecycle module
//!
//! - **machine**: Pure transition rules (no I/O)
//! - **storage**: redb-backed order store with compare-and-swap commits
//! - **manager**: OrdersManager, the concurrency controller every mutation goes through
//! - **escalation**: Periodic sweep flagging orders nobody accepted in time
//! - **reassign**: Manager handover of pending orders
//!
//! # Architecture
//!
//! ```text
//! Request ─→ OrdersManager ─→ machine (guards) ─→ Storage CAS (redb)
//!                 ↑                                    │
//!   EscalationMonitor / ReassignmentCoordinator        ↓
//!                                          BroadcastDispatcher
//!                                                      │
//!                                     order:<id> + restaurant:<id>
//! ```
//!
//! # Data Flow
//!
//! 1. Actor sends a transition with the revision it last saw
//! 2. OrdersManager loads the record and runs the machine guards
//! 3. The new record is committed iff the stored revision is unchanged
//! 4. The committed snapshot is broadcast to both affected topics
//! 5. The updated record (or a typed error) is returned to the actor

pub mod escalation;
pub mod machine;
pub mod manager;
pub mod reassign;
pub mod storage;

// Re-exports
pub use escalation::{EscalationConfig, EscalationMonitor, SweepReport};
pub use machine::{TransitionError, TransitionResult};
pub use manager::{ManagerError, ManagerResult, OrdersManager, SYSTEM_ACTOR};
pub use reassign::ReassignmentCoordinator;
pub use storage::{OrderStorage, StorageError, StorageStats};
