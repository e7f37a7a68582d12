//! Shared types for the order lifecycle service
//!
//! Order records, lifecycle actions, broadcast events and topics, plus the
//! unified error system used on every HTTP boundary.

pub mod error;
pub mod order;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
