//! Order events - pushed to observers after every committed mutation

use super::snapshot::{OrderSnapshot, OrderStatus};
use serde::{Deserialize, Serialize};

/// Order event - one per committed mutation
///
/// The embedded snapshot is authoritative; observers reconcile by keeping
/// the highest `revision` per order rather than trusting arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEvent {
    /// Event unique ID
    pub event_id: String,
    pub kind: OrderEventKind,
    pub order_id: String,
    pub restaurant_id: String,
    /// `None` for creation
    pub previous_state: Option<OrderStatus>,
    pub new_state: OrderStatus,
    /// Actor that caused the mutation (`system` for the escalation monitor)
    pub actor: String,
    /// Revision after the commit
    pub revision: u64,
    /// Full order after the commit
    pub order: OrderSnapshot,
    /// Server timestamp (Unix milliseconds)
    pub timestamp: i64,
}

impl OrderEvent {
    /// Build an event from the committed snapshot
    pub fn new(
        kind: OrderEventKind,
        previous_state: Option<OrderStatus>,
        actor: impl Into<String>,
        order: OrderSnapshot,
        timestamp: i64,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            kind,
            order_id: order.order_id.clone(),
            restaurant_id: order.restaurant_id.clone(),
            previous_state,
            new_state: order.status,
            actor: actor.into(),
            revision: order.revision,
            order,
            timestamp,
        }
    }
}

/// What kind of mutation produced the event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventKind {
    Created,
    Transitioned,
    Escalated,
    Reassigned,
    PaymentUpdated,
}

impl std::fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderEventKind::Created => write!(f, "CREATED"),
            OrderEventKind::Transitioned => write!(f, "TRANSITIONED"),
            OrderEventKind::Escalated => write!(f, "ESCALATED"),
            OrderEventKind::Reassigned => write!(f, "REASSIGNED"),
            OrderEventKind::PaymentUpdated => write!(f, "PAYMENT_UPDATED"),
        }
    }
}
