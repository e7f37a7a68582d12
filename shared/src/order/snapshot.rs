//! Order record - the authoritative state of one order
//!
//! Every mutation replaces the whole snapshot and bumps `revision` by one.
//! Clients receiving snapshots out of order should keep the one with the
//! highest revision.

use super::types::{LineItem, NewOrder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    PendingAcceptance,
    Accepted,
    Rejected,
    SentToKitchen,
    ReceivedByKitchen,
    Preparing,
    Ready,
    Served,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Wire name, identical to the serde representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingAcceptance => "PENDING_ACCEPTANCE",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::SentToKitchen => "SENT_TO_KITCHEN",
            OrderStatus::ReceivedByKitchen => "RECEIVED_BY_KITCHEN",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Served => "SERVED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// No outgoing edges
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected | OrderStatus::Completed | OrderStatus::Cancelled
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamp per lifecycle edge (Unix milliseconds)
///
/// Each slot is written exactly once by the transition that produces the
/// matching state and never rewritten afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderTimestamps {
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_to_kitchen_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_by_kitchen_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparing_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl OrderTimestamps {
    /// Slot stamped when the order enters `status`
    ///
    /// `PendingAcceptance` has no slot: entering it is creation, which is
    /// recorded in `created_at`.
    pub fn slot_mut(&mut self, status: OrderStatus) -> Option<&mut Option<i64>> {
        match status {
            OrderStatus::PendingAcceptance => None,
            OrderStatus::Accepted => Some(&mut self.accepted_at),
            OrderStatus::Rejected => Some(&mut self.rejected_at),
            OrderStatus::Cancelled => Some(&mut self.cancelled_at),
            OrderStatus::SentToKitchen => Some(&mut self.sent_to_kitchen_at),
            OrderStatus::ReceivedByKitchen => Some(&mut self.received_by_kitchen_at),
            OrderStatus::Preparing => Some(&mut self.preparing_at),
            OrderStatus::Ready => Some(&mut self.ready_at),
            OrderStatus::Served => Some(&mut self.served_at),
            OrderStatus::Completed => Some(&mut self.completed_at),
        }
    }

    /// Read-only view of [`slot_mut`](Self::slot_mut)
    pub fn get(&self, status: OrderStatus) -> Option<i64> {
        match status {
            OrderStatus::PendingAcceptance => Some(self.created_at),
            OrderStatus::Accepted => self.accepted_at,
            OrderStatus::Rejected => self.rejected_at,
            OrderStatus::Cancelled => self.cancelled_at,
            OrderStatus::SentToKitchen => self.sent_to_kitchen_at,
            OrderStatus::ReceivedByKitchen => self.received_by_kitchen_at,
            OrderStatus::Preparing => self.preparing_at,
            OrderStatus::Ready => self.ready_at,
            OrderStatus::Served => self.served_at,
            OrderStatus::Completed => self.completed_at,
        }
    }
}

/// Order snapshot - the full record stored and broadcast
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSnapshot {
    /// External order identifier
    pub order_id: String,
    /// Owning restaurant (tenant)
    pub restaurant_id: String,
    /// Table the order was placed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    /// Lifecycle state
    pub status: OrderStatus,
    /// Optimistic-lock counter, +1 per committed mutation
    pub revision: u64,
    /// Waiter currently accountable for the order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsible_party: Option<String>,
    /// Set by the escalation monitor, only ever true while pending
    #[serde(default)]
    pub escalated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<i64>,
    /// Line items, frozen once the order leaves pending
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    /// Set by billing, orthogonal to the lifecycle
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub timestamps: OrderTimestamps,
    /// Last commit time (Unix milliseconds)
    pub updated_at: i64,
}

impl OrderSnapshot {
    /// Build the initial record for an intake payload
    pub fn from_new(order_id: String, new: NewOrder, now: i64) -> Self {
        Self {
            order_id,
            restaurant_id: new.restaurant_id,
            table_id: new.table_id,
            status: OrderStatus::PendingAcceptance,
            revision: 0,
            responsible_party: new.responsible_party,
            escalated: false,
            escalated_at: None,
            items: new.items,
            subtotal: new.subtotal,
            tax: new.tax,
            total: new.total,
            is_paid: false,
            rejection_reason: None,
            timestamps: OrderTimestamps {
                created_at: now,
                ..Default::default()
            },
            updated_at: now,
        }
    }

    pub fn created_at(&self) -> i64 {
        self.timestamps.created_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::PendingAcceptance
    }

    pub fn is_assigned(&self) -> bool {
        self.responsible_party.is_some()
    }

    /// Whether `actor_id` is the current responsible party
    pub fn is_responsible(&self, actor_id: &str) -> bool {
        self.responsible_party.as_deref() == Some(actor_id)
    }

    /// Drop the escalation flag together with its timestamp
    pub fn clear_escalation(&mut self) {
        self.escalated = false;
        self.escalated_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order() -> NewOrder {
        NewOrder {
            order_id: None,
            restaurant_id: "r-1".to_string(),
            table_id: Some("t-4".to_string()),
            responsible_party: Some("w-1".to_string()),
            items: vec![LineItem {
                menu_item_id: "m-1".to_string(),
                name: "Paella".to_string(),
                quantity: 2,
                modifiers: vec![],
                note: None,
            }],
            subtotal: Decimal::new(2400, 2),
            tax: Decimal::new(240, 2),
            total: Decimal::new(2640, 2),
        }
    }

    #[test]
    fn test_from_new_starts_pending_at_revision_zero() {
        let order = OrderSnapshot::from_new("o-1".to_string(), new_order(), 1_000);
        assert_eq!(order.status, OrderStatus::PendingAcceptance);
        assert_eq!(order.revision, 0);
        assert_eq!(order.created_at(), 1_000);
        assert!(order.is_responsible("w-1"));
        assert!(!order.escalated);
        assert!(order.timestamps.accepted_at.is_none());
    }

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::ReceivedByKitchen).unwrap();
        assert_eq!(json, "\"RECEIVED_BY_KITCHEN\"");
        assert_eq!(
            OrderStatus::ReceivedByKitchen.as_str(),
            "RECEIVED_BY_KITCHEN"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Served.is_terminal());
        assert!(!OrderStatus::PendingAcceptance.is_terminal());
    }

    #[test]
    fn test_timestamp_slots() {
        let mut ts = OrderTimestamps::default();
        assert!(ts.slot_mut(OrderStatus::PendingAcceptance).is_none());
        *ts.slot_mut(OrderStatus::Ready).unwrap() = Some(42);
        assert_eq!(ts.get(OrderStatus::Ready), Some(42));
        assert_eq!(ts.ready_at, Some(42));
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let order = OrderSnapshot::from_new("o-1".to_string(), new_order(), 1_000);
        let json = serde_json::to_string(&order).unwrap();
        let back: OrderSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
