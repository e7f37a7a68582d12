//! Order requests and line items

use super::snapshot::OrderStatus;
use crate::error::{AppError, ErrorCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a rejection reason (characters)
pub const MAX_REASON_LEN: usize = 500;

// ============================================================================
// Line Items
// ============================================================================

/// One line of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    /// Menu item reference (owned by the catalog)
    pub menu_item_id: String,
    /// Name snapshot at order time
    pub name: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Intake payload - creates an order in `PENDING_ACCEPTANCE`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// Caller-chosen id; a UUID is assigned when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub restaurant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    /// Pre-assignment from the table to waiter mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_party: Option<String>,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl NewOrder {
    /// Validate the intake payload before anything is stored
    pub fn validate(&self) -> Result<(), AppError> {
        if self.restaurant_id.trim().is_empty() {
            return Err(
                AppError::new(ErrorCode::RequiredField).with_detail("field", "restaurant_id")
            );
        }
        if self
            .order_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(
                AppError::validation("order_id must not be blank").with_detail("field", "order_id")
            );
        }
        if self.items.is_empty() {
            return Err(AppError::new(ErrorCode::OrderEmpty));
        }
        for (index, item) in self.items.iter().enumerate() {
            if item.menu_item_id.trim().is_empty() {
                return Err(AppError::new(ErrorCode::RequiredField)
                    .with_detail("field", "menu_item_id")
                    .with_detail("index", index));
            }
            if item.quantity == 0 {
                return Err(AppError::with_message(
                    ErrorCode::ValueOutOfRange,
                    "quantity must be at least 1",
                )
                .with_detail("index", index));
            }
        }
        if self.subtotal.is_sign_negative()
            || self.tax.is_sign_negative()
            || self.total.is_sign_negative()
        {
            return Err(AppError::with_message(
                ErrorCode::ValueOutOfRange,
                "totals must not be negative",
            ));
        }
        let Some(sum) = self.subtotal.checked_add(self.tax) else {
            return Err(AppError::with_message(
                ErrorCode::ValueOutOfRange,
                "totals out of range",
            ));
        };
        if sum != self.total {
            return Err(AppError::validation("total must equal subtotal + tax")
                .with_detail("subtotal", self.subtotal.to_string())
                .with_detail("tax", self.tax.to_string())
                .with_detail("total", self.total.to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Transition Actions
// ============================================================================

/// Lifecycle action requested by an actor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TransitionAction {
    Accept,
    Reject,
    Cancel,
    SendToKitchen,
    MarkReceived,
    MarkPreparing,
    MarkReady,
    MarkServed,
    Complete,
}

impl TransitionAction {
    pub const ALL: [TransitionAction; 9] = [
        TransitionAction::Accept,
        TransitionAction::Reject,
        TransitionAction::Cancel,
        TransitionAction::SendToKitchen,
        TransitionAction::MarkReceived,
        TransitionAction::MarkPreparing,
        TransitionAction::MarkReady,
        TransitionAction::MarkServed,
        TransitionAction::Complete,
    ];

    /// The only state this action may leave
    pub const fn source(&self) -> OrderStatus {
        match self {
            TransitionAction::Accept | TransitionAction::Reject | TransitionAction::Cancel => {
                OrderStatus::PendingAcceptance
            }
            TransitionAction::SendToKitchen => OrderStatus::Accepted,
            TransitionAction::MarkReceived => OrderStatus::SentToKitchen,
            TransitionAction::MarkPreparing => OrderStatus::ReceivedByKitchen,
            TransitionAction::MarkReady => OrderStatus::Preparing,
            TransitionAction::MarkServed => OrderStatus::Ready,
            TransitionAction::Complete => OrderStatus::Served,
        }
    }

    /// State entered on success
    pub const fn target(&self) -> OrderStatus {
        match self {
            TransitionAction::Accept => OrderStatus::Accepted,
            TransitionAction::Reject => OrderStatus::Rejected,
            TransitionAction::Cancel => OrderStatus::Cancelled,
            TransitionAction::SendToKitchen => OrderStatus::SentToKitchen,
            TransitionAction::MarkReceived => OrderStatus::ReceivedByKitchen,
            TransitionAction::MarkPreparing => OrderStatus::Preparing,
            TransitionAction::MarkReady => OrderStatus::Ready,
            TransitionAction::MarkServed => OrderStatus::Served,
            TransitionAction::Complete => OrderStatus::Completed,
        }
    }

    /// One-shot decisions on a pending order; repeating one after someone
    /// else decided yields `AlreadyResolved` instead of `InvalidTransition`
    pub const fn is_decision(&self) -> bool {
        matches!(
            self,
            TransitionAction::Accept | TransitionAction::Reject | TransitionAction::Cancel
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TransitionAction::Accept => "accept",
            TransitionAction::Reject => "reject",
            TransitionAction::Cancel => "cancel",
            TransitionAction::SendToKitchen => "sendToKitchen",
            TransitionAction::MarkReceived => "markReceived",
            TransitionAction::MarkPreparing => "markPreparing",
            TransitionAction::MarkReady => "markReady",
            TransitionAction::MarkServed => "markServed",
            TransitionAction::Complete => "complete",
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransitionAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| {
                AppError::invalid_request(format!("Unknown action: {}", s)).with_detail("action", s)
            })
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Transition request from an actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub order_id: String,
    pub action: TransitionAction,
    pub actor_id: String,
    /// Revision the actor last saw
    pub expected_revision: u64,
    /// Rejection reason (only read for `reject`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Manager reassignment of a pending order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignRequest {
    pub order_id: String,
    pub new_responsible_party: String,
    pub manager_id: String,
    /// When absent, the revision read at load time is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_revision: Option<u64>,
}

/// Billing hook toggling the payment flag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFlagRequest {
    pub order_id: String,
    pub paid: bool,
    pub actor_id: String,
    pub expected_revision: u64,
}

// ============================================================================
// Actors
// ============================================================================

/// Role claim supplied by the identity collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Waiter,
    Kitchen,
    Manager,
    System,
}

impl ActorRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Waiter => "waiter",
            ActorRole::Kitchen => "kitchen",
            ActorRole::Manager => "manager",
            ActorRole::System => "system",
        }
    }
}

impl FromStr for ActorRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiter" => Ok(ActorRole::Waiter),
            "kitchen" => Ok(ActorRole::Kitchen),
            "manager" => Ok(ActorRole::Manager),
            "system" => Ok(ActorRole::System),
            other => Err(AppError::invalid_request(format!("Unknown role: {}", other))),
        }
    }
}
