//! Order state machine - pure transition logic
//!
//! Every function here takes the current record by reference and returns a
//! new record on success. A failed attempt never touches the input, and no
//! function performs I/O, so the whole table is testable without storage.
//!
//! # Transition table
//!
//! ```text
//! PENDING_ACCEPTANCE ──accept──▶ ACCEPTED ──sendToKitchen──▶ SENT_TO_KITCHEN
//!        │  │                                                      │
//!        │  └──reject──▶ REJECTED                           markReceived
//!        └─────cancel──▶ CANCELLED                                 ▼
//!                                                         RECEIVED_BY_KITCHEN
//!   COMPLETED ◀──complete── SERVED ◀──markServed── READY ◀──markReady── PREPARING
//! ```
//!
//! # Guard order (first failure wins)
//!
//! 1. Edge legality: decision actions on a resolved order → `AlreadyResolved`,
//!    any other illegal pair → `InvalidTransition`
//! 2. `sendToKitchen` by someone other than the responsible party → `NotResponsible`
//! 3. Stale `expected_revision` → `ConcurrentModification`

use shared::order::{MAX_REASON_LEN, OrderSnapshot, OrderStatus, TransitionAction};
use thiserror::Error;

/// Rejections produced by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{action} is not allowed from {from}")]
    InvalidTransition { action: &'static str, from: OrderStatus },

    #[error("Order was already resolved: {current}")]
    AlreadyResolved { current: OrderStatus },

    #[error("Order is already escalated")]
    AlreadyEscalated,

    #[error("{actor} is not responsible for this order")]
    NotResponsible {
        actor: String,
        responsible: Option<String>,
    },

    #[error("Revision mismatch: expected {expected}, actual {actual}")]
    ConcurrentModification { expected: u64, actual: u64 },

    #[error("Invalid input: {0}")]
    Invalid(String),
}

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Successful lifecycle transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Record after the transition (revision already bumped)
    pub order: OrderSnapshot,
    pub previous_state: OrderStatus,
    pub new_state: OrderStatus,
    pub actor: String,
}

/// Apply a lifecycle action
pub fn attempt_transition(
    order: &OrderSnapshot,
    action: TransitionAction,
    actor_id: &str,
    expected_revision: u64,
    reason: Option<&str>,
    now: i64,
) -> TransitionResult<Transition> {
    let reason = normalize_reason(action, reason)?;

    // 1. Edge legality
    if order.status != action.source() {
        if action.is_decision() && order.status != OrderStatus::PendingAcceptance {
            return Err(TransitionError::AlreadyResolved {
                current: order.status,
            });
        }
        return Err(TransitionError::InvalidTransition {
            action: action.as_str(),
            from: order.status,
        });
    }

    // 2. Responsibility
    if action == TransitionAction::SendToKitchen && !order.is_responsible(actor_id) {
        return Err(TransitionError::NotResponsible {
            actor: actor_id.to_string(),
            responsible: order.responsible_party.clone(),
        });
    }

    // 3. Revision
    check_revision(order, expected_revision)?;

    let target = action.target();
    let mut next = order.clone();
    match next.timestamps.slot_mut(target) {
        Some(slot) if slot.is_none() => *slot = Some(now),
        // A set slot means the record already passed through `target`
        _ => {
            return Err(TransitionError::InvalidTransition {
                action: action.as_str(),
                from: order.status,
            });
        }
    }

    next.status = target;
    if order.status == OrderStatus::PendingAcceptance {
        next.clear_escalation();
    }
    match action {
        TransitionAction::Accept => next.responsible_party = Some(actor_id.to_string()),
        TransitionAction::Reject => next.rejection_reason = reason,
        _ => {}
    }
    bump(&mut next, now);

    Ok(Transition {
        order: next,
        previous_state: order.status,
        new_state: target,
        actor: actor_id.to_string(),
    })
}

/// Flag a stale pending order
pub fn apply_escalation(
    order: &OrderSnapshot,
    expected_revision: u64,
    now: i64,
) -> TransitionResult<OrderSnapshot> {
    if !order.is_pending() {
        return Err(TransitionError::AlreadyResolved {
            current: order.status,
        });
    }
    if order.escalated {
        return Err(TransitionError::AlreadyEscalated);
    }
    check_revision(order, expected_revision)?;

    let mut next = order.clone();
    next.escalated = true;
    next.escalated_at = Some(now);
    bump(&mut next, now);
    Ok(next)
}

/// Hand a pending order to another waiter and clear its escalation
///
/// Only escalated or unassigned orders can be reassigned. An order that was
/// decided in the meantime fails with `AlreadyResolved`.
pub fn apply_reassignment(
    order: &OrderSnapshot,
    new_responsible_party: &str,
    expected_revision: u64,
    now: i64,
) -> TransitionResult<OrderSnapshot> {
    let new_party = new_responsible_party.trim();
    if new_party.is_empty() {
        return Err(TransitionError::Invalid(
            "new responsible party must not be empty".to_string(),
        ));
    }
    if !order.is_pending() {
        return Err(TransitionError::AlreadyResolved {
            current: order.status,
        });
    }
    if !order.escalated && order.is_assigned() {
        return Err(TransitionError::InvalidTransition {
            action: "reassign",
            from: order.status,
        });
    }
    check_revision(order, expected_revision)?;

    let mut next = order.clone();
    next.responsible_party = Some(new_party.to_string());
    next.clear_escalation();
    bump(&mut next, now);
    Ok(next)
}

/// Toggle the billing flag; legal in every state
pub fn apply_payment_flag(
    order: &OrderSnapshot,
    paid: bool,
    expected_revision: u64,
    now: i64,
) -> TransitionResult<OrderSnapshot> {
    check_revision(order, expected_revision)?;

    let mut next = order.clone();
    next.is_paid = paid;
    bump(&mut next, now);
    Ok(next)
}

fn check_revision(order: &OrderSnapshot, expected: u64) -> TransitionResult<()> {
    if order.revision != expected {
        return Err(TransitionError::ConcurrentModification {
            expected,
            actual: order.revision,
        });
    }
    Ok(())
}

fn bump(order: &mut OrderSnapshot, now: i64) {
    order.revision += 1;
    order.updated_at = now;
}

fn normalize_reason(
    action: TransitionAction,
    reason: Option<&str>,
) -> TransitionResult<Option<String>> {
    if action != TransitionAction::Reject {
        return Ok(None);
    }
    let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(TransitionError::Invalid(format!(
            "reason exceeds {} characters",
            MAX_REASON_LEN
        )));
    }
    Ok(Some(reason.to_string()))
}
