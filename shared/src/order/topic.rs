//! Broadcast topics
//!
//! Wire names are `order:<id>` and `restaurant:<id>`. The restaurant id is
//! a mandatory field of every variant, so a topic cannot exist without
//! tenant identity even though `order:<id>` does not spell it out.

use super::snapshot::OrderSnapshot;
use std::fmt;
use thiserror::Error;

const ORDER_PREFIX: &str = "order:";
const RESTAURANT_PREFIX: &str = "restaurant:";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Detail subscribers of a single order
    Order {
        restaurant_id: String,
        order_id: String,
    },
    /// Every order of a restaurant (kitchen display, dashboards)
    Restaurant { restaurant_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("malformed topic: {0}")]
    Malformed(String),
    #[error("topic id must not be empty")]
    EmptyId,
}

impl Topic {
    pub fn order(restaurant_id: impl Into<String>, order_id: impl Into<String>) -> Self {
        Topic::Order {
            restaurant_id: restaurant_id.into(),
            order_id: order_id.into(),
        }
    }

    pub fn restaurant(restaurant_id: impl Into<String>) -> Self {
        Topic::Restaurant {
            restaurant_id: restaurant_id.into(),
        }
    }

    /// Parse a wire name on behalf of a caller
    ///
    /// `order:<id>` carries no tenant on the wire, so the caller's restaurant
    /// is bound into it; the order's real owner is checked at subscribe time.
    pub fn parse(raw: &str, caller_restaurant: &str) -> Result<Self, TopicError> {
        let raw = raw.trim();
        if let Some(order_id) = raw.strip_prefix(ORDER_PREFIX) {
            if order_id.is_empty() {
                return Err(TopicError::EmptyId);
            }
            Ok(Topic::order(caller_restaurant, order_id))
        } else if let Some(restaurant_id) = raw.strip_prefix(RESTAURANT_PREFIX) {
            if restaurant_id.is_empty() {
                return Err(TopicError::EmptyId);
            }
            Ok(Topic::restaurant(restaurant_id))
        } else {
            Err(TopicError::Malformed(raw.to_string()))
        }
    }

    pub fn restaurant_id(&self) -> &str {
        match self {
            Topic::Order { restaurant_id, .. } | Topic::Restaurant { restaurant_id } => {
                restaurant_id
            }
        }
    }

    /// Topics affected by a mutation of `order`
    pub fn affected_by(order: &OrderSnapshot) -> [Topic; 2] {
        [
            Topic::order(&order.restaurant_id, &order.order_id),
            Topic::restaurant(&order.restaurant_id),
        ]
    }

    /// Whether an event about `order` may be delivered on this topic
    pub fn admits(&self, order: &OrderSnapshot) -> bool {
        match self {
            Topic::Order {
                restaurant_id,
                order_id,
            } => *restaurant_id == order.restaurant_id && *order_id == order.order_id,
            Topic::Restaurant { restaurant_id } => *restaurant_id == order.restaurant_id,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Order { order_id, .. } => write!(f, "{}{}", ORDER_PREFIX, order_id),
            Topic::Restaurant { restaurant_id } => {
                write!(f, "{}{}", RESTAURANT_PREFIX, restaurant_id)
            }
        }
    }
}
