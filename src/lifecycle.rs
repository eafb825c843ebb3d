//! Status vocabularies and the pure transition rules behind the ledger.
//!
//! The ledger applies these rules through conditional database updates; the
//! rules themselves are kept free of persistence so they can be tested
//! directly.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InProgress,
    Ready,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MealStatus {
    Pending,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Terminal payment orders are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InProgress => "in_progress",
            DeliveryStatus::Ready => "ready",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "in_progress" => Ok(DeliveryStatus::InProgress),
            "ready" => Ok(DeliveryStatus::Ready),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

impl MealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealStatus::Pending => "pending",
            MealStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for MealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MealStatus::Pending),
            "completed" => Ok(MealStatus::Completed),
            other => Err(format!("unknown meal status: {other}")),
        }
    }
}

/// An order is cancellable only while nothing underneath it has been touched:
/// the order itself is still pending and every delivery and delivery meal is
/// in its initial state.
pub fn order_is_cancellable(
    order: OrderStatus,
    deliveries: &[DeliveryStatus],
    meals: &[MealStatus],
) -> bool {
    order == OrderStatus::Pending
        && deliveries.iter().all(|d| *d == DeliveryStatus::Pending)
        && meals.iter().all(|m| *m == MealStatus::Pending)
}

/// An order settles once every one of its deliveries has been delivered.
/// An order with no deliveries never settles through this path.
pub fn all_delivered(deliveries: &[DeliveryStatus]) -> bool {
    !deliveries.is_empty() && deliveries.iter().all(|d| *d == DeliveryStatus::Delivered)
}

/// Fulfilment has started once any delivery has left its initial state.
pub fn any_started(deliveries: &[DeliveryStatus]) -> bool {
    deliveries.iter().any(|d| *d != DeliveryStatus::Pending)
}

/// A delivery may be marked ready only when all of its meals are completed.
pub fn delivery_ready_allowed(meals: &[MealStatus]) -> bool {
    meals.iter().all(|m| *m == MealStatus::Completed)
}

/// Forward-only delivery transitions. `failed` is reachable from any
/// non-terminal state (deliveries have no dedicated cancelled state).
pub fn delivery_transition_allowed(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    use DeliveryStatus::*;
    match to {
        Pending => false,
        InProgress => from == Pending,
        Ready => matches!(from, Pending | InProgress),
        Delivered => matches!(from, Pending | InProgress | Ready),
        Failed => !from.is_terminal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellable_only_when_everything_untouched() {
        assert!(order_is_cancellable(
            OrderStatus::Pending,
            &[DeliveryStatus::Pending, DeliveryStatus::Pending],
            &[MealStatus::Pending, MealStatus::Pending],
        ));
    }

    #[test]
    fn not_cancellable_once_any_meal_completed() {
        assert!(!order_is_cancellable(
            OrderStatus::Pending,
            &[DeliveryStatus::Pending],
            &[MealStatus::Pending, MealStatus::Completed],
        ));
    }

    #[test]
    fn not_cancellable_once_delivery_started() {
        assert!(!order_is_cancellable(
            OrderStatus::Pending,
            &[DeliveryStatus::InProgress],
            &[MealStatus::Pending],
        ));
    }

    #[test]
    fn not_cancellable_outside_pending() {
        for status in [
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert!(!order_is_cancellable(status, &[], &[]));
        }
    }

    #[test]
    fn settles_only_when_all_deliveries_delivered() {
        assert!(all_delivered(&[
            DeliveryStatus::Delivered,
            DeliveryStatus::Delivered
        ]));
        assert!(!all_delivered(&[
            DeliveryStatus::Delivered,
            DeliveryStatus::Ready
        ]));
        assert!(!all_delivered(&[]));
    }

    #[test]
    fn ready_requires_every_meal_completed() {
        assert!(delivery_ready_allowed(&[
            MealStatus::Completed,
            MealStatus::Completed
        ]));
        assert!(!delivery_ready_allowed(&[
            MealStatus::Completed,
            MealStatus::Pending
        ]));
    }

    #[test]
    fn delivery_transitions_are_forward_only() {
        use DeliveryStatus::*;
        assert!(delivery_transition_allowed(Pending, InProgress));
        assert!(delivery_transition_allowed(InProgress, Ready));
        assert!(delivery_transition_allowed(Ready, Delivered));
        assert!(delivery_transition_allowed(InProgress, Failed));
        assert!(!delivery_transition_allowed(Delivered, Failed));
        assert!(!delivery_transition_allowed(Ready, InProgress));
        assert!(!delivery_transition_allowed(Failed, Delivered));
        assert!(!delivery_transition_allowed(Delivered, Pending));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in ["pending", "in_progress", "ready", "delivered", "failed"] {
            let parsed: DeliveryStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
        for status in ["pending", "completed", "failed"] {
            let parsed: PaymentStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
    }
}
