use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use carefleet_core::DomainError;
use carefleet_orders::FulfillmentKind;

/// A stage set for a linear workflow.
///
/// Declaration order is the workflow order; `Cancelled` sorts last.
pub trait Stage:
    Copy
    + Eq
    + Ord
    + core::hash::Hash
    + core::fmt::Debug
    + core::fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: FulfillmentKind;
    const INITIAL: Self;
    const COMPLETED: Self;
    const CANCELLED: Self;
    const ALL: &'static [Self];

    fn as_str(self) -> &'static str;

    fn is_terminal(self) -> bool {
        self == Self::COMPLETED || self == Self::CANCELLED
    }

    /// Forward moves may skip stages and the current stage may be re-entered.
    /// Backward moves and anything out of a terminal stage are rejected.
    fn check_transition(self, next: Self) -> Result<(), DomainError> {
        if self.is_terminal() {
            return Err(DomainError::invariant(format!(
                "{} is closed at {self}",
                Self::KIND.as_str()
            )));
        }
        if next == self || next == Self::CANCELLED || next > self {
            return Ok(());
        }
        Err(DomainError::invariant(format!(
            "{} cannot move back from {self} to {next}",
            Self::KIND.as_str()
        )))
    }

    fn parse(s: &str) -> Result<Self, DomainError> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation(format!("unknown {} stage '{s}'", Self::KIND.as_str()))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Assigned,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl Stage for DeliveryStage {
    const KIND: FulfillmentKind = FulfillmentKind::Delivery;
    const INITIAL: Self = DeliveryStage::Assigned;
    const COMPLETED: Self = DeliveryStage::Completed;
    const CANCELLED: Self = DeliveryStage::Cancelled;
    const ALL: &'static [Self] = &[
        DeliveryStage::Assigned,
        DeliveryStage::Accepted,
        DeliveryStage::PickedUp,
        DeliveryStage::InTransit,
        DeliveryStage::Delivered,
        DeliveryStage::Completed,
        DeliveryStage::Cancelled,
    ];

    fn as_str(self) -> &'static str {
        match self {
            DeliveryStage::Assigned => "assigned",
            DeliveryStage::Accepted => "accepted",
            DeliveryStage::PickedUp => "picked_up",
            DeliveryStage::InTransit => "in_transit",
            DeliveryStage::Delivered => "delivered",
            DeliveryStage::Completed => "completed",
            DeliveryStage::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupStage {
    Assigned,
    Collected,
    Returned,
    Completed,
    Cancelled,
}

impl Stage for PickupStage {
    const KIND: FulfillmentKind = FulfillmentKind::Pickup;
    const INITIAL: Self = PickupStage::Assigned;
    const COMPLETED: Self = PickupStage::Completed;
    const CANCELLED: Self = PickupStage::Cancelled;
    const ALL: &'static [Self] = &[
        PickupStage::Assigned,
        PickupStage::Collected,
        PickupStage::Returned,
        PickupStage::Completed,
        PickupStage::Cancelled,
    ];

    fn as_str(self) -> &'static str {
        match self {
            PickupStage::Assigned => "assigned",
            PickupStage::Collected => "collected",
            PickupStage::Returned => "returned",
            PickupStage::Completed => "completed",
            PickupStage::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for PickupStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_skips_and_reentry_are_allowed() {
        assert!(DeliveryStage::Assigned.check_transition(DeliveryStage::InTransit).is_ok());
        assert!(DeliveryStage::Accepted.check_transition(DeliveryStage::Accepted).is_ok());
        assert!(PickupStage::Collected.check_transition(PickupStage::Cancelled).is_ok());
    }

    #[test]
    fn backward_and_terminal_moves_are_rejected() {
        let err = DeliveryStage::Delivered
            .check_transition(DeliveryStage::Accepted)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        for next in PickupStage::ALL {
            assert!(PickupStage::Completed.check_transition(*next).is_err());
            assert!(PickupStage::Cancelled.check_transition(*next).is_err());
        }
    }

    #[test]
    fn stages_parse_from_wire_names() {
        assert_eq!(DeliveryStage::parse("picked_up").unwrap(), DeliveryStage::PickedUp);
        assert_eq!(
            serde_json::to_string(&DeliveryStage::InTransit).unwrap(),
            "\"in_transit\""
        );
        assert!(PickupStage::parse("in_transit").is_err());
    }
}
