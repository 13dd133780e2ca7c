//! Delivery and pickup workflows.
//!
//! Both are the same linear stage machine over different stage sets:
//! [`Delivery`] walks `assigned → accepted → picked_up → in_transit →
//! delivered → completed`, [`Pickup`] walks `assigned → collected → returned →
//! completed`. Either can be cancelled from any non-terminal stage.

pub mod fulfillment;
pub mod stage;

pub use fulfillment::{
    AssignDriver, AttachProof, Delivery, DriverAssigned, Fulfillment, FulfillmentCommand,
    FulfillmentEvent, FulfillmentId, FulfillmentItem, FulfillmentOpened, OpenFulfillment, Pickup,
    ProofArtifact, ProofAttached, ProofKind, StageChanged, StageEntry, TransitionStage,
};
pub use stage::{DeliveryStage, PickupStage, Stage};
