use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carefleet_assets::AssetId;
use carefleet_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use carefleet_events::Event;
use carefleet_orders::{FulfillmentKind, OrderId};
use carefleet_products::ProductId;

use crate::stage::{DeliveryStage, PickupStage, Stage};

/// Delivery or pickup record identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FulfillmentId(pub AggregateId);

impl FulfillmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FulfillmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What is being moved: one order line's product and its units.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FulfillmentItem {
    pub line_no: u32,
    pub product_id: Option<ProductId>,
    pub asset_ids: Vec<AssetId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StageEntry<S: Stage> {
    pub at: DateTime<Utc>,
    pub by: String,
    pub by_name: String,
    pub stage: S,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    Photo,
    Signature,
}

impl ProofKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProofKind::Photo => "photo",
            ProofKind::Signature => "signature",
        }
    }
}

/// Uploaded proof (photo or signature). The url is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ProofArtifact<S: Stage> {
    pub kind: ProofKind,
    pub url: String,
    /// Stage the record was in when the proof was captured.
    pub stage: S,
    pub at: DateTime<Utc>,
    pub by: String,
}

/// Aggregate root: a delivery or pickup tied to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Fulfillment<S: Stage> {
    id: FulfillmentId,
    order_id: Option<OrderId>,
    driver: Option<UserId>,
    address: Option<String>,
    items: Vec<FulfillmentItem>,
    stage: S,
    history: Vec<StageEntry<S>>,
    proofs: Vec<ProofArtifact<S>>,
    /// First time each stage was entered.
    timestamps: BTreeMap<S, DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
}

pub type Delivery = Fulfillment<DeliveryStage>;
pub type Pickup = Fulfillment<PickupStage>;

impl<S: Stage> Fulfillment<S> {
    /// Create an empty, not-yet-opened aggregate instance.
    pub fn empty(id: FulfillmentId) -> Self {
        Self {
            id,
            order_id: None,
            driver: None,
            address: None,
            items: Vec::new(),
            stage: S::INITIAL,
            history: Vec::new(),
            proofs: Vec::new(),
            timestamps: BTreeMap::new(),
            created_at: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> FulfillmentId {
        self.id
    }

    pub fn kind(&self) -> FulfillmentKind {
        S::KIND
    }

    /// `None` only before the record is opened.
    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn driver(&self) -> Option<UserId> {
        self.driver
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn items(&self) -> &[FulfillmentItem] {
        &self.items
    }

    pub fn stage(&self) -> S {
        self.stage
    }

    pub fn history(&self) -> &[StageEntry<S>] {
        &self.history
    }

    pub fn proofs(&self) -> &[ProofArtifact<S>] {
        &self.proofs
    }

    pub fn stamped_at(&self, stage: S) -> Option<DateTime<Utc>> {
        self.timestamps.get(&stage).copied()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_opened(&self) -> bool {
        self.order_id.is_some()
    }

    /// Every unit referenced by the record's items.
    pub fn asset_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.items.iter().flat_map(|i| i.asset_ids.iter().copied())
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(S::COMPLETED)
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(S::CANCELLED)
    }
}

impl Fulfillment<DeliveryStage> {
    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(DeliveryStage::Accepted)
    }

    pub fn picked_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(DeliveryStage::PickedUp)
    }

    pub fn in_transit_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(DeliveryStage::InTransit)
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(DeliveryStage::Delivered)
    }
}

impl Fulfillment<PickupStage> {
    pub fn collected_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(PickupStage::Collected)
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.stamped_at(PickupStage::Returned)
    }
}

impl<S: Stage> AggregateRoot for Fulfillment<S> {
    type Id = FulfillmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenFulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFulfillment {
    pub id: FulfillmentId,
    pub order_id: OrderId,
    pub driver: Option<UserId>,
    pub address: Option<String>,
    pub items: Vec<FulfillmentItem>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionStage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransitionStage<S: Stage> {
    pub id: FulfillmentId,
    pub to: S,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignDriver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignDriver {
    pub id: FulfillmentId,
    pub driver: UserId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachProof. Not a transition; allowed in every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachProof {
    pub id: FulfillmentId,
    pub kind: ProofKind,
    pub url: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum FulfillmentCommand<S: Stage> {
    Open(OpenFulfillment),
    Transition(TransitionStage<S>),
    AssignDriver(AssignDriver),
    AttachProof(AttachProof),
}

/// Event: FulfillmentOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentOpened {
    pub id: FulfillmentId,
    pub order_id: OrderId,
    pub driver: Option<UserId>,
    pub address: Option<String>,
    pub items: Vec<FulfillmentItem>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StageChanged. `from == to` on re-entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StageChanged<S: Stage> {
    pub id: FulfillmentId,
    pub from: S,
    pub to: S,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DriverAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverAssigned {
    pub id: FulfillmentId,
    pub previous: Option<UserId>,
    pub driver: UserId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProofAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ProofAttached<S: Stage> {
    pub id: FulfillmentId,
    pub proof: ProofArtifact<S>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum FulfillmentEvent<S: Stage> {
    Opened(FulfillmentOpened),
    StageChanged(StageChanged<S>),
    DriverAssigned(DriverAssigned),
    ProofAttached(ProofAttached<S>),
}

impl<S: Stage> Event for FulfillmentEvent<S> {
    fn event_type(&self) -> &'static str {
        match (S::KIND, self) {
            (FulfillmentKind::Delivery, FulfillmentEvent::Opened(_)) => "fulfillment.delivery.opened",
            (FulfillmentKind::Delivery, FulfillmentEvent::StageChanged(_)) => {
                "fulfillment.delivery.stage_changed"
            }
            (FulfillmentKind::Delivery, FulfillmentEvent::DriverAssigned(_)) => {
                "fulfillment.delivery.driver_assigned"
            }
            (FulfillmentKind::Delivery, FulfillmentEvent::ProofAttached(_)) => {
                "fulfillment.delivery.proof_attached"
            }
            (FulfillmentKind::Pickup, FulfillmentEvent::Opened(_)) => "fulfillment.pickup.opened",
            (FulfillmentKind::Pickup, FulfillmentEvent::StageChanged(_)) => {
                "fulfillment.pickup.stage_changed"
            }
            (FulfillmentKind::Pickup, FulfillmentEvent::DriverAssigned(_)) => {
                "fulfillment.pickup.driver_assigned"
            }
            (FulfillmentKind::Pickup, FulfillmentEvent::ProofAttached(_)) => {
                "fulfillment.pickup.proof_attached"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FulfillmentEvent::Opened(e) => e.occurred_at,
            FulfillmentEvent::StageChanged(e) => e.occurred_at,
            FulfillmentEvent::DriverAssigned(e) => e.occurred_at,
            FulfillmentEvent::ProofAttached(e) => e.occurred_at,
        }
    }
}

impl<S: Stage> Aggregate for Fulfillment<S> {
    type Command = FulfillmentCommand<S>;
    type Event = FulfillmentEvent<S>;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FulfillmentEvent::Opened(e) => {
                self.id = e.id;
                self.order_id = Some(e.order_id);
                self.driver = e.driver;
                self.address = e.address.clone();
                self.items = e.items.clone();
                self.stage = S::INITIAL;
                self.timestamps.insert(S::INITIAL, e.occurred_at);
                self.created_at = Some(e.occurred_at);
            }
            FulfillmentEvent::StageChanged(e) => {
                self.stage = e.to;
                self.timestamps.entry(e.to).or_insert(e.occurred_at);
                self.history.push(StageEntry {
                    at: e.occurred_at,
                    by: e.actor.uid.clone(),
                    by_name: e.actor.display_name.clone(),
                    stage: e.to,
                    note: e.note.clone(),
                });
            }
            FulfillmentEvent::DriverAssigned(e) => {
                self.driver = Some(e.driver);
            }
            FulfillmentEvent::ProofAttached(e) => {
                self.proofs.push(e.proof.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FulfillmentCommand::Open(cmd) => self.handle_open(cmd),
            FulfillmentCommand::Transition(cmd) => self.handle_transition(cmd),
            FulfillmentCommand::AssignDriver(cmd) => self.handle_assign_driver(cmd),
            FulfillmentCommand::AttachProof(cmd) => self.handle_attach_proof(cmd),
        }
    }
}

impl<S: Stage> Fulfillment<S> {
    fn ensure_opened(&self, id: FulfillmentId) -> Result<(), DomainError> {
        if !self.is_opened() {
            return Err(DomainError::not_found(format!("{} {id}", S::KIND.as_str())));
        }
        if self.id != id {
            return Err(DomainError::invariant("fulfillment id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenFulfillment) -> Result<Vec<FulfillmentEvent<S>>, DomainError> {
        if self.is_opened() {
            return Err(DomainError::conflict(format!("{} already opened", S::KIND.as_str())));
        }

        Ok(vec![FulfillmentEvent::Opened(FulfillmentOpened {
            id: cmd.id,
            order_id: cmd.order_id,
            driver: cmd.driver,
            address: cmd.address.clone(),
            items: cmd.items.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionStage<S>) -> Result<Vec<FulfillmentEvent<S>>, DomainError> {
        self.ensure_opened(cmd.id)?;
        self.stage.check_transition(cmd.to)?;

        Ok(vec![FulfillmentEvent::StageChanged(StageChanged {
            id: cmd.id,
            from: self.stage,
            to: cmd.to,
            note: cmd.note.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_driver(&self, cmd: &AssignDriver) -> Result<Vec<FulfillmentEvent<S>>, DomainError> {
        self.ensure_opened(cmd.id)?;
        if self.stage.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot assign a driver to a {} {}",
                self.stage,
                S::KIND.as_str()
            )));
        }
        if self.driver == Some(cmd.driver) {
            return Ok(vec![]);
        }

        Ok(vec![FulfillmentEvent::DriverAssigned(DriverAssigned {
            id: cmd.id,
            previous: self.driver,
            driver: cmd.driver,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_attach_proof(&self, cmd: &AttachProof) -> Result<Vec<FulfillmentEvent<S>>, DomainError> {
        self.ensure_opened(cmd.id)?;
        if cmd.url.trim().is_empty() {
            return Err(DomainError::validation("proof url cannot be empty"));
        }

        Ok(vec![FulfillmentEvent::ProofAttached(ProofAttached {
            id: cmd.id,
            proof: ProofArtifact {
                kind: cmd.kind,
                url: cmd.url.clone(),
                stage: self.stage,
                at: cmd.occurred_at,
                by: cmd.actor.uid.clone(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_id() -> FulfillmentId {
        FulfillmentId::new(AggregateId::new())
    }

    fn opened<S: Stage>(id: FulfillmentId) -> Fulfillment<S> {
        let mut record = Fulfillment::<S>::empty(id);
        record
            .execute(&FulfillmentCommand::Open(OpenFulfillment {
                id,
                order_id: OrderId::new(AggregateId::new()),
                driver: None,
                address: Some("12 Lake Road".to_string()),
                items: vec![FulfillmentItem {
                    line_no: 1,
                    product_id: Some(ProductId::new(AggregateId::new())),
                    asset_ids: vec![AssetId::new(AggregateId::new())],
                }],
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        record
    }

    fn transition<S: Stage>(id: FulfillmentId, to: S, at: DateTime<Utc>) -> FulfillmentCommand<S> {
        FulfillmentCommand::Transition(TransitionStage {
            id,
            to,
            note: None,
            actor: Actor::new("d1", "Driver One"),
            occurred_at: at,
        })
    }

    #[test]
    fn open_starts_at_assigned_without_history() {
        let delivery: Delivery = opened(test_id());
        assert_eq!(delivery.stage(), DeliveryStage::Assigned);
        assert!(delivery.history().is_empty());
        assert!(delivery.stamped_at(DeliveryStage::Assigned).is_some());
        assert_eq!(delivery.asset_ids().count(), 1);
    }

    #[test]
    fn reentering_a_stage_stamps_once_and_logs_twice() {
        let id = test_id();
        let mut delivery: Delivery = opened(id);
        let first = Utc::now();
        let second = first + Duration::minutes(5);

        delivery.execute(&transition(id, DeliveryStage::Accepted, first)).unwrap();
        delivery.execute(&transition(id, DeliveryStage::Accepted, second)).unwrap();

        assert_eq!(delivery.accepted_at(), Some(first));
        assert_eq!(delivery.history().len(), 2);
        assert_eq!(delivery.history()[1].by_name, "Driver One");
    }

    #[test]
    fn forward_skip_then_backward_is_rejected() {
        let id = test_id();
        let mut delivery: Delivery = opened(id);
        delivery
            .execute(&transition(id, DeliveryStage::Delivered, Utc::now()))
            .unwrap();
        assert!(delivery.picked_at().is_none());
        assert!(delivery.delivered_at().is_some());

        let err = delivery
            .handle(&transition(id, DeliveryStage::InTransit, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn completed_pickup_is_closed() {
        let id = test_id();
        let mut pickup: Pickup = opened(id);
        pickup.execute(&transition(id, PickupStage::Completed, Utc::now())).unwrap();

        let err = pickup
            .handle(&transition(id, PickupStage::Cancelled, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(pickup.completed_at().is_some());
        assert!(pickup.returned_at().is_none());
    }

    #[test]
    fn proof_records_current_stage_without_transition() {
        let id = test_id();
        let mut pickup: Pickup = opened(id);
        pickup.execute(&transition(id, PickupStage::Collected, Utc::now())).unwrap();
        pickup
            .execute(&FulfillmentCommand::AttachProof(AttachProof {
                id,
                kind: ProofKind::Signature,
                url: "mem://proofs/sig.png".to_string(),
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(pickup.stage(), PickupStage::Collected);
        assert_eq!(pickup.history().len(), 1);
        assert_eq!(pickup.proofs()[0].stage, PickupStage::Collected);
        assert_eq!(pickup.proofs()[0].kind, ProofKind::Signature);
    }

    #[test]
    fn driver_assignment_is_idempotent() {
        let id = test_id();
        let mut delivery: Delivery = opened(id);
        let driver = UserId::new();
        let cmd = FulfillmentCommand::AssignDriver(AssignDriver {
            id,
            driver,
            actor: Actor::system(),
            occurred_at: Utc::now(),
        });

        assert_eq!(delivery.execute(&cmd).unwrap().len(), 1);
        assert!(delivery.execute(&cmd).unwrap().is_empty());
        assert_eq!(delivery.driver(), Some(driver));
    }

    #[test]
    fn open_twice_and_unopened_transitions_fail() {
        let id = test_id();
        let delivery: Delivery = opened(id);
        let err = delivery
            .handle(&FulfillmentCommand::Open(OpenFulfillment {
                id,
                order_id: OrderId::new(AggregateId::new()),
                driver: None,
                address: None,
                items: vec![],
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let other = test_id();
        let err = Delivery::empty(other)
            .handle(&transition(other, DeliveryStage::Accepted, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn stored_pickup_reads_back_with_stages_and_proofs() {
        let id = test_id();
        let mut pickup: Pickup = opened(id);
        pickup.execute(&transition(id, PickupStage::Collected, Utc::now())).unwrap();
        pickup
            .execute(&FulfillmentCommand::AttachProof(AttachProof {
                id,
                kind: ProofKind::Photo,
                url: "mem://pickups/p/photo-1".to_string(),
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap();

        let json = serde_json::to_value(&pickup).unwrap();
        let back: Pickup = serde_json::from_value(json).unwrap();
        assert_eq!(back, pickup);
        assert_eq!(back.proofs()[0].stage, PickupStage::Collected);

        let events = pickup
            .handle(&transition(id, PickupStage::Returned, Utc::now()))
            .unwrap();
        let json = serde_json::to_value(&events[0]).unwrap();
        let event: FulfillmentEvent<PickupStage> = serde_json::from_value(json).unwrap();
        assert_eq!(event, events[0]);
    }

    #[test]
    fn event_types_name_the_workflow() {
        let id = test_id();
        let delivery: Delivery = opened(id);
        let events = delivery
            .handle(&transition(id, DeliveryStage::Accepted, Utc::now()))
            .unwrap();
        assert_eq!(events[0].event_type(), "fulfillment.delivery.stage_changed");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: accepted transitions never move the stage backwards and
            /// each one adds exactly one history entry.
            #[test]
            fn stage_is_monotonic(
                moves in prop::collection::vec(prop::sample::select(DeliveryStage::ALL.to_vec()), 1..20)
            ) {
                let id = test_id();
                let mut delivery: Delivery = opened(id);
                let mut accepted = 0usize;

                for to in moves {
                    let before = delivery.stage();
                    if delivery.execute(&transition(id, to, Utc::now())).is_ok() {
                        accepted += 1;
                        prop_assert!(delivery.stage() >= before);
                    } else {
                        prop_assert_eq!(delivery.stage(), before);
                    }
                    prop_assert_eq!(delivery.history().len(), accepted);
                }
            }
        }
    }
}
