//! Delivery and pickup desks.
//!
//! One [`FulfillmentDesk`] per stage machine. A completed pickup returns the
//! units its order still holds; every transition is mirrored to the order and
//! the upstream record on a best-effort basis.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use carefleet_assets::AssetId;
use carefleet_core::{Actor, AggregateId, UserId};
use carefleet_events::{ChangeEnvelope, EventBus, Subscription};
use carefleet_fulfillment::{
    AssignDriver, AttachProof, Fulfillment, FulfillmentCommand, FulfillmentId, FulfillmentItem,
    OpenFulfillment, ProofKind, Stage, TransitionStage,
};
use carefleet_fulfillment::{DeliveryStage, PickupStage};
use carefleet_orders::{FulfillmentKind, OrderId, OrderStatus};

use crate::batch::BatchOutcome;
use crate::collaborators::{BlobStore, UpstreamEntry, UpstreamSink, propagate};
use crate::command_dispatcher::{SharedBus, SharedDispatcher, SharedStore};
use crate::config::EngineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{AssetLedger, CheckinDetails};
use crate::orders::OrderDesk;
use crate::resolver::AssignmentContext;
use crate::store::{Direction, Document, DocumentStore, FieldValue, Query};

pub type DeliveryDesk = FulfillmentDesk<DeliveryStage>;
pub type PickupDesk = FulfillmentDesk<PickupStage>;

/// A recorded transition and, for a completed pickup, the per-unit checkins.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTransition<S: Stage> {
    pub record: Fulfillment<S>,
    pub checkins: Option<BatchOutcome>,
    /// Units listed for return that the order no longer holds. Left untouched.
    pub skipped: Vec<AssetId>,
}

pub struct FulfillmentDesk<S: Stage> {
    dispatcher: SharedDispatcher<Fulfillment<S>>,
    orders: Arc<OrderDesk>,
    ledger: Arc<AssetLedger>,
    blobs: Arc<dyn BlobStore>,
    upstream: Arc<dyn UpstreamSink>,
}

impl<S: Stage> FulfillmentDesk<S> {
    pub fn new(
        store: SharedStore<Fulfillment<S>>,
        bus: SharedBus<Fulfillment<S>>,
        orders: Arc<OrderDesk>,
        ledger: Arc<AssetLedger>,
        blobs: Arc<dyn BlobStore>,
        upstream: Arc<dyn UpstreamSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            dispatcher: SharedDispatcher::new(store, bus).with_write_retries(config.write_retries),
            orders,
            ledger,
            blobs,
            upstream,
        }
    }

    /// Open the record for an order, or return the one already open.
    ///
    /// Items mirror the order's product lines with their assigned units. A
    /// cancelled order gets no delivery, but may still get a pickup for
    /// units that are out with the customer.
    pub fn open(
        &self,
        order_id: OrderId,
        driver: Option<UserId>,
        address: Option<String>,
        actor: &Actor,
    ) -> ServiceResult<Fulfillment<S>> {
        if let Some(existing) = self.for_order(order_id)? {
            tracing::debug!(kind = S::KIND.as_str(), id = %existing.id_typed(), order_id = %order_id, "already open");
            return Ok(existing);
        }

        let order = self.orders.require(order_id)?;
        if order.status() == OrderStatus::Cancelled && S::KIND == FulfillmentKind::Delivery {
            return Err(ServiceError::InvariantViolation(format!(
                "order {} is cancelled",
                order.order_number()
            )));
        }
        let items = order
            .items()
            .iter()
            .filter(|line| !line.is_service_line())
            .map(|line| FulfillmentItem {
                line_no: line.line_no,
                product_id: line.product_id,
                asset_ids: line.assigned_assets.clone(),
            })
            .collect();
        let address = address.or_else(|| order.customer().address.clone());

        let id = FulfillmentId::new(AggregateId::new());
        let cmd = FulfillmentCommand::Open(OpenFulfillment {
            id,
            order_id,
            driver,
            address,
            items,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let record = self.dispatch(id, &cmd)?;
        tracing::info!(kind = S::KIND.as_str(), id = %id, order_id = %order_id, "fulfillment opened");
        Ok(record)
    }

    /// Move to `to`. A pickup reaching `completed` checks in every unit its
    /// order still holds; one failed checkin does not stop the others.
    pub fn transition(
        &self,
        id: FulfillmentId,
        to: S,
        note: Option<String>,
        actor: &Actor,
    ) -> ServiceResult<StageTransition<S>> {
        let cmd = FulfillmentCommand::Transition(TransitionStage {
            id,
            to,
            note,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let record = self.dispatch(id, &cmd)?;
        tracing::info!(kind = S::KIND.as_str(), id = %id, stage = %to, "fulfillment stage changed");

        let (checkins, skipped) = match record.order_id() {
            Some(order_id) if S::KIND == FulfillmentKind::Pickup && to == S::COMPLETED => {
                let (outcome, skipped) = self.return_units(&record, order_id, actor);
                (Some(outcome), skipped)
            }
            _ => (None, Vec::new()),
        };

        if let Some(order_id) = record.order_id() {
            self.propagate_stage(order_id, to, actor);
        }
        Ok(StageTransition {
            record,
            checkins,
            skipped,
        })
    }

    /// Units to bring back: those listed when the pickup was opened plus any
    /// the order's lines gained since. Only units still linked to the order
    /// are checked in.
    fn return_units(&self, record: &Fulfillment<S>, order_id: OrderId, actor: &Actor) -> (BatchOutcome, Vec<AssetId>) {
        let mut candidates: Vec<AssetId> = record.asset_ids().collect();
        let ctx = match self.orders.require(order_id) {
            Ok(order) => {
                for (_, asset_id) in order.held_assets() {
                    if !candidates.contains(&asset_id) {
                        candidates.push(asset_id);
                    }
                }
                AssignmentContext::for_order(&order)
            }
            Err(e) => {
                tracing::warn!(order_id = %order_id, id = %record.id_typed(), error = %e, "order unavailable; returning listed units only");
                AssignmentContext::new(order_id, "", "")
            }
        };

        let note = format!("returned via {} {}", S::KIND.as_str(), record.id_typed());
        let mut outcome = BatchOutcome::new();
        let mut skipped = Vec::new();
        for asset_id in candidates {
            let asset = match self.ledger.require(asset_id) {
                Ok(asset) => asset,
                Err(e) => {
                    tracing::warn!(asset_id = %asset_id, id = %record.id_typed(), error = %e, "pickup checkin failed");
                    outcome.fail(asset_id, e);
                    continue;
                }
            };
            if !ctx.holds(&asset) {
                tracing::info!(asset_id = %asset_id, id = %record.id_typed(), status = %asset.status(), "unit no longer held by the order; skipped");
                skipped.push(asset_id);
                continue;
            }
            match self.ledger.checkin(asset_id, CheckinDetails::note(note.clone()), actor) {
                Ok(_) => outcome.succeed(asset_id),
                Err(e) => {
                    tracing::warn!(asset_id = %asset_id, id = %record.id_typed(), error = %e, "pickup checkin failed");
                    outcome.fail(asset_id, e);
                }
            }
        }
        if outcome.succeeded.is_empty() && !outcome.failed.is_empty() {
            tracing::warn!(id = %record.id_typed(), failed = outcome.failed.len(), "no unit of the pickup could be checked in");
        }
        outcome.log_partial("pickup_checkin");
        (outcome, skipped)
    }

    fn propagate_stage(&self, order_id: OrderId, stage: S, actor: &Actor) {
        let order = match self.orders.record_stage(order_id, S::KIND, stage.as_str(), actor) {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(order_id = %order_id, stage = %stage, error = %e, "stage not recorded on order");
                return;
            }
        };
        if let Some(upstream_ref) = order.upstream_ref() {
            let entry = UpstreamEntry::new(
                self.now(),
                actor,
                S::KIND.as_str(),
                format!("{} {}", S::KIND.as_str(), stage),
            );
            propagate(upstream_ref, "append_history", || {
                self.upstream.append_history(upstream_ref, entry)
            });
        }
    }

    pub fn assign_driver(&self, id: FulfillmentId, driver: UserId, actor: &Actor) -> ServiceResult<Fulfillment<S>> {
        let cmd = FulfillmentCommand::AssignDriver(AssignDriver {
            id,
            driver,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        self.dispatch(id, &cmd)
    }

    /// Upload a photo or signature and attach it at the current stage.
    pub fn attach_proof(
        &self,
        id: FulfillmentId,
        kind: ProofKind,
        bytes: &[u8],
        actor: &Actor,
    ) -> ServiceResult<Fulfillment<S>> {
        let record = self.require(id)?;
        let path = format!(
            "{}/{}/{}-{}",
            Fulfillment::<S>::COLLECTION,
            id,
            kind.as_str(),
            record.proofs().len() + 1
        );
        let url = self
            .blobs
            .upload(&path, bytes)
            .map_err(|e| ServiceError::Blob(e.to_string()))?;

        let cmd = FulfillmentCommand::AttachProof(AttachProof {
            id,
            kind,
            url,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let record = self.dispatch(id, &cmd)?;
        tracing::info!(kind = S::KIND.as_str(), id = %id, proof = kind.as_str(), "proof attached");
        Ok(record)
    }

    pub fn get(&self, id: FulfillmentId) -> ServiceResult<Option<Fulfillment<S>>> {
        Ok(self.dispatcher.store().get(id.0)?)
    }

    pub fn require(&self, id: FulfillmentId) -> ServiceResult<Fulfillment<S>> {
        self.get(id)?
            .ok_or_else(|| ServiceError::not_found(format!("{} {id}", S::KIND.as_str())))
    }

    /// The oldest record opened for the order, if any.
    pub fn for_order(&self, order_id: OrderId) -> ServiceResult<Option<Fulfillment<S>>> {
        let query = Query::new()
            .eq("order_id", FieldValue::str(order_id))
            .order_by("created_at", Direction::Asc);
        Ok(self.dispatcher.store().query(&query)?.into_iter().next())
    }

    pub fn subscribe(
        &self,
        filter: impl Fn(&Fulfillment<S>) -> bool + Send + Sync + 'static,
        callback: impl Fn(&Fulfillment<S>) + Send + Sync + 'static,
    ) -> Subscription {
        self.dispatcher.bus().subscribe(
            Arc::new(move |env: &ChangeEnvelope<Fulfillment<S>>| filter(env.document())),
            Arc::new(move |env: &ChangeEnvelope<Fulfillment<S>>| callback(env.document())),
        )
    }

    fn dispatch(&self, id: FulfillmentId, cmd: &FulfillmentCommand<S>) -> ServiceResult<Fulfillment<S>> {
        let out = self
            .dispatcher
            .dispatch(id.0, cmd, || Fulfillment::<S>::empty(id))?;
        Ok(out.document)
    }

    fn now(&self) -> DateTime<Utc> {
        self.dispatcher.store().server_timestamp()
    }
}
