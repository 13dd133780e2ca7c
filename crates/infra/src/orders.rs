//! Order desk: order lifecycle, line edits and the ledger work they imply.
//!
//! The desk is the only writer of order documents. It keeps the cross-order
//! rule that a unit sits on at most one live order line, hands assignment to
//! the [`Resolver`], and mirrors status changes to the upstream record.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use carefleet_assets::AssetId;
use carefleet_core::{Actor, Aggregate, AggregateId, BranchId};
use carefleet_events::{ChangeEnvelope, EventBus, Subscription};
use carefleet_orders::{
    AddItem, ChangeStatus, Contact, CreateOrder, Discount, FulfillmentKind, ItemChanges, NewItem,
    Order, OrderCommand, OrderEvent, OrderId, OrderItem, OrderStatus, RecordFulfillmentStage,
    RemoveItem, SetItemAssignment, UpdateItem,
};

use crate::batch::BatchOutcome;
use crate::collaborators::{UpstreamEntry, UpstreamSink, propagate};
use crate::command_dispatcher::{Dispatched, SharedBus, SharedDispatcher, SharedStore};
use crate::config::EngineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::resolver::{AssignOutcome, AssignmentContext, RejectReason, ReleaseReason, Resolver, UnassignOutcome};
use crate::store::{Direction, DocumentStore, FieldValue, Query};

/// Input for [`OrderDesk::create_order`]. The order id is allocated up front
/// so units can be reserved under it before the order document exists.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer: Contact,
    pub items: Vec<NewItem>,
    pub discount: Discount,
    pub tax_bps: u32,
    pub upstream_ref: Option<String>,
}

impl NewOrder {
    pub fn new(order_number: impl Into<String>, customer: Contact) -> Self {
        Self {
            order_id: OrderId::new(AggregateId::new()),
            order_number: order_number.into(),
            customer,
            items: Vec::new(),
            discount: Discount::None,
            tax_bps: 0,
            upstream_ref: None,
        }
    }

    pub fn item(mut self, item: NewItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }

    pub fn tax_bps(mut self, tax_bps: u32) -> Self {
        self.tax_bps = tax_bps;
        self
    }

    pub fn upstream(mut self, upstream_ref: impl Into<String>) -> Self {
        self.upstream_ref = Some(upstream_ref.into());
        self
    }

    pub fn context(&self) -> AssignmentContext {
        AssignmentContext::new(self.order_id, self.order_number.clone(), self.customer.name.clone())
    }
}

/// An item edit and the ledger work it caused.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEdit {
    pub order: Order,
    /// Units that left the line.
    pub released: Vec<AssetId>,
    /// Checkins performed for released units.
    pub ledger: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineAssignment {
    pub order: Order,
    pub outcome: AssignOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineUnassignment {
    pub order: Order,
    pub outcome: UnassignOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub order: Order,
    /// Reserved units checked back in by a cancellation.
    pub released: BatchOutcome,
}

pub struct OrderDesk {
    dispatcher: SharedDispatcher<Order>,
    resolver: Arc<Resolver>,
    upstream: Arc<dyn UpstreamSink>,
}

impl OrderDesk {
    /// `store` must be the order store the resolver reads.
    pub fn new(
        store: SharedStore<Order>,
        bus: SharedBus<Order>,
        resolver: Arc<Resolver>,
        upstream: Arc<dyn UpstreamSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            dispatcher: SharedDispatcher::new(store, bus).with_write_retries(config.write_retries),
            resolver,
            upstream,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Create an order whose product lines are fully assigned.
    ///
    /// The listed units are checked, reserved in the ledger, and only then is
    /// the order written. If any reservation fails the ones already made are
    /// checked back in and nothing is created.
    pub fn create_order(&self, new: NewOrder, actor: &Actor) -> ServiceResult<Order> {
        let ctx = new.context();
        let cmd = OrderCommand::CreateOrder(CreateOrder {
            order_id: new.order_id,
            order_number: new.order_number,
            customer: new.customer,
            items: new.items,
            discount: new.discount,
            tax_bps: new.tax_bps,
            upstream_ref: new.upstream_ref,
            actor: actor.clone(),
            occurred_at: self.now(),
        });

        // Shape checks first, so nothing touches the ledger for a bad order.
        let events = Order::empty(ctx.order_id).handle(&cmd)?;
        let lines: Vec<OrderItem> = events
            .iter()
            .find_map(|e| match e {
                OrderEvent::OrderCreated(created) => Some(created.items.clone()),
                _ => None,
            })
            .unwrap_or_default();

        self.reserve_new_lines(&ctx, &lines, actor)?;

        let out = match self.dispatch(ctx.order_id, &cmd) {
            Ok(out) => out,
            Err(e) => {
                let held: Vec<AssetId> = lines.iter().flat_map(|l| l.assigned_assets.iter().copied()).collect();
                self.resolver
                    .release_units(&ctx, &held, ReleaseReason::CreationAborted, actor);
                return Err(e);
            }
        };
        let order = out.document;
        tracing::info!(order_id = %order.id_typed(), order_number = order.order_number(), lines = order.items().len(), "order created");

        self.propagate_history(&order, actor, "created", format!("order {} created", order.order_number()));
        Ok(order)
    }

    /// Check and reserve the pre-assigned units of lines that are not on any
    /// order yet. Units already reserved under this order id (a draft filled
    /// through the resolver) are kept as they are. All or nothing.
    fn reserve_new_lines(&self, ctx: &AssignmentContext, lines: &[OrderItem], actor: &Actor) -> ServiceResult<()> {
        let mut plans = Vec::new();
        for line in lines.iter().filter(|l| !l.assigned_assets.is_empty()) {
            let mut reserved = Vec::new();
            let mut pending = Vec::new();
            for &asset_id in &line.assigned_assets {
                match self.resolver.ledger().get(asset_id)? {
                    Some(asset) if ctx.holds(&asset) => reserved.push(asset_id),
                    _ => pending.push(asset_id),
                }
            }
            if pending.is_empty() {
                continue;
            }
            let partial = OrderItem {
                assigned_assets: reserved,
                ..line.clone()
            };
            let plan = self.resolver.plan(ctx, &partial, &pending)?;
            if let Some(rejection) = plan.rejected.first() {
                let msg = format!("asset {} on line {}: {}", rejection.asset_id, line.line_no, rejection.reason);
                return Err(match rejection.reason {
                    RejectReason::HeldElsewhere { .. } | RejectReason::NotInStock(_) => ServiceError::Conflict(msg),
                    RejectReason::NotFound => ServiceError::NotFound(msg),
                    RejectReason::WrongProduct { .. } => ServiceError::Validation(msg),
                });
            }
            plans.push(plan);
        }

        let mut reserved: Vec<AssetId> = Vec::new();
        for plan in plans {
            let outcome = self.resolver.commit(ctx, plan, actor);
            reserved.extend(outcome.ledger.succeeded.iter().copied());
            if let Some(failure) = outcome.ledger.failed.first() {
                self.resolver
                    .release_units(ctx, &reserved, ReleaseReason::CreationAborted, actor);
                return Err(failure.error.clone());
            }
        }
        Ok(())
    }

    /// Append a line. Units listed on the new line are reserved the same way
    /// as on creation.
    pub fn add_item(&self, order_id: OrderId, item: NewItem, actor: &Actor) -> ServiceResult<Order> {
        let order = self.require(order_id)?;
        let ctx = AssignmentContext::for_order(&order);
        let cmd = OrderCommand::AddItem(AddItem {
            order_id,
            item,
            actor: actor.clone(),
            occurred_at: self.now(),
        });

        let events = order.handle(&cmd)?;
        let added: Vec<OrderItem> = events
            .iter()
            .filter_map(|e| match e {
                OrderEvent::ItemAdded(added) => Some(added.item.clone()),
                _ => None,
            })
            .collect();
        self.reserve_new_lines(&ctx, &added, actor)?;

        let order = self.dispatch(order_id, &cmd)?.document;
        tracing::info!(order_id = %order_id, lines = order.items().len(), "order item added");
        Ok(order)
    }

    /// Edit a line. Units the edit takes off the line are checked in if this
    /// order still holds them; a product swap follows the swap policy.
    pub fn update_item(
        &self,
        order_id: OrderId,
        line_no: u32,
        changes: ItemChanges,
        actor: &Actor,
    ) -> ServiceResult<ItemEdit> {
        let cmd = OrderCommand::UpdateItem(UpdateItem {
            order_id,
            line_no,
            changes: changes.clone(),
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let out = self.dispatch(order_id, &cmd)?;
        let reason = match out.events.first() {
            Some(OrderEvent::ItemUpdated(e)) if e.item.assigned_assets.is_empty() && changes.product_id.is_some() => {
                ReleaseReason::ProductChanged
            }
            _ => ReleaseReason::QuantityReduced,
        };
        Ok(self.finish_edit(out, reason, actor))
    }

    pub fn remove_item(&self, order_id: OrderId, line_no: u32, actor: &Actor) -> ServiceResult<ItemEdit> {
        let cmd = OrderCommand::RemoveItem(RemoveItem {
            order_id,
            line_no,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let out = self.dispatch(order_id, &cmd)?;
        Ok(self.finish_edit(out, ReleaseReason::ItemRemoved, actor))
    }

    fn finish_edit(&self, out: Dispatched<Order>, reason: ReleaseReason, actor: &Actor) -> ItemEdit {
        let released: Vec<AssetId> = out
            .events
            .iter()
            .flat_map(|e| e.released_assets().iter().copied())
            .collect();
        let ctx = AssignmentContext::for_order(&out.document);
        let ledger = self.resolver.release_units(&ctx, &released, reason, actor);
        if !out.events.is_empty() {
            tracing::info!(order_id = %ctx.order_id, released = released.len(), "order item edited");
        }
        ItemEdit {
            order: out.document,
            released,
            ledger,
        }
    }

    /// Replace a line's assignment as given. Only the order document is
    /// written; the ledger is left to the caller.
    pub fn set_item_assignment(
        &self,
        order_id: OrderId,
        line_no: u32,
        assets: Vec<AssetId>,
        auto_assigned: bool,
        actor: &Actor,
    ) -> ServiceResult<ItemEdit> {
        let held = self.resolver.held_assets()?;
        for asset_id in &assets {
            if let Some((holder, _)) = held.get(asset_id) {
                if *holder != order_id {
                    return Err(ServiceError::Conflict(format!(
                        "asset {asset_id} is held by order {holder}"
                    )));
                }
            }
        }

        let cmd = OrderCommand::SetItemAssignment(SetItemAssignment {
            order_id,
            line_no,
            assets,
            auto_assigned,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let out = self.dispatch(order_id, &cmd)?;
        let released = out
            .events
            .iter()
            .flat_map(|e| e.released_assets().iter().copied())
            .collect();
        Ok(ItemEdit {
            order: out.document,
            released,
            ledger: BatchOutcome::new(),
        })
    }

    pub fn assign_line(
        &self,
        order_id: OrderId,
        line_no: u32,
        asset_ids: &[AssetId],
        actor: &Actor,
    ) -> ServiceResult<LineAssignment> {
        let (order, item) = self.editable_line(order_id, line_no)?;
        let ctx = AssignmentContext::for_order(&order);
        let outcome = self.resolver.assign(&ctx, &item, asset_ids, actor)?;
        self.persist_assignment(&ctx, order, outcome, actor)
    }

    pub fn auto_assign_line(
        &self,
        order_id: OrderId,
        line_no: u32,
        branch_id: Option<BranchId>,
        count: usize,
        actor: &Actor,
    ) -> ServiceResult<LineAssignment> {
        let (order, item) = self.editable_line(order_id, line_no)?;
        let ctx = AssignmentContext::for_order(&order);
        let outcome = self.resolver.auto_assign(&ctx, &item, branch_id, count, actor)?;
        self.persist_assignment(&ctx, order, outcome, actor)
    }

    fn persist_assignment(
        &self,
        ctx: &AssignmentContext,
        order: Order,
        outcome: AssignOutcome,
        actor: &Actor,
    ) -> ServiceResult<LineAssignment> {
        if outcome.assigned.is_empty() {
            return Ok(LineAssignment { order, outcome });
        }
        let cmd = OrderCommand::SetItemAssignment(SetItemAssignment {
            order_id: ctx.order_id,
            line_no: outcome.item.line_no,
            assets: outcome.item.assigned_assets.clone(),
            auto_assigned: outcome.item.auto_assigned,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        match self.dispatch(ctx.order_id, &cmd) {
            Ok(out) => Ok(LineAssignment {
                order: out.document,
                outcome,
            }),
            Err(e) => {
                tracing::warn!(order_id = %ctx.order_id, error = %e, "assignment not saved; releasing reserved units");
                self.resolver
                    .release_units(ctx, &outcome.assigned, ReleaseReason::AssignmentAborted, actor);
                Err(e)
            }
        }
    }

    pub fn unassign_line(
        &self,
        order_id: OrderId,
        line_no: u32,
        asset_id: AssetId,
        also_checkin: bool,
        actor: &Actor,
    ) -> ServiceResult<LineUnassignment> {
        let (order, item) = self.editable_line(order_id, line_no)?;
        let ctx = AssignmentContext::for_order(&order);
        let outcome = self.resolver.unassign(&ctx, &item, asset_id, also_checkin, actor)?;

        let cmd = OrderCommand::SetItemAssignment(SetItemAssignment {
            order_id,
            line_no,
            assets: outcome.item.assigned_assets.clone(),
            auto_assigned: outcome.item.auto_assigned,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let order = self.dispatch(order_id, &cmd)?.document;
        Ok(LineUnassignment { order, outcome })
    }

    fn editable_line(&self, order_id: OrderId, line_no: u32) -> ServiceResult<(Order, OrderItem)> {
        let order = self.require(order_id)?;
        if order.status().is_terminal() {
            return Err(ServiceError::InvariantViolation(format!(
                "cannot modify items of a {} order",
                order.status()
            )));
        }
        let item = order
            .item(line_no)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("order {} line {line_no}", order.order_number())))?;
        Ok((order, item))
    }

    /// Explicit status change, mirrored to the upstream record. Cancelling
    /// checks reserved units back in.
    pub fn change_status(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        note: Option<String>,
        actor: &Actor,
    ) -> ServiceResult<StatusChange> {
        let cmd = OrderCommand::ChangeStatus(ChangeStatus {
            order_id,
            to,
            note,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let order = self.dispatch(order_id, &cmd)?.document;
        tracing::info!(order_id = %order_id, status = %to, "order status changed");

        let released = if to == OrderStatus::Cancelled {
            let held: Vec<AssetId> = order.held_assets().map(|(_, id)| id).collect();
            self.resolver.release_units(
                &AssignmentContext::for_order(&order),
                &held,
                ReleaseReason::OrderCancelled,
                actor,
            )
        } else {
            BatchOutcome::new()
        };

        if let Some(upstream_ref) = order.upstream_ref() {
            propagate(upstream_ref, "set_status", || {
                self.upstream.set_status(upstream_ref, to.as_str())
            });
        }
        self.propagate_history(&order, actor, "status", format!("order status changed to {to}"));
        Ok(StatusChange { order, released })
    }

    /// Store the latest delivery or pickup stage on the order.
    pub fn record_stage(
        &self,
        order_id: OrderId,
        kind: FulfillmentKind,
        stage: &str,
        actor: &Actor,
    ) -> ServiceResult<Order> {
        let cmd = OrderCommand::RecordFulfillmentStage(RecordFulfillmentStage {
            order_id,
            kind,
            stage: stage.to_string(),
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        Ok(self.dispatch(order_id, &cmd)?.document)
    }

    pub fn get(&self, order_id: OrderId) -> ServiceResult<Option<Order>> {
        Ok(self.dispatcher.store().get(order_id.0)?)
    }

    pub fn require(&self, order_id: OrderId) -> ServiceResult<Order> {
        self.get(order_id)?
            .ok_or_else(|| ServiceError::not_found(format!("order {order_id}")))
    }

    /// Orders, newest first, optionally of one status.
    pub fn query(&self, status: Option<OrderStatus>) -> ServiceResult<Vec<Order>> {
        let query = Query::new()
            .eq_opt("status", status.map(FieldValue::str))
            .order_by("created_at", Direction::Desc);
        Ok(self.dispatcher.store().query(&query)?)
    }

    pub fn subscribe(
        &self,
        filter: impl Fn(&Order) -> bool + Send + Sync + 'static,
        callback: impl Fn(&Order) + Send + Sync + 'static,
    ) -> Subscription {
        self.dispatcher.bus().subscribe(
            Arc::new(move |env: &ChangeEnvelope<Order>| filter(env.document())),
            Arc::new(move |env: &ChangeEnvelope<Order>| callback(env.document())),
        )
    }

    fn propagate_history(&self, order: &Order, actor: &Actor, kind: &str, message: String) {
        if let Some(upstream_ref) = order.upstream_ref() {
            let entry = UpstreamEntry::new(self.now(), actor, kind, message);
            propagate(upstream_ref, "append_history", || {
                self.upstream.append_history(upstream_ref, entry)
            });
        }
    }

    fn dispatch(&self, order_id: OrderId, cmd: &OrderCommand) -> ServiceResult<Dispatched<Order>> {
        self.dispatcher
            .dispatch(order_id.0, cmd, || Order::empty(order_id))
    }

    fn now(&self) -> DateTime<Utc> {
        self.dispatcher.store().server_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use carefleet_assets::{Asset, AssetStatus};
    use carefleet_events::InMemoryEventBus;
    use carefleet_products::{Product, ProductId};

    use crate::catalog::ProductCatalog;
    use crate::collaborators::InMemoryUpstream;
    use crate::ledger::{AssetLedger, CreateUnits};
    use crate::store::InMemoryDocumentStore;

    struct Fixture {
        desk: OrderDesk,
        upstream: Arc<InMemoryUpstream>,
        bed: ProductId,
        chair: ProductId,
    }

    fn fixture() -> Fixture {
        let config = EngineConfig::default();
        let products: SharedStore<Product> = Arc::new(InMemoryDocumentStore::<Product>::new());
        let catalog = ProductCatalog::new(
            products.clone(),
            Arc::new(InMemoryEventBus::<ChangeEnvelope<Product>>::new()),
        );
        let bed = catalog.create_product("BED", "Bed", "beds", 1500).unwrap().id_typed();
        let chair = catalog.create_product("WCH", "Wheelchair", "mobility", 700).unwrap().id_typed();
        let ledger = Arc::new(AssetLedger::new(
            Arc::new(InMemoryDocumentStore::<Asset>::new()),
            Arc::new(InMemoryEventBus::<ChangeEnvelope<Asset>>::new()),
            products,
            &config,
        ));
        let orders: SharedStore<Order> = Arc::new(InMemoryDocumentStore::<Order>::new());
        let resolver = Arc::new(Resolver::new(ledger, orders.clone(), config.clone()));
        let upstream = Arc::new(InMemoryUpstream::new());
        let desk = OrderDesk::new(
            orders,
            Arc::new(InMemoryEventBus::<ChangeEnvelope<Order>>::new()),
            resolver,
            upstream.clone(),
            &config,
        );
        Fixture {
            desk,
            upstream,
            bed,
            chair,
        }
    }

    fn actor() -> Actor {
        Actor::new("u-1", "Dispatcher")
    }

    fn units(f: &Fixture, product: ProductId, n: u32) -> Vec<AssetId> {
        f.desk
            .resolver()
            .ledger()
            .create_units(CreateUnits::new(product, n), &actor())
            .unwrap()
            .succeeded
            .iter()
            .map(Asset::id_typed)
            .collect()
    }

    fn status_of(f: &Fixture, id: AssetId) -> AssetStatus {
        f.desk.resolver().ledger().require(id).unwrap().status()
    }

    fn new_order(number: &str, product: ProductId, assets: Vec<AssetId>) -> NewOrder {
        let quantity = assets.len() as u32;
        NewOrder::new(number, Contact::new("Asha"))
            .item(NewItem::product(product, quantity, 1500).with_assets(assets))
            .upstream("REQ-1")
    }

    #[test]
    fn create_order_reserves_units_and_mirrors_upstream() {
        let f = fixture();
        let ids = units(&f, f.bed, 2);

        let order = f.desk.create_order(new_order("SO-1", f.bed, ids.clone()), &actor()).unwrap();

        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.totals().subtotal, 3000);
        for id in &ids {
            assert_eq!(status_of(&f, *id), AssetStatus::Reserved);
        }
        assert_eq!(f.upstream.history("REQ-1").len(), 1);
    }

    #[test]
    fn create_order_requires_full_assignment() {
        let f = fixture();
        let ids = units(&f, f.bed, 1);
        let new = NewOrder::new("SO-1", Contact::new("Asha"))
            .item(NewItem::product(f.bed, 2, 1500).with_assets(ids.clone()));

        match f.desk.create_order(new, &actor()).unwrap_err() {
            ServiceError::IncompleteAssignment { lines } => assert_eq!(lines, vec![1]),
            _ => panic!("Expected IncompleteAssignment"),
        }
        assert_eq!(status_of(&f, ids[0]), AssetStatus::InStock);
    }

    #[test]
    fn units_on_a_live_order_cannot_join_another() {
        let f = fixture();
        let ids = units(&f, f.bed, 1);
        f.desk.create_order(new_order("SO-1", f.bed, ids.clone()), &actor()).unwrap();

        let second = f.desk.create_order(new_order("SO-2", f.bed, ids.clone()), &actor());
        assert!(matches!(second, Err(ServiceError::Conflict(_))));
        assert_eq!(f.desk.query(None).unwrap().len(), 1);
    }

    #[test]
    fn failed_creation_releases_nothing_it_did_not_reserve() {
        let f = fixture();
        let beds = units(&f, f.bed, 1);
        let chairs = units(&f, f.chair, 1);
        let new = NewOrder::new("SO-1", Contact::new("Asha"))
            .item(NewItem::product(f.bed, 1, 1500).with_assets(beds.clone()))
            .item(NewItem::product(f.bed, 1, 1500).with_assets(chairs.clone()));

        assert!(matches!(f.desk.create_order(new, &actor()), Err(ServiceError::Validation(_))));
        assert_eq!(status_of(&f, beds[0]), AssetStatus::InStock);
        assert_eq!(status_of(&f, chairs[0]), AssetStatus::InStock);
    }

    #[test]
    fn quantity_reduction_checks_in_the_tail() {
        let f = fixture();
        let ids = units(&f, f.bed, 2);
        let order = f.desk.create_order(new_order("SO-1", f.bed, ids.clone()), &actor()).unwrap();

        let edit = f
            .desk
            .update_item(
                order.id_typed(),
                1,
                ItemChanges {
                    quantity: Some(1),
                    ..ItemChanges::default()
                },
                &actor(),
            )
            .unwrap();

        assert_eq!(edit.released, vec![ids[1]]);
        assert_eq!(edit.ledger.succeeded, vec![ids[1]]);
        assert_eq!(edit.order.totals().subtotal, 1500);
        assert_eq!(status_of(&f, ids[0]), AssetStatus::Reserved);
        assert_eq!(status_of(&f, ids[1]), AssetStatus::InStock);
    }

    #[test]
    fn product_swap_clears_the_line_and_releases_units() {
        let f = fixture();
        let ids = units(&f, f.bed, 1);
        let order = f.desk.create_order(new_order("SO-1", f.bed, ids.clone()), &actor()).unwrap();

        let edit = f
            .desk
            .update_item(
                order.id_typed(),
                1,
                ItemChanges {
                    product_id: Some(f.chair),
                    ..ItemChanges::default()
                },
                &actor(),
            )
            .unwrap();

        let line = edit.order.item(1).unwrap();
        assert_eq!(line.product_id, Some(f.chair));
        assert!(line.assigned_assets.is_empty());
        assert_eq!(status_of(&f, ids[0]), AssetStatus::InStock);
    }

    #[test]
    fn assign_and_unassign_lines_persist_on_the_order() {
        let f = fixture();
        let ids = units(&f, f.bed, 3);
        let order = f
            .desk
            .create_order(new_order("SO-1", f.bed, vec![ids[0]]), &actor())
            .unwrap();
        let order_id = order.id_typed();
        f.desk
            .update_item(order_id, 1, ItemChanges { quantity: Some(2), ..ItemChanges::default() }, &actor())
            .unwrap();

        let assigned = f.desk.assign_line(order_id, 1, &[ids[1], ids[2]], &actor()).unwrap();
        assert_eq!(assigned.outcome.assigned, vec![ids[1]]);
        assert_eq!(assigned.outcome.dropped, 1);
        assert_eq!(assigned.order.item(1).unwrap().assigned_assets, vec![ids[0], ids[1]]);

        let unassigned = f.desk.unassign_line(order_id, 1, ids[0], true, &actor()).unwrap();
        assert_eq!(unassigned.order.item(1).unwrap().assigned_assets, vec![ids[1]]);
        assert_eq!(status_of(&f, ids[0]), AssetStatus::InStock);
    }

    #[test]
    fn cancelling_checks_reserved_units_back_in() {
        let f = fixture();
        let ids = units(&f, f.bed, 2);
        let order = f.desk.create_order(new_order("SO-1", f.bed, ids.clone()), &actor()).unwrap();

        let change = f
            .desk
            .change_status(order.id_typed(), OrderStatus::Cancelled, Some("customer called".into()), &actor())
            .unwrap();

        assert_eq!(change.order.status(), OrderStatus::Cancelled);
        assert_eq!(change.released.succeeded.len(), 2);
        assert_eq!(f.upstream.status("REQ-1").as_deref(), Some("cancelled"));
        assert!(matches!(
            f.desk.assign_line(order.id_typed(), 1, &ids, &actor()),
            Err(ServiceError::InvariantViolation(_))
        ));
    }

    #[test]
    fn status_changes_follow_the_lifecycle() {
        let f = fixture();
        let ids = units(&f, f.bed, 1);
        let order = f.desk.create_order(new_order("SO-1", f.bed, ids), &actor()).unwrap();
        let id = order.id_typed();

        f.desk.change_status(id, OrderStatus::Active, None, &actor()).unwrap();
        assert!(matches!(
            f.desk.change_status(id, OrderStatus::Active, None, &actor()),
            Err(ServiceError::InvariantViolation(_))
        ));
        f.desk.change_status(id, OrderStatus::Completed, None, &actor()).unwrap();
        assert!(f.desk.change_status(id, OrderStatus::Cancelled, None, &actor()).is_err());
        assert_eq!(f.desk.query(Some(OrderStatus::Completed)).unwrap().len(), 1);
    }

    #[test]
    fn upstream_outage_never_fails_the_order() {
        let config = EngineConfig::default();
        let orders: SharedStore<Order> = Arc::new(InMemoryDocumentStore::<Order>::new());
        let ledger = Arc::new(AssetLedger::new(
            Arc::new(InMemoryDocumentStore::<Asset>::new()),
            Arc::new(InMemoryEventBus::<ChangeEnvelope<Asset>>::new()),
            Arc::new(InMemoryDocumentStore::<Product>::new()),
            &config,
        ));
        let desk = OrderDesk::new(
            orders.clone(),
            Arc::new(InMemoryEventBus::<ChangeEnvelope<Order>>::new()),
            Arc::new(Resolver::new(ledger, orders, config.clone())),
            Arc::new(InMemoryUpstream::unavailable()),
            &config,
        );

        let order = desk
            .create_order(
                NewOrder::new("SO-9", Contact::new("Asha")).item(NewItem::service(1, 500)).upstream("REQ-9"),
                &actor(),
            )
            .unwrap();
        let change = desk
            .change_status(order.id_typed(), OrderStatus::Active, None, &actor())
            .unwrap();
        assert_eq!(change.order.status(), OrderStatus::Active);
    }
}
