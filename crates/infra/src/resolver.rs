//! Reservation/assignment resolver.
//!
//! Decides which units may fill an order line and performs the ledger
//! transitions for them. The resolver works on a line value and hands back
//! the updated line; persisting it on the order is the caller's job.
//!
//! Assignment is two-phase: [`Resolver::plan`] reads and checks candidates,
//! [`Resolver::commit`] writes the ledger. With compare-and-swap enabled a
//! unit taken by someone else between the two phases fails its write instead
//! of being silently re-linked.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;

use carefleet_assets::{Asset, AssetId, AssetStatus, RentalLink, StatusExtra};
use carefleet_core::Actor;
use carefleet_orders::{ItemChanges, Order, OrderId, OrderItem, OrderStatus};
use carefleet_products::ProductId;

use crate::batch::BatchOutcome;
use crate::command_dispatcher::SharedStore;
use crate::config::{EngineConfig, ProductSwapPolicy};
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{AssetFilter, AssetLedger, CheckinDetails};
use crate::store::{Direction, DocumentStore, FieldValue, Query};

/// The order a line belongs to, as needed for rental links and notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentContext {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer: String,
}

impl AssignmentContext {
    pub fn new(order_id: OrderId, order_number: impl Into<String>, customer: impl Into<String>) -> Self {
        Self {
            order_id,
            order_number: order_number.into(),
            customer: customer.into(),
        }
    }

    pub fn for_order(order: &Order) -> Self {
        Self::new(order.id_typed(), order.order_number(), order.customer().name.clone())
    }

    /// Rental id written on every unit this order holds.
    pub fn rental_id(&self) -> String {
        self.order_id.to_string()
    }

    fn rental_link(&self, item: &OrderItem) -> RentalLink {
        let link = RentalLink::new(self.rental_id(), self.customer.clone());
        match item.end_date {
            Some(until) => link.until(until),
            None => link,
        }
    }

    /// Whether `asset` is currently reserved or out under this order.
    pub fn holds(&self, asset: &Asset) -> bool {
        asset.status().requires_rental()
            && asset.rental().is_some_and(|r| r.rental_id == self.rental_id())
    }
}

/// Why a candidate unit was not accepted for a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NotFound,
    WrongProduct { actual: Option<ProductId> },
    NotInStock(AssetStatus),
    HeldElsewhere { order_id: OrderId, line_no: u32 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotFound => write!(f, "asset does not exist"),
            RejectReason::WrongProduct { actual: Some(p) } => write!(f, "asset belongs to product {p}"),
            RejectReason::WrongProduct { actual: None } => write!(f, "asset has no product"),
            RejectReason::NotInStock(status) => write!(f, "asset is {status}"),
            RejectReason::HeldElsewhere { order_id, line_no } => {
                write!(f, "asset is held by order {order_id} line {line_no}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub asset_id: AssetId,
    pub reason: RejectReason,
}

/// Checked candidates for one line, not yet written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignPlan {
    pub item: OrderItem,
    pub accepted: Vec<AssetId>,
    pub dropped: usize,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignOutcome {
    /// The line with every successfully written unit appended.
    pub item: OrderItem,
    pub assigned: Vec<AssetId>,
    /// Candidates beyond the line's remaining capacity.
    pub dropped: usize,
    pub rejected: Vec<Rejection>,
    pub ledger: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnassignOutcome {
    pub item: OrderItem,
    /// The unit after its checkin, when one was requested.
    pub checked_in: Option<Asset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSwap {
    pub item: OrderItem,
    pub released: Vec<AssetId>,
    pub ledger: BatchOutcome,
}

/// Why units are leaving an order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    ProductChanged,
    QuantityReduced,
    ItemRemoved,
    OrderCancelled,
    CreationAborted,
    AssignmentAborted,
}

impl ReleaseReason {
    fn as_str(self) -> &'static str {
        match self {
            ReleaseReason::ProductChanged => "product changed",
            ReleaseReason::QuantityReduced => "quantity reduced",
            ReleaseReason::ItemRemoved => "item removed",
            ReleaseReason::OrderCancelled => "order cancelled",
            ReleaseReason::CreationAborted => "order creation aborted",
            ReleaseReason::AssignmentAborted => "assignment not saved",
        }
    }
}

/// Units held by live orders, with the holding order and line.
pub type HeldAssets = HashMap<AssetId, (OrderId, u32)>;

pub struct Resolver {
    ledger: Arc<AssetLedger>,
    orders: SharedStore<Order>,
    config: EngineConfig,
}

impl Resolver {
    pub fn new(ledger: Arc<AssetLedger>, orders: SharedStore<Order>, config: EngineConfig) -> Self {
        Self {
            ledger,
            orders,
            config,
        }
    }

    pub fn ledger(&self) -> &AssetLedger {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn held_assets(&self) -> ServiceResult<HeldAssets> {
        let mut held = HeldAssets::new();
        for status in [OrderStatus::Created, OrderStatus::Active] {
            let live = self.orders.query(&Query::new().eq("status", FieldValue::str(status)))?;
            for order in &live {
                for (line_no, asset_id) in order.held_assets() {
                    held.insert(asset_id, (order.id_typed(), line_no));
                }
            }
        }
        Ok(held)
    }

    /// In-stock units of a product not held by any live order, oldest first.
    ///
    /// `date_range` is only checked for `start <= end`. Reservations are not
    /// dated, so a unit held today is ineligible for every range and a unit
    /// in stock today is eligible for every range; no overlap filtering is
    /// done.
    pub fn find_eligible(
        &self,
        product_id: ProductId,
        branch_id: Option<carefleet_core::BranchId>,
        date_range: Option<(NaiveDate, NaiveDate)>,
    ) -> ServiceResult<Vec<Asset>> {
        if let Some((start, end)) = date_range {
            if start > end {
                return Err(ServiceError::validation(format!(
                    "date range starts {start} after it ends {end}"
                )));
            }
        }

        let mut filter = AssetFilter::new().product(product_id).status(AssetStatus::InStock);
        filter.branch_id = branch_id;

        let held = self.held_assets()?;
        let eligible: Vec<Asset> = self
            .ledger
            .query_ordered(filter, Direction::Asc)?
            .into_iter()
            .filter(|a| !held.contains_key(&a.id_typed()))
            .collect();
        tracing::debug!(product_id = %product_id, count = eligible.len(), "eligible units");
        Ok(eligible)
    }

    /// Check candidates for `item` without writing anything.
    pub fn plan(&self, ctx: &AssignmentContext, item: &OrderItem, asset_ids: &[AssetId]) -> ServiceResult<AssignPlan> {
        let Some(product_id) = item.product_id else {
            return Err(ServiceError::validation(format!(
                "line {} has no product and takes no assets",
                item.line_no
            )));
        };

        let mut candidates: Vec<AssetId> = Vec::new();
        for &asset_id in asset_ids {
            if !item.holds(asset_id) && !candidates.contains(&asset_id) {
                candidates.push(asset_id);
            }
        }

        let capacity = item.remaining_capacity();
        let dropped = candidates.len().saturating_sub(capacity);
        if dropped > 0 {
            candidates.truncate(capacity);
            tracing::warn!(
                order_id = %ctx.order_id,
                line_no = item.line_no,
                capacity,
                dropped,
                "more units offered than the line can take; extras dropped"
            );
        }

        let held = self.held_assets()?;
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for asset_id in candidates {
            match self.check_candidate(asset_id, product_id, &held, ctx, item.line_no)? {
                Ok(()) => accepted.push(asset_id),
                Err(reason) => rejected.push(Rejection { asset_id, reason }),
            }
        }

        Ok(AssignPlan {
            item: item.clone(),
            accepted,
            dropped,
            rejected,
        })
    }

    fn check_candidate(
        &self,
        asset_id: AssetId,
        product_id: ProductId,
        held: &HeldAssets,
        ctx: &AssignmentContext,
        line_no: u32,
    ) -> ServiceResult<Result<(), RejectReason>> {
        let Some(asset) = self.ledger.get(asset_id)? else {
            return Ok(Err(RejectReason::NotFound));
        };
        if asset.product_id() != Some(product_id) {
            return Ok(Err(RejectReason::WrongProduct {
                actual: asset.product_id(),
            }));
        }
        if let Some(&(order_id, held_line)) = held.get(&asset_id) {
            if order_id != ctx.order_id || held_line != line_no {
                return Ok(Err(RejectReason::HeldElsewhere {
                    order_id,
                    line_no: held_line,
                }));
            }
        }
        if asset.status() != AssetStatus::InStock {
            return Ok(Err(RejectReason::NotInStock(asset.status())));
        }
        Ok(Ok(()))
    }

    /// Write the planned units to the ledger and append the ones that
    /// succeeded to the line.
    pub fn commit(&self, ctx: &AssignmentContext, plan: AssignPlan, actor: &Actor) -> AssignOutcome {
        let target = self.config.reservation_status.asset_status();
        let mut item = plan.item;
        let mut assigned = Vec::new();
        let mut ledger = BatchOutcome::new();

        for asset_id in plan.accepted {
            let note = Some(format!("assigned to order {}", ctx.order_number));
            let extra = StatusExtra::with_rental(ctx.rental_link(&item));
            let written = if self.config.compare_and_swap {
                self.ledger
                    .set_status_if(asset_id, AssetStatus::InStock, target, note, extra, actor)
            } else {
                self.ledger.set_status(asset_id, target, note, extra, actor)
            };
            match written {
                Ok(_) => {
                    item.assigned_assets.push(asset_id);
                    assigned.push(asset_id);
                    ledger.succeed(asset_id);
                }
                Err(e) => {
                    tracing::warn!(asset_id = %asset_id, order_id = %ctx.order_id, error = %e, "unit could not be reserved");
                    ledger.fail(asset_id, e);
                }
            }
        }
        ledger.log_partial("assign");

        if !assigned.is_empty() {
            tracing::info!(
                order_id = %ctx.order_id,
                line_no = item.line_no,
                assigned = assigned.len(),
                status = %target,
                "units assigned"
            );
        }

        AssignOutcome {
            item,
            assigned,
            dropped: plan.dropped,
            rejected: plan.rejected,
            ledger,
        }
    }

    pub fn assign(
        &self,
        ctx: &AssignmentContext,
        item: &OrderItem,
        asset_ids: &[AssetId],
        actor: &Actor,
    ) -> ServiceResult<AssignOutcome> {
        let plan = self.plan(ctx, item, asset_ids)?;
        Ok(self.commit(ctx, plan, actor))
    }

    /// Fill up to `count` open slots of the line from the eligible units.
    pub fn auto_assign(
        &self,
        ctx: &AssignmentContext,
        item: &OrderItem,
        branch_id: Option<carefleet_core::BranchId>,
        count: usize,
        actor: &Actor,
    ) -> ServiceResult<AssignOutcome> {
        let Some(product_id) = item.product_id else {
            return Err(ServiceError::validation(format!(
                "line {} has no product and takes no assets",
                item.line_no
            )));
        };
        let range = item.start_date.zip(item.end_date);
        let eligible = self.find_eligible(product_id, branch_id.or(item.branch_id), range)?;

        let picks: Vec<AssetId> = eligible
            .iter()
            .take(count.min(item.remaining_capacity()))
            .map(Asset::id_typed)
            .collect();
        let mut outcome = self.assign(ctx, item, &picks, actor)?;
        if !outcome.assigned.is_empty() {
            outcome.item.auto_assigned = true;
        }
        Ok(outcome)
    }

    /// Take one unit off the line, optionally checking it back in.
    pub fn unassign(
        &self,
        ctx: &AssignmentContext,
        item: &OrderItem,
        asset_id: AssetId,
        also_checkin: bool,
        actor: &Actor,
    ) -> ServiceResult<UnassignOutcome> {
        if !item.holds(asset_id) {
            return Err(ServiceError::not_found(format!(
                "asset {asset_id} on line {}",
                item.line_no
            )));
        }

        let checked_in = if also_checkin {
            let details = CheckinDetails::note(format!("unassigned from order {}", ctx.order_number));
            Some(self.ledger.checkin(asset_id, details, actor)?)
        } else {
            None
        };

        let mut next = item.clone();
        next.assigned_assets.retain(|a| *a != asset_id);
        tracing::info!(order_id = %ctx.order_id, line_no = item.line_no, asset_id = %asset_id, also_checkin, "unit unassigned");
        Ok(UnassignOutcome { item: next, checked_in })
    }

    /// Swap the line's product. Every assignment is cleared; units are
    /// checked in according to the product-swap policy.
    pub fn release_for_product_change(
        &self,
        ctx: &AssignmentContext,
        item: &OrderItem,
        new_product: ProductId,
        actor: &Actor,
    ) -> ServiceResult<ProductSwap> {
        let changes = ItemChanges {
            product_id: Some(new_product),
            ..ItemChanges::default()
        };
        let (item, released) = item.with_changes(&changes)?;
        let ledger = self.release_units(ctx, &released, ReleaseReason::ProductChanged, actor);
        Ok(ProductSwap { item, released, ledger })
    }

    /// Check in units that left an order line, if this order still holds
    /// them. Units the order no longer holds are left alone, and so are
    /// units already out with the customer when an order is cancelled.
    pub fn release_units(
        &self,
        ctx: &AssignmentContext,
        asset_ids: &[AssetId],
        reason: ReleaseReason,
        actor: &Actor,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();
        if asset_ids.is_empty() {
            return outcome;
        }
        if reason == ReleaseReason::ProductChanged && self.config.product_swap == ProductSwapPolicy::Unlink {
            tracing::info!(order_id = %ctx.order_id, units = asset_ids.len(), "product swap unlinked units without checkin");
            return outcome;
        }

        for &asset_id in asset_ids {
            let asset = match self.ledger.get(asset_id) {
                Ok(Some(asset)) => asset,
                Ok(None) => {
                    outcome.fail(asset_id, ServiceError::not_found(format!("asset {asset_id}")));
                    continue;
                }
                Err(e) => {
                    outcome.fail(asset_id, e);
                    continue;
                }
            };
            if !ctx.holds(&asset)
                || (reason == ReleaseReason::OrderCancelled && asset.status() == AssetStatus::OutForRental)
            {
                continue;
            }
            let details = CheckinDetails::note(format!("released: {} on order {}", reason.as_str(), ctx.order_number));
            match self.ledger.checkin(asset_id, details, actor) {
                Ok(_) => outcome.succeed(asset_id),
                Err(e) => outcome.fail(asset_id, e),
            }
        }
        outcome.log_partial("release_units");
        outcome
    }
}
