use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carefleet_assets::AssetId;
use carefleet_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError};
use carefleet_events::Event;

use crate::contact::Contact;
use crate::item::{ItemChanges, NewItem, OrderItem};
use crate::pricing::{self, Discount, Totals};

/// Rental order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order status lifecycle.
///
/// `created → active → completed`, `cancelled` from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Active,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Created,
        OrderStatus::Active,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Live orders hold their asset assignments.
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Created, OrderStatus::Active)
                | (OrderStatus::Active, OrderStatus::Completed)
                | (OrderStatus::Created, OrderStatus::Cancelled)
                | (OrderStatus::Active, OrderStatus::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Active => "active",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// Which secondary workflow reported a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentKind {
    Delivery,
    Pickup,
}

impl FulfillmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FulfillmentKind::Delivery => "delivery",
            FulfillmentKind::Pickup => "pickup",
        }
    }
}

/// One audit log line. Exactly one per applied event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub by: String,
    pub by_name: String,
    pub action: String,
    pub detail: String,
    pub note: Option<String>,
}

impl AuditEntry {
    fn new(at: DateTime<Utc>, actor: &Actor, action: &str, detail: String, note: Option<String>) -> Self {
        Self {
            at,
            by: actor.uid.clone(),
            by_name: actor.display_name.clone(),
            action: action.to_string(),
            detail,
            note,
        }
    }
}

/// Aggregate root: Order. Owns its items exclusively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: String,
    customer: Contact,
    items: Vec<OrderItem>,
    discount: Discount,
    tax_bps: u32,
    totals: Totals,
    status: OrderStatus,
    /// Requirement/lead record this order was raised from.
    upstream_ref: Option<String>,
    delivery_status: Option<String>,
    pickup_status: Option<String>,
    audit: Vec<AuditEntry>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            customer: Contact::default(),
            items: Vec::new(),
            discount: Discount::None,
            tax_bps: 0,
            totals: Totals::default(),
            status: OrderStatus::Created,
            upstream_ref: None,
            delivery_status: None,
            pickup_status: None,
            audit: Vec::new(),
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn customer(&self) -> &Contact {
        &self.customer
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, line_no: u32) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.line_no == line_no)
    }

    pub fn discount(&self) -> Discount {
        self.discount
    }

    pub fn tax_bps(&self) -> u32 {
        self.tax_bps
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn upstream_ref(&self) -> Option<&str> {
        self.upstream_ref.as_deref()
    }

    pub fn delivery_status(&self) -> Option<&str> {
        self.delivery_status.as_deref()
    }

    pub fn pickup_status(&self) -> Option<&str> {
        self.pickup_status.as_deref()
    }

    pub fn audit(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Created and not terminal: its assignments count for uniqueness.
    pub fn is_live(&self) -> bool {
        self.created && self.status.is_live()
    }

    /// Every asset assigned on any line, with the holding line number.
    pub fn held_assets(&self) -> impl Iterator<Item = (u32, AssetId)> + '_ {
        self.items
            .iter()
            .flat_map(|i| i.assigned_assets.iter().map(move |a| (i.line_no, *a)))
    }

    fn next_line_no(&self) -> u32 {
        self.items.iter().map(|i| i.line_no).max().unwrap_or(0) + 1
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
///
/// Every product line must arrive fully assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer: Contact,
    pub items: Vec<NewItem>,
    pub discount: Discount,
    pub tax_bps: u32,
    pub upstream_ref: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub order_id: OrderId,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub order_id: OrderId,
    pub item: NewItem,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub order_id: OrderId,
    pub line_no: u32,
    pub changes: ItemChanges,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub order_id: OrderId,
    pub line_no: u32,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetItemAssignment (replaces the line's assigned assets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetItemAssignment {
    pub order_id: OrderId,
    pub line_no: u32,
    pub assets: Vec<AssetId>,
    pub auto_assigned: bool,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordFulfillmentStage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFulfillmentStage {
    pub order_id: OrderId,
    pub kind: FulfillmentKind,
    pub stage: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    ChangeStatus(ChangeStatus),
    AddItem(AddItem),
    UpdateItem(UpdateItem),
    RemoveItem(RemoveItem),
    SetItemAssignment(SetItemAssignment),
    RecordFulfillmentStage(RecordFulfillmentStage),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer: Contact,
    pub items: Vec<OrderItem>,
    pub discount: Discount,
    pub tax_bps: u32,
    pub upstream_ref: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub order_id: OrderId,
    pub item: OrderItem,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemUpdated. `item` is the resulting line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub order_id: OrderId,
    pub item: OrderItem,
    pub released: Vec<AssetId>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub order_id: OrderId,
    pub line_no: u32,
    pub released: Vec<AssetId>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAssignmentSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAssignmentSet {
    pub order_id: OrderId,
    pub line_no: u32,
    pub assets: Vec<AssetId>,
    pub auto_assigned: bool,
    pub released: Vec<AssetId>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FulfillmentStageRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentStageRecorded {
    pub order_id: OrderId,
    pub kind: FulfillmentKind,
    pub stage: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderStatusChanged(OrderStatusChanged),
    ItemAdded(ItemAdded),
    ItemUpdated(ItemUpdated),
    ItemRemoved(ItemRemoved),
    ItemAssignmentSet(ItemAssignmentSet),
    FulfillmentStageRecorded(FulfillmentStageRecorded),
}

impl OrderEvent {
    /// Asset ids the order stopped holding because of this event.
    pub fn released_assets(&self) -> &[AssetId] {
        match self {
            OrderEvent::ItemUpdated(e) => &e.released,
            OrderEvent::ItemRemoved(e) => &e.released,
            OrderEvent::ItemAssignmentSet(e) => &e.released,
            _ => &[],
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.order.created",
            OrderEvent::OrderStatusChanged(_) => "orders.order.status_changed",
            OrderEvent::ItemAdded(_) => "orders.order.item_added",
            OrderEvent::ItemUpdated(_) => "orders.order.item_updated",
            OrderEvent::ItemRemoved(_) => "orders.order.item_removed",
            OrderEvent::ItemAssignmentSet(_) => "orders.order.assignment_set",
            OrderEvent::FulfillmentStageRecorded(_) => "orders.order.fulfillment_stage_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::OrderStatusChanged(e) => e.occurred_at,
            OrderEvent::ItemAdded(e) => e.occurred_at,
            OrderEvent::ItemUpdated(e) => e.occurred_at,
            OrderEvent::ItemRemoved(e) => e.occurred_at,
            OrderEvent::ItemAssignmentSet(e) => e.occurred_at,
            OrderEvent::FulfillmentStageRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let entry = match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.customer = e.customer.clone();
                self.items = e.items.clone();
                self.discount = e.discount;
                self.tax_bps = e.tax_bps;
                self.upstream_ref = e.upstream_ref.clone();
                self.status = OrderStatus::Created;
                self.created_at = Some(e.occurred_at);
                self.created = true;
                AuditEntry::new(
                    e.occurred_at,
                    &e.actor,
                    "created",
                    format!("{} items", e.items.len()),
                    None,
                )
            }
            OrderEvent::OrderStatusChanged(e) => {
                self.status = e.to;
                AuditEntry::new(
                    e.occurred_at,
                    &e.actor,
                    "status_changed",
                    format!("{} -> {}", e.from, e.to),
                    e.note.clone(),
                )
            }
            OrderEvent::ItemAdded(e) => {
                self.items.push(e.item.clone());
                AuditEntry::new(
                    e.occurred_at,
                    &e.actor,
                    "item_added",
                    format!("line {}", e.item.line_no),
                    None,
                )
            }
            OrderEvent::ItemUpdated(e) => {
                if let Some(slot) = self.items.iter_mut().find(|i| i.line_no == e.item.line_no) {
                    *slot = e.item.clone();
                }
                AuditEntry::new(
                    e.occurred_at,
                    &e.actor,
                    "item_updated",
                    format!("line {} ({} released)", e.item.line_no, e.released.len()),
                    None,
                )
            }
            OrderEvent::ItemRemoved(e) => {
                self.items.retain(|i| i.line_no != e.line_no);
                AuditEntry::new(
                    e.occurred_at,
                    &e.actor,
                    "item_removed",
                    format!("line {} ({} released)", e.line_no, e.released.len()),
                    None,
                )
            }
            OrderEvent::ItemAssignmentSet(e) => {
                if let Some(slot) = self.items.iter_mut().find(|i| i.line_no == e.line_no) {
                    slot.assigned_assets = e.assets.clone();
                    slot.auto_assigned = e.auto_assigned;
                }
                AuditEntry::new(
                    e.occurred_at,
                    &e.actor,
                    "assignment_set",
                    format!("line {}: {} assigned", e.line_no, e.assets.len()),
                    None,
                )
            }
            OrderEvent::FulfillmentStageRecorded(e) => {
                match e.kind {
                    FulfillmentKind::Delivery => self.delivery_status = Some(e.stage.clone()),
                    FulfillmentKind::Pickup => self.pickup_status = Some(e.stage.clone()),
                }
                AuditEntry::new(
                    e.occurred_at,
                    &e.actor,
                    "fulfillment_stage",
                    format!("{}: {}", e.kind.as_str(), e.stage),
                    None,
                )
            }
        };

        self.totals = pricing::compute(&self.items, self.discount, self.tax_bps);
        self.audit.push(entry);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            OrderCommand::AddItem(cmd) => self.handle_add_item(cmd),
            OrderCommand::UpdateItem(cmd) => self.handle_update_item(cmd),
            OrderCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            OrderCommand::SetItemAssignment(cmd) => self.handle_set_assignment(cmd),
            OrderCommand::RecordFulfillmentStage(cmd) => self.handle_record_stage(cmd),
        }
    }
}

impl Order {
    fn ensure_created(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_modifiable(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "cannot modify items of a {} order",
                self.status
            )));
        }
        Ok(())
    }

    fn existing_item(&self, line_no: u32) -> Result<&OrderItem, DomainError> {
        self.item(line_no)
            .ok_or_else(|| DomainError::not_found(format!("order {} line {line_no}", self.order_number)))
    }

    /// Reject assets already held by a different line of this order.
    fn ensure_not_held_elsewhere(&self, line_no: u32, assets: &[AssetId]) -> Result<(), DomainError> {
        for (holder, asset_id) in self.held_assets() {
            if holder != line_no && assets.contains(&asset_id) {
                return Err(DomainError::conflict(format!(
                    "asset {asset_id} is already assigned to line {holder}"
                )));
            }
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        cmd.customer.validate()?;
        cmd.discount.validate()?;
        if cmd.items.is_empty() {
            return Err(DomainError::validation("order must have at least one item"));
        }

        let items: Vec<OrderItem> = cmd
            .items
            .iter()
            .cloned()
            .zip(1u32..)
            .map(|(item, line_no)| item.into_item(line_no))
            .collect();

        let mut seen: Vec<AssetId> = Vec::new();
        for item in &items {
            item.validate()?;
            for asset_id in &item.assigned_assets {
                if seen.contains(asset_id) {
                    return Err(DomainError::validation(format!(
                        "asset {asset_id} assigned to more than one line"
                    )));
                }
                seen.push(*asset_id);
            }
        }

        let under_assigned: Vec<u32> = items
            .iter()
            .filter(|i| !i.is_service_line() && !i.is_fully_assigned())
            .map(|i| i.line_no)
            .collect();
        if !under_assigned.is_empty() {
            return Err(DomainError::IncompleteAssignment {
                lines: under_assigned,
            });
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.trim().to_string(),
            customer: cmd.customer.clone(),
            items,
            discount: cmd.discount,
            tax_bps: cmd.tax_bps,
            upstream_ref: cmd.upstream_ref.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;

        if !self.status.can_transition_to(cmd.to) {
            return Err(DomainError::invariant(format!(
                "order cannot move from {} to {}",
                self.status, cmd.to
            )));
        }

        Ok(vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.to,
            note: cmd.note.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        let item = cmd.item.clone().into_item(self.next_line_no());
        item.validate()?;
        self.ensure_not_held_elsewhere(item.line_no, &item.assigned_assets)?;

        Ok(vec![OrderEvent::ItemAdded(ItemAdded {
            order_id: cmd.order_id,
            item,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateItem) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        let current = self.existing_item(cmd.line_no)?;
        let (item, released) = current.with_changes(&cmd.changes)?;
        if &item == current {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::ItemUpdated(ItemUpdated {
            order_id: cmd.order_id,
            item,
            released,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        let current = self.existing_item(cmd.line_no)?;
        if self.items.len() == 1 {
            return Err(DomainError::validation("order must keep at least one item"));
        }

        Ok(vec![OrderEvent::ItemRemoved(ItemRemoved {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            released: current.assigned_assets.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_assignment(&self, cmd: &SetItemAssignment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        self.ensure_modifiable()?;

        let current = self.existing_item(cmd.line_no)?;
        let candidate = OrderItem {
            assigned_assets: cmd.assets.clone(),
            auto_assigned: cmd.auto_assigned,
            ..current.clone()
        };
        candidate.validate()?;
        self.ensure_not_held_elsewhere(cmd.line_no, &cmd.assets)?;

        let released: Vec<AssetId> = current
            .assigned_assets
            .iter()
            .filter(|a| !cmd.assets.contains(a))
            .copied()
            .collect();

        Ok(vec![OrderEvent::ItemAssignmentSet(ItemAssignmentSet {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            assets: cmd.assets.clone(),
            auto_assigned: cmd.auto_assigned,
            released,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_stage(&self, cmd: &RecordFulfillmentStage) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.order_id)?;
        if cmd.stage.trim().is_empty() {
            return Err(DomainError::validation("stage cannot be empty"));
        }

        Ok(vec![OrderEvent::FulfillmentStageRecorded(FulfillmentStageRecorded {
            order_id: cmd.order_id,
            kind: cmd.kind,
            stage: cmd.stage.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
