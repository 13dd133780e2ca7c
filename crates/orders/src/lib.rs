//! Rental orders domain module.
//!
//! Order status lifecycle, line items with their asset assignments, customer
//! contact and pricing. Pure domain logic: no IO, no storage. Cross-order
//! rules (an asset held by at most one live order) are enforced by the caller
//! that can see every order.

pub mod contact;
pub mod item;
pub mod order;
pub mod pricing;

pub use contact::Contact;
pub use item::{ItemChanges, NewItem, OrderItem};
pub use order::{
    AddItem, AuditEntry, ChangeStatus, CreateOrder, FulfillmentKind, FulfillmentStageRecorded,
    ItemAdded, ItemAssignmentSet, ItemRemoved, ItemUpdated, Order, OrderCommand, OrderCreated,
    OrderEvent, OrderId, OrderStatus, OrderStatusChanged, RecordFulfillmentStage, RemoveItem,
    SetItemAssignment, UpdateItem,
};
pub use pricing::{Discount, Totals};
