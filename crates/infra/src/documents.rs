//! Store mappings for the domain aggregates.
//!
//! Field names here are the only names usable in [`Query`](crate::store::Query)
//! filters and orderings.

use carefleet_assets::Asset;
use carefleet_core::{AggregateId, AggregateRoot};
use carefleet_fulfillment::{Fulfillment, Stage};
use carefleet_orders::{FulfillmentKind, Order};
use carefleet_products::Product;

use crate::store::{Document, FieldValue};

impl Document for Product {
    const COLLECTION: &'static str = "products";

    fn key(&self) -> AggregateId {
        self.id_typed().0
    }

    fn revision(&self) -> u64 {
        self.version()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "sku" => Some(FieldValue::str(self.sku())),
            "category" => Some(FieldValue::str(self.category())),
            _ => None,
        }
    }
}

impl Document for Asset {
    const COLLECTION: &'static str = "assets";

    fn key(&self) -> AggregateId {
        self.id_typed().0
    }

    fn revision(&self) -> u64 {
        self.version()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "code" => Some(FieldValue::str(self.code())),
            "product_id" => Some(FieldValue::opt(self.product_id())),
            "branch_id" => Some(FieldValue::opt(self.branch_id())),
            "status" => Some(FieldValue::str(self.status())),
            "rental_id" => Some(FieldValue::opt(self.rental().map(|r| &r.rental_id))),
            "created_at" => Some(self.created_at().into()),
            _ => None,
        }
    }
}

impl Document for Order {
    const COLLECTION: &'static str = "orders";

    fn key(&self) -> AggregateId {
        self.id_typed().0
    }

    fn revision(&self) -> u64 {
        self.version()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "order_number" => Some(FieldValue::str(self.order_number())),
            "status" => Some(FieldValue::str(self.status())),
            "upstream_ref" => Some(FieldValue::opt(self.upstream_ref())),
            "created_at" => Some(self.created_at().into()),
            _ => None,
        }
    }
}

const fn fulfillment_collection(kind: FulfillmentKind) -> &'static str {
    match kind {
        FulfillmentKind::Delivery => "deliveries",
        FulfillmentKind::Pickup => "pickups",
    }
}

impl<S: Stage> Document for Fulfillment<S> {
    const COLLECTION: &'static str = fulfillment_collection(S::KIND);

    fn key(&self) -> AggregateId {
        self.id_typed().0
    }

    fn revision(&self) -> u64 {
        self.version()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "order_id" => Some(FieldValue::opt(self.order_id())),
            "stage" => Some(FieldValue::str(self.stage())),
            "driver" => Some(FieldValue::opt(self.driver())),
            "created_at" => Some(self.created_at().into()),
            _ => None,
        }
    }
}
