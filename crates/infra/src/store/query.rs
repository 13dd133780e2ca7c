//! Query description: equality filters on named fields plus one ordering.

use crate::store::document::{Document, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<(String, FieldValue)>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    /// Adds the filter only when `value` is present.
    pub fn eq_opt(self, field: impl Into<String>, value: Option<FieldValue>) -> Self {
        match value {
            Some(v) => self.eq(field, v),
            None => self,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn matches<D: Document>(&self, doc: &D) -> bool {
        self.filters
            .iter()
            .all(|(name, expected)| doc.field(name).as_ref() == Some(expected))
    }

    /// Sort `docs` by the ordering field, ties broken by document key so the
    /// result is stable across calls.
    pub fn sort<D: Document>(&self, docs: &mut [D]) {
        let Some(order) = &self.order_by else {
            docs.sort_by_key(|d| d.key());
            return;
        };
        docs.sort_by(|a, b| {
            let va = a.field(&order.field).unwrap_or(FieldValue::Null);
            let vb = b.field(&order.field).unwrap_or(FieldValue::Null);
            let by_field = match order.direction {
                Direction::Asc => va.cmp(&vb),
                Direction::Desc => vb.cmp(&va),
            };
            by_field.then_with(|| match order.direction {
                Direction::Asc => a.key().cmp(&b.key()),
                Direction::Desc => b.key().cmp(&a.key()),
            })
        });
    }
}
