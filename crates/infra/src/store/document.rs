use chrono::{DateTime, Utc};

use carefleet_core::AggregateId;

/// Scalar value of a queryable document field.
///
/// Only equality filters and a single ordering are supported, so the value
/// set is deliberately small. Optional fields that are unset report `Null`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    Null,
    Int(i64),
    Str(String),
    Time(DateTime<Utc>),
}

impl FieldValue {
    pub fn str(value: impl ToString) -> Self {
        FieldValue::Str(value.to_string())
    }

    /// `Str` for `Some`, `Null` for `None`.
    pub fn opt<T: ToString>(value: Option<T>) -> Self {
        value.map(FieldValue::str).unwrap_or(FieldValue::Null)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Time(value)
    }
}

impl From<Option<DateTime<Utc>>> for FieldValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map(FieldValue::Time).unwrap_or(FieldValue::Null)
    }
}

/// A record the store can hold.
pub trait Document: Clone + Send + Sync + 'static {
    /// Collection name, also used as the change-feed aggregate type.
    const COLLECTION: &'static str;

    fn key(&self) -> AggregateId;

    /// Monotonic revision checked by `ExpectedVersion::Exact`.
    fn revision(&self) -> u64;

    /// Value of a named field, `None` if the document has no such field.
    fn field(&self, name: &str) -> Option<FieldValue>;
}
