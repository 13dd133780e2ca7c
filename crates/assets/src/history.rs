use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use carefleet_core::Actor;

/// Kind of ledger operation recorded in an asset's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Create,
    Status,
    Checkout,
    Checkin,
    Move,
}

/// One append-only history entry. Exactly one is written per applied event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub by: String,
    pub by_name: String,
    pub kind: HistoryKind,
    pub note: Option<String>,
    /// Transition-specific details (from/to status, branch, condition, ...).
    pub data: JsonValue,
}

impl HistoryEntry {
    pub fn new(
        at: DateTime<Utc>,
        actor: &Actor,
        kind: HistoryKind,
        note: Option<String>,
        data: JsonValue,
    ) -> Self {
        Self {
            at,
            by: actor.uid.clone(),
            by_name: actor.display_name.clone(),
            kind,
            note,
            data,
        }
    }
}
