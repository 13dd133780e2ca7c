use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use carefleet_core::{Actor, Aggregate, AggregateId, AggregateRoot, BranchId, DomainError};
use carefleet_events::Event;
use carefleet_products::ProductId;

use crate::history::{HistoryEntry, HistoryKind};
use crate::status::{AssetStatus, RentalLink};

/// Asset identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub AggregateId);

impl AssetId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AssetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Asset (one physical rental unit).
///
/// Invariants upheld by `handle`:
/// - `Reserved`/`OutForRental` always carry a rental link, `InStock`/`Maintenance`
///   never do.
/// - `history.len() == version()`: every applied event appends one entry.
/// - `product_id` never changes after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    id: AssetId,
    code: String,
    product_id: Option<ProductId>,
    branch_id: Option<BranchId>,
    status: AssetStatus,
    rental: Option<RentalLink>,
    metadata: Map<String, JsonValue>,
    history: Vec<HistoryEntry>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Asset {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: AssetId) -> Self {
        Self {
            id,
            code: String::new(),
            product_id: None,
            branch_id: None,
            status: AssetStatus::InStock,
            rental: None,
            metadata: Map::new(),
            history: Vec::new(),
            created_at: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> AssetId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// `None` only before registration.
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn status(&self) -> AssetStatus {
        self.status
    }

    pub fn rental(&self) -> Option<&RentalLink> {
        self.rental.as_ref()
    }

    pub fn metadata(&self) -> &Map<String, JsonValue> {
        &self.metadata
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_registered(&self) -> bool {
        self.product_id.is_some()
    }

    /// Status and rental link agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.status.requires_rental() == self.rental.is_some()
    }
}

impl AggregateRoot for Asset {
    type Id = AssetId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterAsset (stock intake of one unit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAsset {
    pub asset_id: AssetId,
    pub code: String,
    pub product_id: ProductId,
    pub branch_id: Option<BranchId>,
    pub metadata: Map<String, JsonValue>,
    pub initial_status: AssetStatus,
    pub rental: Option<RentalLink>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Transition-specific extras for [`SetStatus`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusExtra {
    /// Rental link for `Reserved`/`OutForRental`. When absent, an existing
    /// link is carried over.
    pub rental: Option<RentalLink>,
    /// Free-form details recorded on the history entry.
    pub data: JsonValue,
}

impl StatusExtra {
    pub fn with_rental(rental: RentalLink) -> Self {
        Self {
            rental: Some(rental),
            data: JsonValue::Null,
        }
    }
}

/// Command: SetStatus.
///
/// Any status may follow any other. With `expected` set, the command becomes a
/// compare-and-swap and fails with `Conflict` when the current status differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStatus {
    pub asset_id: AssetId,
    pub expected: Option<AssetStatus>,
    pub status: AssetStatus,
    pub note: Option<String>,
    pub extra: StatusExtra,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Checkout (physically handed to a customer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkout {
    pub asset_id: AssetId,
    pub rental: RentalLink,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Checkin (returned to stock). Re-checkin is allowed and logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkin {
    pub asset_id: AssetId,
    pub note: Option<String>,
    pub condition: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MoveAsset (branch change; status untouched).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveAsset {
    pub asset_id: AssetId,
    pub to_branch: BranchId,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssetCommand {
    RegisterAsset(RegisterAsset),
    SetStatus(SetStatus),
    Checkout(Checkout),
    Checkin(Checkin),
    MoveAsset(MoveAsset),
}

/// Event: AssetRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRegistered {
    pub asset_id: AssetId,
    pub code: String,
    pub product_id: ProductId,
    pub branch_id: Option<BranchId>,
    pub metadata: Map<String, JsonValue>,
    pub status: AssetStatus,
    pub rental: Option<RentalLink>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AssetStatusChanged. `rental` is the resulting link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatusChanged {
    pub asset_id: AssetId,
    pub from: AssetStatus,
    pub to: AssetStatus,
    pub rental: Option<RentalLink>,
    pub note: Option<String>,
    pub data: JsonValue,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AssetCheckedOut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCheckedOut {
    pub asset_id: AssetId,
    pub from: AssetStatus,
    pub rental: RentalLink,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AssetCheckedIn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCheckedIn {
    pub asset_id: AssetId,
    pub from: AssetStatus,
    pub released_rental: Option<RentalLink>,
    pub note: Option<String>,
    pub condition: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AssetMoved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMoved {
    pub asset_id: AssetId,
    pub from_branch: Option<BranchId>,
    pub to_branch: BranchId,
    pub note: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssetEvent {
    AssetRegistered(AssetRegistered),
    AssetStatusChanged(AssetStatusChanged),
    AssetCheckedOut(AssetCheckedOut),
    AssetCheckedIn(AssetCheckedIn),
    AssetMoved(AssetMoved),
}

impl Event for AssetEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AssetEvent::AssetRegistered(_) => "assets.asset.registered",
            AssetEvent::AssetStatusChanged(_) => "assets.asset.status_changed",
            AssetEvent::AssetCheckedOut(_) => "assets.asset.checked_out",
            AssetEvent::AssetCheckedIn(_) => "assets.asset.checked_in",
            AssetEvent::AssetMoved(_) => "assets.asset.moved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AssetEvent::AssetRegistered(e) => e.occurred_at,
            AssetEvent::AssetStatusChanged(e) => e.occurred_at,
            AssetEvent::AssetCheckedOut(e) => e.occurred_at,
            AssetEvent::AssetCheckedIn(e) => e.occurred_at,
            AssetEvent::AssetMoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Asset {
    type Command = AssetCommand;
    type Event = AssetEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let entry = match event {
            AssetEvent::AssetRegistered(e) => {
                self.id = e.asset_id;
                self.code = e.code.clone();
                self.product_id = Some(e.product_id);
                self.branch_id = e.branch_id;
                self.metadata = e.metadata.clone();
                self.status = e.status;
                self.rental = e.rental.clone();
                self.created_at = Some(e.occurred_at);
                HistoryEntry::new(
                    e.occurred_at,
                    &e.actor,
                    HistoryKind::Create,
                    None,
                    json!({ "status": e.status, "branch_id": e.branch_id, "code": e.code }),
                )
            }
            AssetEvent::AssetStatusChanged(e) => {
                self.status = e.to;
                self.rental = e.rental.clone();
                HistoryEntry::new(
                    e.occurred_at,
                    &e.actor,
                    HistoryKind::Status,
                    e.note.clone(),
                    json!({ "from": e.from, "to": e.to, "rental": e.rental, "extra": e.data }),
                )
            }
            AssetEvent::AssetCheckedOut(e) => {
                self.status = AssetStatus::OutForRental;
                self.rental = Some(e.rental.clone());
                HistoryEntry::new(
                    e.occurred_at,
                    &e.actor,
                    HistoryKind::Checkout,
                    e.note.clone(),
                    json!({ "from": e.from, "rental": e.rental }),
                )
            }
            AssetEvent::AssetCheckedIn(e) => {
                self.status = AssetStatus::InStock;
                self.rental = None;
                HistoryEntry::new(
                    e.occurred_at,
                    &e.actor,
                    HistoryKind::Checkin,
                    e.note.clone(),
                    json!({
                        "from": e.from,
                        "condition": e.condition,
                        "released_rental": e.released_rental,
                    }),
                )
            }
            AssetEvent::AssetMoved(e) => {
                self.branch_id = Some(e.to_branch);
                HistoryEntry::new(
                    e.occurred_at,
                    &e.actor,
                    HistoryKind::Move,
                    e.note.clone(),
                    json!({ "from_branch": e.from_branch, "to_branch": e.to_branch }),
                )
            }
        };

        self.history.push(entry);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AssetCommand::RegisterAsset(cmd) => self.handle_register(cmd),
            AssetCommand::SetStatus(cmd) => self.handle_set_status(cmd),
            AssetCommand::Checkout(cmd) => self.handle_checkout(cmd),
            AssetCommand::Checkin(cmd) => self.handle_checkin(cmd),
            AssetCommand::MoveAsset(cmd) => self.handle_move(cmd),
        }
    }
}

impl Asset {
    fn ensure_registered(&self, asset_id: AssetId) -> Result<(), DomainError> {
        if !self.is_registered() {
            return Err(DomainError::not_found(format!("asset {asset_id}")));
        }
        if self.id != asset_id {
            return Err(DomainError::invariant("asset_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterAsset) -> Result<Vec<AssetEvent>, DomainError> {
        if self.is_registered() {
            return Err(DomainError::conflict("asset already registered"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("asset code cannot be empty"));
        }
        check_rental_consistency(cmd.initial_status, cmd.rental.as_ref())?;

        Ok(vec![AssetEvent::AssetRegistered(AssetRegistered {
            asset_id: cmd.asset_id,
            code: cmd.code.trim().to_string(),
            product_id: cmd.product_id,
            branch_id: cmd.branch_id,
            metadata: cmd.metadata.clone(),
            status: cmd.initial_status,
            rental: cmd.rental.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_status(&self, cmd: &SetStatus) -> Result<Vec<AssetEvent>, DomainError> {
        self.ensure_registered(cmd.asset_id)?;

        if let Some(expected) = cmd.expected {
            if expected != self.status {
                return Err(DomainError::conflict(format!(
                    "asset {} is {} (expected {})",
                    self.code, self.status, expected
                )));
            }
        }

        let rental = if cmd.status.requires_rental() {
            let link = cmd.extra.rental.clone().or_else(|| self.rental.clone());
            check_rental_consistency(cmd.status, link.as_ref())?;
            link
        } else {
            check_rental_consistency(cmd.status, cmd.extra.rental.as_ref())?;
            None
        };

        Ok(vec![AssetEvent::AssetStatusChanged(AssetStatusChanged {
            asset_id: cmd.asset_id,
            from: self.status,
            to: cmd.status,
            rental,
            note: cmd.note.clone(),
            data: cmd.extra.data.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_checkout(&self, cmd: &Checkout) -> Result<Vec<AssetEvent>, DomainError> {
        self.ensure_registered(cmd.asset_id)?;
        check_rental_consistency(AssetStatus::OutForRental, Some(&cmd.rental))?;

        Ok(vec![AssetEvent::AssetCheckedOut(AssetCheckedOut {
            asset_id: cmd.asset_id,
            from: self.status,
            rental: cmd.rental.clone(),
            note: cmd.note.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_checkin(&self, cmd: &Checkin) -> Result<Vec<AssetEvent>, DomainError> {
        self.ensure_registered(cmd.asset_id)?;

        Ok(vec![AssetEvent::AssetCheckedIn(AssetCheckedIn {
            asset_id: cmd.asset_id,
            from: self.status,
            released_rental: self.rental.clone(),
            note: cmd.note.clone(),
            condition: cmd.condition.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_move(&self, cmd: &MoveAsset) -> Result<Vec<AssetEvent>, DomainError> {
        self.ensure_registered(cmd.asset_id)?;

        Ok(vec![AssetEvent::AssetMoved(AssetMoved {
            asset_id: cmd.asset_id,
            from_branch: self.branch_id,
            to_branch: cmd.to_branch,
            note: cmd.note.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn check_rental_consistency(
    status: AssetStatus,
    rental: Option<&RentalLink>,
) -> Result<(), DomainError> {
    match (status.requires_rental(), rental) {
        (true, None) => Err(DomainError::validation(format!(
            "status {status} requires a rental link"
        ))),
        (true, Some(link)) if link.rental_id.trim().is_empty() => {
            Err(DomainError::validation("rental_id cannot be empty"))
        }
        (false, Some(_)) => Err(DomainError::validation(format!(
            "status {status} cannot carry a rental link"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_asset_id() -> AssetId {
        AssetId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn link() -> RentalLink {
        RentalLink::new("ORD-1", "R. Iyer")
    }

    fn registered(asset_id: AssetId) -> Asset {
        let mut asset = Asset::empty(asset_id);
        asset
            .execute(&AssetCommand::RegisterAsset(RegisterAsset {
                asset_id,
                code: "BED-0001".to_string(),
                product_id: test_product_id(),
                branch_id: Some(BranchId::new()),
                metadata: Map::new(),
                initial_status: AssetStatus::InStock,
                rental: None,
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        asset
    }

    fn set_status(asset_id: AssetId, status: AssetStatus, extra: StatusExtra) -> AssetCommand {
        AssetCommand::SetStatus(SetStatus {
            asset_id,
            expected: None,
            status,
            note: None,
            extra,
            actor: Actor::system(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn register_writes_single_create_entry() {
        let asset = registered(test_asset_id());
        assert_eq!(asset.status(), AssetStatus::InStock);
        assert_eq!(asset.history().len(), 1);
        assert_eq!(asset.history()[0].kind, HistoryKind::Create);
        assert_eq!(asset.history()[0].by, "system");
        assert_eq!(asset.version(), 1);
    }

    #[test]
    fn register_reserved_without_link_is_rejected() {
        let asset_id = test_asset_id();
        let err = Asset::empty(asset_id)
            .handle(&AssetCommand::RegisterAsset(RegisterAsset {
                asset_id,
                code: "BED-0002".to_string(),
                product_id: test_product_id(),
                branch_id: None,
                metadata: Map::new(),
                initial_status: AssetStatus::Reserved,
                rental: None,
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn commands_on_unknown_asset_are_not_found() {
        let asset_id = test_asset_id();
        let err = Asset::empty(asset_id)
            .handle(&AssetCommand::Checkout(Checkout {
                asset_id,
                rental: link(),
                note: None,
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn reserve_requires_link_and_keeps_existing_one() {
        let asset_id = test_asset_id();
        let mut asset = registered(asset_id);

        let err = asset
            .handle(&set_status(asset_id, AssetStatus::Reserved, StatusExtra::default()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        asset
            .execute(&set_status(asset_id, AssetStatus::Reserved, StatusExtra::with_rental(link())))
            .unwrap();
        asset
            .execute(&set_status(asset_id, AssetStatus::OutForRental, StatusExtra::default()))
            .unwrap();

        assert_eq!(asset.status(), AssetStatus::OutForRental);
        assert_eq!(asset.rental(), Some(&link()));
        assert!(asset.is_consistent());
    }

    #[test]
    fn maintenance_clears_rental_link() {
        let asset_id = test_asset_id();
        let mut asset = registered(asset_id);
        asset
            .execute(&set_status(asset_id, AssetStatus::Reserved, StatusExtra::with_rental(link())))
            .unwrap();
        asset
            .execute(&set_status(asset_id, AssetStatus::Maintenance, StatusExtra::default()))
            .unwrap();

        assert_eq!(asset.rental(), None);
        assert!(asset.is_consistent());
    }

    #[test]
    fn compare_and_swap_rejects_unexpected_status() {
        let asset_id = test_asset_id();
        let mut asset = registered(asset_id);
        asset
            .execute(&set_status(asset_id, AssetStatus::Maintenance, StatusExtra::default()))
            .unwrap();

        let err = asset
            .handle(&AssetCommand::SetStatus(SetStatus {
                asset_id,
                expected: Some(AssetStatus::InStock),
                status: AssetStatus::Reserved,
                note: None,
                extra: StatusExtra::with_rental(link()),
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn checkin_of_in_stock_asset_is_logged_not_rejected() {
        let asset_id = test_asset_id();
        let mut asset = registered(asset_id);
        let checkin = AssetCommand::Checkin(Checkin {
            asset_id,
            note: Some("recount".to_string()),
            condition: Some("good".to_string()),
            actor: Actor::new("u7", "Store keeper"),
            occurred_at: Utc::now(),
        });

        asset.execute(&checkin).unwrap();
        asset.execute(&checkin).unwrap();

        assert_eq!(asset.status(), AssetStatus::InStock);
        assert_eq!(asset.rental(), None);
        assert_eq!(asset.history().len(), 3);
        assert_eq!(asset.history()[2].kind, HistoryKind::Checkin);
        assert_eq!(asset.history()[2].by_name, "Store keeper");
    }

    #[test]
    fn move_changes_branch_only() {
        let asset_id = test_asset_id();
        let mut asset = registered(asset_id);
        asset
            .execute(&AssetCommand::Checkout(Checkout {
                asset_id,
                rental: link(),
                note: None,
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        let to = BranchId::new();
        asset
            .execute(&AssetCommand::MoveAsset(MoveAsset {
                asset_id,
                to_branch: to,
                note: Some("transfer".to_string()),
                actor: Actor::system(),
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(asset.branch_id(), Some(to));
        assert_eq!(asset.status(), AssetStatus::OutForRental);
        assert_eq!(asset.history().last().unwrap().kind, HistoryKind::Move);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn status_strategy() -> impl Strategy<Value = AssetStatus> {
            prop::sample::select(AssetStatus::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: every accepted transition adds exactly one history entry
            /// and leaves status and rental link consistent.
            #[test]
            fn each_transition_appends_one_entry(
                steps in prop::collection::vec((status_strategy(), any::<bool>()), 1..30)
            ) {
                let asset_id = test_asset_id();
                let mut asset = registered(asset_id);

                for (status, with_link) in steps {
                    let extra = if with_link { StatusExtra::with_rental(link()) } else { StatusExtra::default() };
                    let before = asset.history().len();
                    match asset.execute(&set_status(asset_id, status, extra)) {
                        Ok(_) => prop_assert_eq!(asset.history().len(), before + 1),
                        Err(_) => prop_assert_eq!(asset.history().len(), before),
                    }
                    prop_assert!(asset.is_consistent());
                    prop_assert_eq!(asset.history().len() as u64, asset.version());
                }
            }
        }
    }
}
