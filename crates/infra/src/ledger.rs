//! Asset ledger service.
//!
//! The ledger is the only writer of asset documents. Every status change,
//! checkout, checkin and move goes through [`AssetLedger`], which stamps the
//! store's server time and records exactly one history entry per change.
//! Multi-asset operations return a [`BatchOutcome`] instead of failing as a
//! whole.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use carefleet_assets::{
    Asset, AssetCommand, AssetId, AssetStatus, Checkin, Checkout, MoveAsset, RegisterAsset,
    RentalLink, SetStatus, StatusExtra,
};
use carefleet_core::{Actor, AggregateId, BranchId};
use carefleet_events::{ChangeEnvelope, EventBus, Subscription};
use carefleet_products::{Product, ProductId};

use crate::batch::BatchOutcome;
use crate::command_dispatcher::{SharedBus, SharedDispatcher, SharedStore};
use crate::config::EngineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{Direction, DocumentStore, FieldValue, Query};

/// Request for [`AssetLedger::create_units`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateUnits {
    pub product_id: ProductId,
    pub quantity: u32,
    pub branch_id: Option<BranchId>,
    pub metadata: Map<String, JsonValue>,
    pub initial_status: AssetStatus,
    pub rental: Option<RentalLink>,
}

impl CreateUnits {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            branch_id: None,
            metadata: Map::new(),
            initial_status: AssetStatus::InStock,
            rental: None,
        }
    }

    pub fn at_branch(mut self, branch_id: BranchId) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, JsonValue>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_status(mut self, status: AssetStatus, rental: Option<RentalLink>) -> Self {
        self.initial_status = status;
        self.rental = rental;
        self
    }
}

/// Optional equality filters over the asset collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetFilter {
    pub product_id: Option<ProductId>,
    pub branch_id: Option<BranchId>,
    pub status: Option<AssetStatus>,
}

impl AssetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn branch(mut self, branch_id: BranchId) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn status(mut self, status: AssetStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        self.product_id.is_none_or(|p| asset.product_id() == Some(p))
            && self.branch_id.is_none_or(|b| asset.branch_id() == Some(b))
            && self.status.is_none_or(|s| asset.status() == s)
    }

    pub(crate) fn to_query(self) -> Query {
        Query::new()
            .eq_opt("product_id", self.product_id.map(FieldValue::str))
            .eq_opt("branch_id", self.branch_id.map(FieldValue::str))
            .eq_opt("status", self.status.map(FieldValue::str))
    }
}

/// Checkin details shared by single and batch checkins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckinDetails {
    pub note: Option<String>,
    pub condition: Option<String>,
}

impl CheckinDetails {
    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

pub struct AssetLedger {
    dispatcher: SharedDispatcher<Asset>,
    products: SharedStore<Product>,
    code_attempts: u32,
}

impl AssetLedger {
    pub fn new(
        store: SharedStore<Asset>,
        bus: SharedBus<Asset>,
        products: SharedStore<Product>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            dispatcher: SharedDispatcher::new(store, bus).with_write_retries(config.write_retries),
            products,
            code_attempts: config.code_attempts.max(1),
        }
    }

    /// Register `quantity` new units of a product, one document each.
    ///
    /// Codes are `<SKU>-<10 hex>`, checked against existing codes. Units are
    /// written one at a time; earlier units stay if a later one fails.
    pub fn create_units(&self, request: CreateUnits, actor: &Actor) -> ServiceResult<BatchOutcome<Asset>> {
        if request.quantity < 1 {
            return Err(ServiceError::validation("quantity must be at least 1"));
        }
        if request.initial_status.requires_rental() != request.rental.is_some() {
            return Err(ServiceError::validation(format!(
                "status {} {} a rental link",
                request.initial_status,
                if request.rental.is_some() { "does not take" } else { "requires" }
            )));
        }
        let product = self
            .products
            .get(request.product_id.0)?
            .ok_or_else(|| ServiceError::not_found(format!("product {}", request.product_id)))?;

        let mut outcome = BatchOutcome::new();
        for _ in 0..request.quantity {
            let asset_id = AssetId::new(AggregateId::new());
            match self.register_unit(asset_id, &product, &request, actor) {
                Ok(asset) => outcome.succeed(asset),
                Err(e) => outcome.fail(asset_id, e),
            }
        }

        tracing::info!(
            product_id = %request.product_id,
            created = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "asset units registered"
        );
        outcome.into_result("create_units")
    }

    fn register_unit(
        &self,
        asset_id: AssetId,
        product: &Product,
        request: &CreateUnits,
        actor: &Actor,
    ) -> ServiceResult<Asset> {
        let code = self.allocate_code(product.sku())?;
        let cmd = AssetCommand::RegisterAsset(RegisterAsset {
            asset_id,
            code,
            product_id: request.product_id,
            branch_id: request.branch_id,
            metadata: request.metadata.clone(),
            initial_status: request.initial_status,
            rental: request.rental.clone(),
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        Ok(self.dispatch(asset_id, &cmd)?)
    }

    fn allocate_code(&self, sku: &str) -> ServiceResult<String> {
        for _ in 0..self.code_attempts {
            let hex = Uuid::now_v7().simple().to_string();
            let code = format!("{sku}-{}", hex[hex.len() - 10..].to_uppercase());
            let taken = self
                .dispatcher
                .store()
                .query(&Query::new().eq("code", FieldValue::str(&code)))?;
            if taken.is_empty() {
                return Ok(code);
            }
            tracing::debug!(%code, "asset code collision; drawing again");
        }
        Err(ServiceError::Conflict(format!(
            "no unused asset code for {sku} after {} attempts",
            self.code_attempts
        )))
    }

    /// Unconditional status change.
    pub fn set_status(
        &self,
        asset_id: AssetId,
        status: AssetStatus,
        note: Option<String>,
        extra: StatusExtra,
        actor: &Actor,
    ) -> ServiceResult<Asset> {
        self.change_status(asset_id, None, status, note, extra, actor)
    }

    /// Status change that only applies while the stored status is still
    /// `expected`; otherwise `Conflict` and nothing is written.
    pub fn set_status_if(
        &self,
        asset_id: AssetId,
        expected: AssetStatus,
        status: AssetStatus,
        note: Option<String>,
        extra: StatusExtra,
        actor: &Actor,
    ) -> ServiceResult<Asset> {
        self.change_status(asset_id, Some(expected), status, note, extra, actor)
    }

    fn change_status(
        &self,
        asset_id: AssetId,
        expected: Option<AssetStatus>,
        status: AssetStatus,
        note: Option<String>,
        extra: StatusExtra,
        actor: &Actor,
    ) -> ServiceResult<Asset> {
        let cmd = AssetCommand::SetStatus(SetStatus {
            asset_id,
            expected,
            status,
            note,
            extra,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let asset = self.dispatch(asset_id, &cmd)?;
        tracing::info!(asset_id = %asset_id, code = asset.code(), status = %asset.status(), "asset status set");
        Ok(asset)
    }

    pub fn checkout(
        &self,
        asset_id: AssetId,
        rental: RentalLink,
        note: Option<String>,
        actor: &Actor,
    ) -> ServiceResult<Asset> {
        let cmd = AssetCommand::Checkout(Checkout {
            asset_id,
            rental,
            note,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let asset = self.dispatch(asset_id, &cmd)?;
        tracing::info!(asset_id = %asset_id, code = asset.code(), "asset checked out");
        Ok(asset)
    }

    /// Return a unit to `in_stock` and clear its rental link. Checking in a
    /// unit that is already in stock still records an entry.
    pub fn checkin(&self, asset_id: AssetId, details: CheckinDetails, actor: &Actor) -> ServiceResult<Asset> {
        let cmd = AssetCommand::Checkin(Checkin {
            asset_id,
            note: details.note,
            condition: details.condition,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let asset = self.dispatch(asset_id, &cmd)?;
        tracing::info!(asset_id = %asset_id, code = asset.code(), "asset checked in");
        Ok(asset)
    }

    pub fn move_asset(
        &self,
        asset_id: AssetId,
        to_branch: BranchId,
        note: Option<String>,
        actor: &Actor,
    ) -> ServiceResult<Asset> {
        let cmd = AssetCommand::MoveAsset(MoveAsset {
            asset_id,
            to_branch,
            note,
            actor: actor.clone(),
            occurred_at: self.now(),
        });
        let asset = self.dispatch(asset_id, &cmd)?;
        tracing::info!(asset_id = %asset_id, to_branch = %to_branch, "asset moved");
        Ok(asset)
    }

    pub fn set_status_many(
        &self,
        asset_ids: &[AssetId],
        status: AssetStatus,
        note: Option<String>,
        extra: StatusExtra,
        actor: &Actor,
    ) -> ServiceResult<BatchOutcome> {
        let mut outcome = BatchOutcome::new();
        for &asset_id in asset_ids {
            match self.set_status(asset_id, status, note.clone(), extra.clone(), actor) {
                Ok(_) => outcome.succeed(asset_id),
                Err(e) => outcome.fail(asset_id, e),
            }
        }
        outcome.into_result("set_status_many")
    }

    pub fn checkin_many(
        &self,
        asset_ids: &[AssetId],
        details: CheckinDetails,
        actor: &Actor,
    ) -> ServiceResult<BatchOutcome> {
        let mut outcome = BatchOutcome::new();
        for &asset_id in asset_ids {
            match self.checkin(asset_id, details.clone(), actor) {
                Ok(_) => outcome.succeed(asset_id),
                Err(e) => outcome.fail(asset_id, e),
            }
        }
        outcome.into_result("checkin_many")
    }

    pub fn get(&self, asset_id: AssetId) -> ServiceResult<Option<Asset>> {
        Ok(self.dispatcher.store().get(asset_id.0)?)
    }

    pub fn require(&self, asset_id: AssetId) -> ServiceResult<Asset> {
        self.get(asset_id)?
            .ok_or_else(|| ServiceError::not_found(format!("asset {asset_id}")))
    }

    /// Matching units, newest first.
    pub fn query(&self, filter: AssetFilter) -> ServiceResult<Vec<Asset>> {
        let query = filter.to_query().order_by("created_at", Direction::Desc);
        Ok(self.dispatcher.store().query(&query)?)
    }

    /// Matching units in an explicit order.
    pub(crate) fn query_ordered(&self, filter: AssetFilter, direction: Direction) -> ServiceResult<Vec<Asset>> {
        let query = filter.to_query().order_by("created_at", direction);
        Ok(self.dispatcher.store().query(&query)?)
    }

    /// Live view of matching units: `callback` receives each post-write
    /// snapshot. Dropping the handle stops delivery.
    pub fn subscribe(
        &self,
        filter: AssetFilter,
        callback: impl Fn(&Asset) + Send + Sync + 'static,
    ) -> Subscription {
        self.dispatcher.bus().subscribe(
            Arc::new(move |env: &ChangeEnvelope<Asset>| filter.matches(env.document())),
            Arc::new(move |env: &ChangeEnvelope<Asset>| callback(env.document())),
        )
    }

    fn dispatch(&self, asset_id: AssetId, cmd: &AssetCommand) -> ServiceResult<Asset> {
        let out = self
            .dispatcher
            .dispatch(asset_id.0, cmd, || Asset::empty(asset_id))?;
        Ok(out.document)
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.dispatcher.store().server_timestamp()
    }
}
