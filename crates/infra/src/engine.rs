//! Service wiring.
//!
//! Builds every service over in-memory stores and buses. Each collection gets
//! its own store and change feed; the order store is shared between the
//! order desk (writer) and the resolver (reader).

use std::sync::Arc;

use carefleet_assets::Asset;
use carefleet_events::{ChangeEnvelope, InMemoryEventBus};
use carefleet_fulfillment::{Delivery, Pickup};
use carefleet_orders::Order;
use carefleet_products::Product;

use crate::catalog::ProductCatalog;
use crate::collaborators::{BlobStore, InMemoryBlobStore, NoopUpstream, UpstreamSink};
use crate::command_dispatcher::{SharedBus, SharedStore};
use crate::config::EngineConfig;
use crate::fulfillment::{DeliveryDesk, PickupDesk};
use crate::ledger::AssetLedger;
use crate::orders::OrderDesk;
use crate::resolver::Resolver;
use crate::store::InMemoryDocumentStore;

pub struct Engine {
    pub config: EngineConfig,
    pub catalog: Arc<ProductCatalog>,
    pub ledger: Arc<AssetLedger>,
    pub resolver: Arc<Resolver>,
    pub orders: Arc<OrderDesk>,
    pub deliveries: Arc<DeliveryDesk>,
    pub pickups: Arc<PickupDesk>,
}

fn memory_store<D>() -> SharedStore<D>
where
    D: crate::store::Document,
{
    Arc::new(InMemoryDocumentStore::<D>::new())
}

fn memory_bus<D>() -> SharedBus<D>
where
    D: Clone + Send + Sync + 'static,
{
    Arc::new(InMemoryEventBus::<ChangeEnvelope<D>>::new())
}

impl Engine {
    /// In-memory services with no upstream record and an in-memory blob store.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::in_memory_with(config, Arc::new(NoopUpstream), Arc::new(InMemoryBlobStore::new()))
    }

    pub fn in_memory_with(
        config: EngineConfig,
        upstream: Arc<dyn UpstreamSink>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let products = memory_store::<Product>();
        let orders_store = memory_store::<Order>();

        let catalog = Arc::new(ProductCatalog::new(products.clone(), memory_bus::<Product>()));
        let ledger = Arc::new(AssetLedger::new(
            memory_store::<Asset>(),
            memory_bus::<Asset>(),
            products,
            &config,
        ));
        let resolver = Arc::new(Resolver::new(ledger.clone(), orders_store.clone(), config.clone()));
        let orders = Arc::new(OrderDesk::new(
            orders_store,
            memory_bus::<Order>(),
            resolver.clone(),
            upstream.clone(),
            &config,
        ));
        let deliveries = Arc::new(DeliveryDesk::new(
            memory_store::<Delivery>(),
            memory_bus::<Delivery>(),
            orders.clone(),
            ledger.clone(),
            blobs.clone(),
            upstream.clone(),
            &config,
        ));
        let pickups = Arc::new(PickupDesk::new(
            memory_store::<Pickup>(),
            memory_bus::<Pickup>(),
            orders.clone(),
            ledger.clone(),
            blobs,
            upstream,
            &config,
        ));

        tracing::debug!(?config, "engine wired");
        Self {
            config,
            catalog,
            ledger,
            resolver,
            orders,
            deliveries,
            pickups,
        }
    }
}
