use carefleet_core::AggregateId;
use carefleet_products::{CreateProduct, Product, ProductCommand, ProductId, UpdateProductDetails};

use crate::command_dispatcher::{SharedBus, SharedDispatcher, SharedStore};
use crate::error::{ServiceError, ServiceResult};
use crate::store::{DocumentStore, FieldValue, Query};

/// Product catalog service. Units of a product are registered on the
/// [`AssetLedger`](crate::ledger::AssetLedger), which reads the SKU from here.
pub struct ProductCatalog {
    dispatcher: SharedDispatcher<Product>,
}

impl ProductCatalog {
    pub fn new(store: SharedStore<Product>, bus: SharedBus<Product>) -> Self {
        Self {
            dispatcher: SharedDispatcher::new(store, bus),
        }
    }

    pub fn store(&self) -> SharedStore<Product> {
        self.dispatcher.store().clone()
    }

    pub fn create_product(
        &self,
        sku: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        default_rate: u64,
    ) -> ServiceResult<Product> {
        let sku = sku.into();
        if !self
            .dispatcher
            .store()
            .query(&Query::new().eq("sku", FieldValue::str(&sku)))?
            .is_empty()
        {
            return Err(ServiceError::Conflict(format!("sku {sku} already in use")));
        }

        let product_id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id,
            sku,
            name: name.into(),
            category: category.into(),
            default_rate,
            occurred_at: self.dispatcher.store().server_timestamp(),
        });
        let out = self
            .dispatcher
            .dispatch(product_id.0, &cmd, || Product::empty(product_id))?;
        tracing::info!(product_id = %product_id, sku = out.document.sku(), "product created");
        Ok(out.document)
    }

    pub fn update_details(
        &self,
        product_id: ProductId,
        name: Option<String>,
        category: Option<String>,
        default_rate: Option<u64>,
    ) -> ServiceResult<Product> {
        let cmd = ProductCommand::UpdateProductDetails(UpdateProductDetails {
            product_id,
            name,
            category,
            default_rate,
            occurred_at: self.dispatcher.store().server_timestamp(),
        });
        let out = self
            .dispatcher
            .dispatch(product_id.0, &cmd, || Product::empty(product_id))?;
        Ok(out.document)
    }

    pub fn get(&self, product_id: ProductId) -> ServiceResult<Option<Product>> {
        Ok(self.dispatcher.store().get(product_id.0)?)
    }

    pub fn require(&self, product_id: ProductId) -> ServiceResult<Product> {
        self.get(product_id)?
            .ok_or_else(|| ServiceError::not_found(format!("product {product_id}")))
    }
}
