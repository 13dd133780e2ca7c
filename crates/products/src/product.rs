use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carefleet_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use carefleet_events::Event;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Product.
///
/// The SKU is fixed at creation because asset codes are derived from it;
/// name, category and default rate are descriptive and may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    category: String,
    /// Default rental rate in minor currency units.
    default_rate: u64,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            sku: String::new(),
            name: String::new(),
            category: String::new(),
            default_rate: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn default_rate(&self) -> u64 {
        self.default_rate
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub default_rate: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub default_rate: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: String,
    pub default_rate: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated (carries the full resulting details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
    pub default_rate: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "products.product.details_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.default_rate = e.default_rate;
                self.created = true;
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.default_rate = e.default_rate;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductDetails(cmd) => self.handle_update(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            sku: cmd.sku.trim().to_string(),
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            default_rate: cmd.default_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProductDetails) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("product {}", cmd.product_id)));
        }
        self.ensure_product_id(cmd.product_id)?;

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let category = cmd
            .category
            .as_ref()
            .map(|c| c.trim().to_string())
            .unwrap_or_else(|| self.category.clone());
        let default_rate = cmd.default_rate.unwrap_or(self.default_rate);

        if name == self.name && category == self.category && default_rate == self.default_rate {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
            product_id: cmd.product_id,
            name,
            category,
            default_rate,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn created(product_id: ProductId) -> Product {
        let mut product = Product::empty(product_id);
        product
            .execute(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                sku: "BED-SF".to_string(),
                name: "Semi-fowler bed".to_string(),
                category: "beds".to_string(),
                default_rate: 4_500_00,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        product
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                sku: " BED-SF ".to_string(),
                name: "Semi-fowler bed".to_string(),
                category: "beds".to_string(),
                default_rate: 100,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.sku, "BED-SF");
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_rejects_empty_sku() {
        let product_id = test_product_id();
        let err = Product::empty(product_id)
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                sku: "  ".to_string(),
                name: "Monitor".to_string(),
                category: String::new(),
                default_rate: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_twice_is_a_conflict() {
        let product_id = test_product_id();
        let product = created(product_id);
        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                sku: "X".to_string(),
                name: "X".to_string(),
                category: String::new(),
                default_rate: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_changes_descriptive_fields_but_not_sku() {
        let product_id = test_product_id();
        let mut product = created(product_id);

        product
            .execute(&ProductCommand::UpdateProductDetails(UpdateProductDetails {
                product_id,
                name: Some("Semi-fowler bed (manual)".to_string()),
                category: None,
                default_rate: Some(5_000_00),
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(product.sku(), "BED-SF");
        assert_eq!(product.name(), "Semi-fowler bed (manual)");
        assert_eq!(product.category(), "beds");
        assert_eq!(product.default_rate(), 5_000_00);
        assert_eq!(product.version(), 2);
    }

    #[test]
    fn update_without_changes_emits_nothing() {
        let product_id = test_product_id();
        let product = created(product_id);
        let events = product
            .handle(&ProductCommand::UpdateProductDetails(UpdateProductDetails {
                product_id,
                name: None,
                category: Some("beds".to_string()),
                default_rate: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn update_unknown_product_is_not_found() {
        let product_id = test_product_id();
        let err = Product::empty(product_id)
            .handle(&ProductCommand::UpdateProductDetails(UpdateProductDetails {
                product_id,
                name: Some("x".to_string()),
                category: None,
                default_rate: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: handle never mutates state.
            #[test]
            fn handle_is_pure(
                name in "[A-Za-z][A-Za-z0-9 ]{0,40}",
                rate in 0u64..1_000_000
            ) {
                let product_id = test_product_id();
                let product = created(product_id);
                let before = product.clone();

                let cmd = ProductCommand::UpdateProductDetails(UpdateProductDetails {
                    product_id,
                    name: Some(name),
                    category: None,
                    default_rate: Some(rate),
                    occurred_at: Utc::now(),
                });
                let first = product.handle(&cmd);
                let second = product.handle(&cmd);

                prop_assert_eq!(&before, &product);
                prop_assert_eq!(first, second);
            }
        }
    }
}
