//! Rental product catalog.
//!
//! A product is the catalog entry (e.g. "semi-fowler bed"); individual units of
//! it are tracked as assets. Pure domain logic, no IO.

pub mod product;

pub use product::{
    CreateProduct, Product, ProductCommand, ProductCreated, ProductDetailsUpdated, ProductEvent,
    ProductId, UpdateProductDetails,
};
