//! Infrastructure layer: document store, services and collaborators.
//!
//! The domain crates decide; this crate loads, persists and publishes. Each
//! service is the single writer of its collection and reports soft failures
//! (dropped capacity, partial batches, propagation errors) in its results.

pub mod batch;
pub mod catalog;
pub mod collaborators;
pub mod command_dispatcher;
pub mod config;
pub mod documents;
pub mod engine;
pub mod error;
pub mod fulfillment;
pub mod ledger;
pub mod normalize;
pub mod orders;
pub mod resolver;
pub mod store;


pub use batch::{BatchFailure, BatchOutcome};
pub use catalog::ProductCatalog;
pub use collaborators::{
    BlobStore, CollaboratorError, InMemoryBlobStore, InMemoryUpstream, NoopUpstream, UpstreamEntry,
    UpstreamSink,
};
pub use command_dispatcher::{CommandDispatcher, Dispatched, SharedBus, SharedDispatcher, SharedStore};
pub use config::{EngineConfig, ProductSwapPolicy, ReservationStatus};
pub use engine::Engine;
pub use error::{ServiceError, ServiceResult};
pub use fulfillment::{DeliveryDesk, FulfillmentDesk, PickupDesk, StageTransition};
pub use ledger::{AssetFilter, AssetLedger, CheckinDetails, CreateUnits};
pub use normalize::normalize_contact;
pub use orders::{ItemEdit, LineAssignment, LineUnassignment, NewOrder, OrderDesk, StatusChange};
pub use resolver::{
    AssignOutcome, AssignPlan, AssignmentContext, HeldAssets, ProductSwap, RejectReason, Rejection,
    ReleaseReason, Resolver, UnassignOutcome,
};
