//! Asset domain module.
//!
//! One [`Asset`] is one physically distinguishable rental unit. This crate holds
//! the status/rental-link rules and the append-only history, implemented as
//! deterministic domain logic (no IO, no storage).

pub mod asset;
pub mod history;
pub mod status;

pub use asset::{
    Asset, AssetCheckedIn, AssetCheckedOut, AssetCommand, AssetEvent, AssetId, AssetMoved,
    AssetRegistered, AssetStatusChanged, Checkin, Checkout, MoveAsset, RegisterAsset, SetStatus,
    StatusExtra,
};
pub use history::{HistoryEntry, HistoryKind};
pub use status::{AssetStatus, RentalLink};
