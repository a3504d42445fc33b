//! # yonk-world — Transfer ledger, escrow and the serialized executor.
//!
//! Composes the Yonk subsystems into a single world:
//! - [`ledger::ValueTransferLedger`] — decaying-value transfers and their settlement
//! - [`escrow::EphemeralEscrow`] — one-time owner slots released by signature
//! - [`world::World`] — one lock around all state; every call is atomic and totally ordered
//! - [`config`] — layered configuration loading

pub mod config;
pub mod escrow;
pub mod ledger;
pub mod world;

pub use ledger::ValueTransferLedger;
pub use escrow::EphemeralEscrow;
pub use world::{Caller, World, WorldSnapshot};
