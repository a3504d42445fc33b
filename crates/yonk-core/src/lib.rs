//! # yonk-core
//! Foundation types and traits for the Yonk protocol.
//!
//! - [`amount`] — 256-bit transfer values with checked arithmetic
//! - [`crypto`] — P-256 ECDSA verification with canonical low-S enforcement
//! - [`registry`] — sequential numeric identities bound to device keys
//! - [`challenge`] — domain-separated digests signed by device keys
//! - [`access`] — explicit allow-lists for internal capability checks
//! - [`traits`] — seams implemented by other crates (decay math, clocks)

pub mod access;
pub mod amount;
pub mod challenge;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;
pub mod vectors;
