//! Error types for the Yonk protocol.
use thiserror::Error;

use crate::access::{Component, Operation};
use crate::amount::Amount;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    #[error("r is zero")] ZeroR,
    #[error("s is zero")] ZeroS,
    #[error("r is not below the group order")] ROutOfRange,
    #[error("s is not below the group order")] SOutOfRange,
    #[error("non-canonical signature: s > n/2")] HighS,
    #[error("public key is not a point on P-256")] InvalidPublicKey,
    #[error("signature does not match key and hash")] Mismatch,
    #[error("invalid secret key")] InvalidSecretKey,
    #[error("signing failed")] SigningFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate registration: {what} already bound to identity {existing}")] DuplicateRegistration { what: &'static str, existing: u64 },
    #[error("identity not found: {0}")] NotFound(String),
    #[error("invalid device public key")] InvalidPublicKey,
    #[error("invalid registration proof: {0}")] InvalidSignature(SignatureError),
    #[error("registration proof required")] MissingProof,
    #[error("identity id space exhausted")] IdOverflow,
    #[error("corrupt registry snapshot: {0}")] CorruptSnapshot(String),
    #[error(transparent)] Access(#[from] AccessError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecayError {
    #[error("lifetime must be non-zero")] ZeroLifetime,
    #[error("start value {start} below end value {end}")] InvalidRange { start: Amount, end: Amount },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid range: {0}")] InvalidRange(String),
    #[error("unknown sender identity {0}")] UnknownSender(u64),
    #[error("unknown recipient identity {0}")] UnknownRecipient(u64),
    #[error("unknown transfer {0}")] UnknownTransfer(u64),
    #[error("transfer {id} expired at {expired_at}")] Expired { id: u64, expired_at: u64 },
    #[error("transfer {id} live until {expires_at}")] NotYetExpired { id: u64, expires_at: u64 },
    #[error("identity {caller} may not settle transfer {id}")] Unauthorized { id: u64, caller: u64 },
    #[error("transfer {0} already settled")] AlreadySettled(u64),
    #[error("transfer id space exhausted")] IdOverflow,
    #[error("corrupt ledger snapshot: {0}")] CorruptSnapshot(String),
    #[error(transparent)] Decay(#[from] DecayError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("no escrow slot for transfer {0}")] NoSlot(u64),
    #[error("escrow slot for transfer {0} already exists")] SlotExists(u64),
    #[error("escrow slot for transfer {0} already released")] AlreadyReleased(u64),
    #[error("authorization for escrow slot {0} rejected")] Unauthorized(u64),
    #[error("invalid ephemeral owner key")] InvalidKey,
    #[error("corrupt escrow snapshot: {0}")] CorruptSnapshot(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("{component} may not invoke {operation}")] Denied { operation: Operation, component: Component },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("domain must not be empty")] EmptyDomain,
    #[error("first identity id must be non-zero")] ZeroFirstIdentity,
    #[error("max life seconds must be non-zero")] ZeroMaxLife,
    #[error("{0} must not be open to external callers")] OpenCapability(Operation),
    #[error("load: {0}")] Load(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error("line {line}: {message}")] Json { line: usize, message: String },
    #[error("field {field}: {message}")] Hex { field: &'static str, message: String },
    #[error("io: {0}")] Io(String),
}

#[derive(Error, Debug)]
pub enum YonkError {
    #[error(transparent)] Signature(#[from] SignatureError),
    #[error(transparent)] Registry(#[from] RegistryError),
    #[error(transparent)] Decay(#[from] DecayError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Escrow(#[from] EscrowError),
    #[error(transparent)] Access(#[from] AccessError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error("caller failed to prove control of identity {id}: {source}")] Authentication { id: u64, source: SignatureError },
    #[error("snapshot: {0}")] Snapshot(String),
}
