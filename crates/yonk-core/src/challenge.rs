//! Authorization challenges signed by device keys.
//!
//! Each challenge is `SHA-256` over a tagged, length-delimited encoding of
//! the deployment domain, the operation tag, and the operands that the
//! signature authorizes. A signature for one operation, transfer, or
//! deployment never verifies for another.

use sha2::{Digest, Sha256};

use crate::constants::{
    TAG_ACCEPT_RELEASE, TAG_CLAIM, TAG_RECLAIM, TAG_REGISTER, TAG_RELEASE, TAG_YELL,
};
use crate::crypto::DevicePublicKey;
use crate::types::{Address, Amount, Hash256, IdentityId, TransferId, YellTarget, YellTerms};

struct Challenge {
    hasher: Sha256,
}

impl Challenge {
    fn new(domain: &str, tag: &[u8]) -> Self {
        let mut c = Self {
            hasher: Sha256::new(),
        };
        c.bytes(tag);
        c.bytes(domain.as_bytes());
        c
    }

    fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update((data.len() as u64).to_be_bytes());
        self.hasher.update(data);
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        self.hasher.update(v.to_be_bytes());
        self
    }

    fn amount(&mut self, v: &Amount) -> &mut Self {
        self.hasher.update(v.to_be_bytes());
        self
    }

    fn key(&mut self, key: &DevicePublicKey) -> &mut Self {
        self.hasher.update(key.x);
        self.hasher.update(key.y);
        self
    }

    fn finish(self) -> Hash256 {
        Hash256(self.hasher.finalize().into())
    }
}

/// Digest a device signs to prove control of `key` when registering.
pub fn registration_challenge(
    domain: &str,
    key: &DevicePublicKey,
    address: Option<&Address>,
) -> Hash256 {
    let mut c = Challenge::new(domain, TAG_REGISTER);
    c.key(key);
    match address {
        Some(a) => c.bytes(a.as_bytes()),
        None => c.bytes(&[]),
    };
    c.finish()
}

/// Digest a sender's device signs to create transfer `transfer_id`.
pub fn yell_challenge(
    domain: &str,
    from: IdentityId,
    transfer_id: TransferId,
    terms: &YellTerms,
) -> Hash256 {
    let mut c = Challenge::new(domain, TAG_YELL);
    c.u64(from).u64(transfer_id);
    match &terms.target {
        YellTarget::Identity(id) => c.bytes(&[0]).u64(*id),
        YellTarget::Ephemeral(key) => c.bytes(&[1]).key(key),
    };
    c.bytes(terms.data_commitment.as_bytes())
        .amount(&terms.start_value)
        .amount(&terms.end_value)
        .u64(terms.life_seconds);
    c.finish()
}

/// Digest a recipient's device signs to claim a transfer.
pub fn claim_challenge(domain: &str, transfer_id: TransferId, claimant: IdentityId) -> Hash256 {
    let mut c = Challenge::new(domain, TAG_CLAIM);
    c.u64(transfer_id).u64(claimant);
    c.finish()
}

/// Digest a sender's device signs to reclaim an expired transfer.
pub fn reclaim_challenge(domain: &str, transfer_id: TransferId, sender: IdentityId) -> Hash256 {
    let mut c = Challenge::new(domain, TAG_RECLAIM);
    c.u64(transfer_id).u64(sender);
    c.finish()
}

/// Digest the ephemeral key signs to release its escrow slot to `claimant`.
pub fn release_challenge(domain: &str, transfer_id: TransferId, claimant: IdentityId) -> Hash256 {
    let mut c = Challenge::new(domain, TAG_RELEASE);
    c.u64(transfer_id).u64(claimant);
    c.finish()
}

/// Digest the claimant's device signs to take delivery of a released slot.
///
/// Distinct from [`claim_challenge`], so a release request never doubles as
/// a claim.
pub fn accept_release_challenge(
    domain: &str,
    transfer_id: TransferId,
    claimant: IdentityId,
) -> Hash256 {
    let mut c = Challenge::new(domain, TAG_ACCEPT_RELEASE);
    c.u64(transfer_id).u64(claimant);
    c.finish()
}
