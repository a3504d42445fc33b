//! Escrow slots for transfers addressed to one-time keys.
//!
//! The sender of an ephemeral transfer names the public half of a fresh key
//! pair. The slot is owned by that key's address until someone presents a
//! signature by the key over [`release_challenge`] naming a claimant
//! identity; from then on only that identity may claim the transfer.

use std::collections::BTreeMap;

use tracing::debug;
use yonk_core::challenge::release_challenge;
use yonk_core::crypto::{self, DevicePublicKey, Signature};
use yonk_core::error::EscrowError;
use yonk_core::types::{Address, EphemeralOwner, IdentityId, TransferId};

/// Ephemeral owner slots keyed by transfer id.
#[derive(Debug, Clone)]
pub struct EphemeralEscrow {
    slots: BTreeMap<TransferId, EphemeralOwner>,
    domain: String,
}

impl EphemeralEscrow {
    pub fn new(domain: &str) -> Self {
        Self {
            slots: BTreeMap::new(),
            domain: domain.to_string(),
        }
    }

    /// Rebuild from exported slots. Each slot key must be a curve point
    /// whose address matches the recorded one.
    pub fn restore(domain: &str, slots: Vec<EphemeralOwner>) -> Result<Self, EscrowError> {
        let mut escrow = Self::new(domain);
        for slot in slots {
            let id = slot.id;
            slot.key.validate().map_err(|_| EscrowError::InvalidKey)?;
            if slot.key.address() != slot.address {
                return Err(EscrowError::CorruptSnapshot(format!(
                    "slot {id} address does not match its key"
                )));
            }
            if escrow.slots.insert(id, slot).is_some() {
                return Err(EscrowError::SlotExists(id));
            }
        }
        Ok(escrow)
    }

    /// Open the slot backing transfer `id`, returning its owner address.
    pub fn create_slot(
        &mut self,
        id: TransferId,
        key: DevicePublicKey,
    ) -> Result<Address, EscrowError> {
        key.validate().map_err(|_| EscrowError::InvalidKey)?;
        if self.slots.contains_key(&id) {
            return Err(EscrowError::SlotExists(id));
        }
        let address = key.address();
        self.slots.insert(
            id,
            EphemeralOwner {
                id,
                address,
                key,
                released_to: None,
            },
        );
        Ok(address)
    }

    pub(crate) fn discard(&mut self, id: TransferId) {
        self.slots.remove(&id);
    }

    /// Check a release authorization without applying it.
    pub fn check_release(
        &self,
        id: TransferId,
        claimant: IdentityId,
        authorization: &Signature,
    ) -> Result<(), EscrowError> {
        let slot = self.slots.get(&id).ok_or(EscrowError::NoSlot(id))?;
        if slot.released_to.is_some() {
            return Err(EscrowError::AlreadyReleased(id));
        }
        let challenge = release_challenge(&self.domain, id, claimant);
        crypto::check_signature(&slot.key, &challenge, authorization).map_err(|e| {
            debug!(id, claimant, error = %e, "release authorization rejected");
            EscrowError::Unauthorized(id)
        })
    }

    /// Release slot `id` to `claimant`.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::NoSlot`] if transfer `id` has no slot
    /// - [`EscrowError::AlreadyReleased`] on a second release
    /// - [`EscrowError::Unauthorized`] if the signature does not verify
    pub fn release(
        &mut self,
        id: TransferId,
        claimant: IdentityId,
        authorization: &Signature,
    ) -> Result<IdentityId, EscrowError> {
        self.check_release(id, claimant, authorization)?;
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.released_to = Some(claimant);
        }
        Ok(claimant)
    }

    /// Identity slot `id` was released to, if any.
    pub fn released_to(&self, id: TransferId) -> Option<IdentityId> {
        self.slots.get(&id).and_then(|s| s.released_to)
    }

    pub fn slot(&self, id: TransferId) -> Option<&EphemeralOwner> {
        self.slots.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EphemeralOwner> {
        self.slots.values()
    }
}
