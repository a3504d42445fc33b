//! Ledger of decaying-value transfers ("yonks").
//!
//! Each transfer moves through `Pending -> Claimed | Reclaimed` exactly once.
//! A claim is only possible strictly before expiry and a reclaim only from
//! expiry onward. Once settled, every further claim or reclaim fails with
//! [`LedgerError::AlreadySettled`] and changes nothing.
//!
//! All validation happens before mutation, so a failed call leaves the
//! ledger untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use yonk_core::constants::FIRST_TRANSFER_ID;
use yonk_core::error::LedgerError;
use yonk_core::registry::IdentityRegistry;
use yonk_core::traits::DecayCalculator;
use yonk_core::types::{
    Amount, DecayParams, Hash256, IdentityId, LedgerEvent, Recipient, Transfer, TransferId,
    TransferStatus,
};

use crate::escrow::EphemeralEscrow;

/// Parameters of a new transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: IdentityId,
    pub to: Recipient,
    pub data_commitment: Hash256,
    pub start_value: Amount,
    pub end_value: Amount,
    pub life_seconds: u64,
}

/// Outcome of a successful claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub id: TransferId,
    /// Decayed value paid to the claimant.
    pub payout: Amount,
    /// `start_value - payout`, burned into the residual pool.
    pub returned: Amount,
}

/// Outcome of a successful reclaim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReclaimReceipt {
    pub id: TransferId,
    /// Value frozen at expiry, returned to the sender.
    pub residual: Amount,
    /// `start_value - residual`, burned into the residual pool.
    pub burned: Amount,
}

/// Transfer table plus its append-only event log.
pub struct ValueTransferLedger {
    transfers: BTreeMap<TransferId, Transfer>,
    events: Vec<LedgerEvent>,
    next_id: TransferId,
    max_life_seconds: u64,
    decay: Arc<dyn DecayCalculator>,
}

impl ValueTransferLedger {
    pub fn new(decay: Arc<dyn DecayCalculator>, max_life_seconds: u64) -> Self {
        Self {
            transfers: BTreeMap::new(),
            events: Vec::new(),
            next_id: FIRST_TRANSFER_ID,
            max_life_seconds,
            decay,
        }
    }

    /// Rebuild a ledger from exported transfers and events.
    pub fn restore(
        decay: Arc<dyn DecayCalculator>,
        max_life_seconds: u64,
        transfers: Vec<Transfer>,
        events: Vec<LedgerEvent>,
        next_id: TransferId,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(decay, max_life_seconds);
        ledger.next_id = next_id.max(FIRST_TRANSFER_ID);
        for t in transfers {
            if t.id >= ledger.next_id {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "transfer {} not below next id {}",
                    t.id, ledger.next_id
                )));
            }
            if ledger.transfers.insert(t.id, t).is_some() {
                return Err(LedgerError::CorruptSnapshot("duplicate transfer id".into()));
            }
        }
        ledger.events = events;
        Ok(ledger)
    }

    /// Id the next created transfer will receive.
    pub fn next_id(&self) -> TransferId {
        self.next_id
    }

    /// Check a request without recording it, returning its decay parameters.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRange`] if `start < end`, the lifetime is zero
    ///   or above the configured maximum, or expiry overflows
    /// - [`LedgerError::UnknownSender`] / [`LedgerError::UnknownRecipient`]
    pub fn validate(
        &self,
        registry: &IdentityRegistry,
        request: &TransferRequest,
        now: u64,
    ) -> Result<DecayParams, LedgerError> {
        if request.start_value < request.end_value {
            return Err(LedgerError::InvalidRange(format!(
                "start value {} below end value {}",
                request.start_value, request.end_value
            )));
        }
        if request.life_seconds == 0 {
            return Err(LedgerError::InvalidRange("lifetime must be non-zero".into()));
        }
        if request.life_seconds > self.max_life_seconds {
            return Err(LedgerError::InvalidRange(format!(
                "lifetime {} exceeds maximum {}",
                request.life_seconds, self.max_life_seconds
            )));
        }
        let params = DecayParams {
            start_value: request.start_value,
            end_value: request.end_value,
            life_seconds: request.life_seconds,
            start_timestamp: now,
        };
        params
            .expires_at()
            .map_err(|_| LedgerError::InvalidRange("expiry overflows".into()))?;

        if !registry.contains(request.from) {
            return Err(LedgerError::UnknownSender(request.from));
        }
        if let Recipient::Identity(to) = request.to {
            if !registry.contains(to) {
                return Err(LedgerError::UnknownRecipient(to));
            }
        }
        self.next_id.checked_add(1).ok_or(LedgerError::IdOverflow)?;
        Ok(params)
    }

    /// Record a new pending transfer starting at `now`.
    pub fn create(
        &mut self,
        registry: &IdentityRegistry,
        request: TransferRequest,
        now: u64,
    ) -> Result<TransferId, LedgerError> {
        let decay = self.validate(registry, &request, now)?;
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(LedgerError::IdOverflow)?;
        self.transfers.insert(
            id,
            Transfer {
                id,
                data_commitment: request.data_commitment,
                decay,
                from: request.from,
                to: request.to,
                status: TransferStatus::Pending,
            },
        );
        self.events.push(LedgerEvent::Created {
            id,
            from: request.from,
            to: request.to,
            start_value: request.start_value,
            at: now,
        });
        Ok(id)
    }

    fn pending(&self, id: TransferId) -> Result<&Transfer, LedgerError> {
        let transfer = self
            .transfers
            .get(&id)
            .ok_or(LedgerError::UnknownTransfer(id))?;
        if !transfer.status.is_pending() {
            return Err(LedgerError::AlreadySettled(id));
        }
        Ok(transfer)
    }

    /// Check that transfer `id` is pending and not yet expired at `now`.
    ///
    /// Does not check who is claiming.
    pub fn check_claimable(&self, id: TransferId, now: u64) -> Result<&Transfer, LedgerError> {
        let transfer = self.pending(id)?;
        let expired_at = transfer.decay.expires_at()?;
        if now >= expired_at {
            return Err(LedgerError::Expired { id, expired_at });
        }
        Ok(transfer)
    }

    /// Claim transfer `id` on behalf of identity `by`.
    ///
    /// `by` must be the recipient identity or, for an ephemeral recipient,
    /// the identity the escrow slot was released to.
    ///
    /// # Errors
    ///
    /// Checked in order: [`LedgerError::UnknownTransfer`],
    /// [`LedgerError::AlreadySettled`], [`LedgerError::Unauthorized`],
    /// [`LedgerError::Expired`].
    pub fn claim(
        &mut self,
        id: TransferId,
        by: IdentityId,
        escrow: &EphemeralEscrow,
        now: u64,
    ) -> Result<ClaimReceipt, LedgerError> {
        let transfer = self.pending(id)?;
        let authorized = match transfer.to {
            Recipient::Identity(to) => to == by,
            Recipient::Ephemeral(_) => escrow.released_to(id) == Some(by),
        };
        if !authorized {
            return Err(LedgerError::Unauthorized { id, caller: by });
        }
        let transfer = self.check_claimable(id, now)?;
        let split = self.decay.claim_split(&transfer.decay, now)?;

        if let Some(t) = self.transfers.get_mut(&id) {
            t.status = TransferStatus::Claimed {
                by,
                payout: split.claimed,
                returned: split.returned,
                at: now,
            };
        }
        self.events.push(LedgerEvent::Claimed {
            id,
            by,
            claimed: split.claimed,
            returned: split.returned,
            at: now,
        });
        Ok(ClaimReceipt {
            id,
            payout: split.claimed,
            returned: split.returned,
        })
    }

    /// Reclaim expired transfer `id` on behalf of its sender `by`.
    ///
    /// # Errors
    ///
    /// Checked in order: [`LedgerError::UnknownTransfer`],
    /// [`LedgerError::AlreadySettled`], [`LedgerError::Unauthorized`],
    /// [`LedgerError::NotYetExpired`].
    pub fn reclaim(
        &mut self,
        id: TransferId,
        by: IdentityId,
        now: u64,
    ) -> Result<ReclaimReceipt, LedgerError> {
        let transfer = self.pending(id)?;
        if transfer.from != by {
            return Err(LedgerError::Unauthorized { id, caller: by });
        }
        let expires_at = transfer.decay.expires_at()?;
        if now < expires_at {
            return Err(LedgerError::NotYetExpired { id, expires_at });
        }
        let residual = self.decay.residual(&transfer.decay)?;
        let burned = transfer
            .decay
            .start_value
            .checked_sub(residual)
            .ok_or(yonk_core::error::DecayError::ArithmeticOverflow)?;

        if let Some(t) = self.transfers.get_mut(&id) {
            t.status = TransferStatus::Reclaimed { residual, at: now };
        }
        self.events.push(LedgerEvent::Reclaimed {
            id,
            by,
            residual,
            at: now,
        });
        Ok(ReclaimReceipt {
            id,
            residual,
            burned,
        })
    }

    /// Current value of transfer `id`, regardless of settlement.
    pub fn value_at(&self, id: TransferId, now: u64) -> Result<Amount, LedgerError> {
        let transfer = self
            .transfers
            .get(&id)
            .ok_or(LedgerError::UnknownTransfer(id))?;
        Ok(self.decay.value_at(&transfer.decay, now)?)
    }

    pub(crate) fn record(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    pub fn get(&self, id: TransferId) -> Option<&Transfer> {
        self.transfers.get(&id)
    }

    /// Pending transfers addressed to identity `id`.
    pub fn pending_for(&self, id: IdentityId) -> Vec<&Transfer> {
        self.transfers
            .values()
            .filter(|t| t.status.is_pending() && t.to == Recipient::Identity(id))
            .collect()
    }

    /// Transfers sent by identity `id`, settled or not.
    pub fn sent_by(&self, id: IdentityId) -> Vec<&Transfer> {
        self.transfers.values().filter(|t| t.from == id).collect()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// All transfers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Transfer> {
        self.transfers.values()
    }
}

impl std::fmt::Debug for ValueTransferLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueTransferLedger")
            .field("transfers", &self.transfers.len())
            .field("events", &self.events.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
