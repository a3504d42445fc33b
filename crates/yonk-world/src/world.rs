//! The serialized world executor.
//!
//! [`World`] wires the identity registry, transfer ledger and escrow behind a
//! single `parking_lot::Mutex`. Every public operation takes the lock for its
//! full duration, so operations are atomic and totally ordered: two racing
//! claims on one transfer resolve by lock order and the loser observes
//! [`LedgerError::AlreadySettled`]. Failed operations leave state untouched.
//!
//! Value burned by claims and reclaims accumulates in the residual pool,
//! which saturates at [`Amount::MAX`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use yonk_core::access::Component;
use yonk_core::challenge::{
    accept_release_challenge, claim_challenge, reclaim_challenge, yell_challenge,
};
use yonk_core::config::WorldConfig;
use yonk_core::crypto::{self, DevicePublicKey, Signature};
use yonk_core::error::{EscrowError, LedgerError, YonkError};
use yonk_core::registry::IdentityRegistry;
use yonk_core::traits::{Clock, DecayCalculator};
use yonk_core::types::{
    Address, Amount, EphemeralOwner, Hash256, Identity, IdentityId, LedgerEvent, Recipient,
    Transfer, TransferId, TransferStatus, YellTarget, YellTerms,
};
use yonk_decay::LinearDecay;

use crate::escrow::EphemeralEscrow;
use crate::ledger::{ClaimReceipt, ReclaimReceipt, TransferRequest, ValueTransferLedger};

/// How a caller proves which identity it acts for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caller {
    /// A controlling address, resolved through the registry.
    Address(Address),
    /// An identity proving control of its device key with a signature over
    /// the operation's challenge.
    Device { id: IdentityId, signature: Signature },
}

struct WorldState {
    config: WorldConfig,
    registry: IdentityRegistry,
    ledger: ValueTransferLedger,
    escrow: EphemeralEscrow,
    residual_pool: Amount,
}

impl WorldState {
    /// Identity `caller` acts for, checked with `component`'s capabilities.
    fn authenticate(
        &self,
        component: Component,
        caller: &Caller,
        challenge: impl FnOnce(IdentityId) -> Hash256,
    ) -> Result<IdentityId, YonkError> {
        match caller {
            Caller::Address(address) => Ok(self.registry.resolve(component, address)?),
            Caller::Device { id, signature } => {
                let key = self.registry.device_key(component, *id)?;
                crypto::check_signature(&key, &challenge(*id), signature)
                    .map_err(|source| YonkError::Authentication { id: *id, source })?;
                Ok(*id)
            }
        }
    }

    fn burn(&mut self, amount: Amount) {
        let pool = self.residual_pool.saturating_add(amount);
        if pool == Amount::MAX {
            warn!(%amount, "residual pool saturated");
        }
        self.residual_pool = pool;
    }
}

/// Exported world state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub config: WorldConfig,
    pub identities: Vec<Identity>,
    pub next_identity_id: IdentityId,
    pub transfers: Vec<Transfer>,
    pub next_transfer_id: TransferId,
    pub slots: Vec<EphemeralOwner>,
    pub events: Vec<LedgerEvent>,
    pub residual_pool: Amount,
}

impl WorldSnapshot {
    pub fn to_json(&self) -> Result<String, YonkError> {
        serde_json::to_string_pretty(self).map_err(|e| YonkError::Snapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, YonkError> {
        serde_json::from_str(json).map_err(|e| YonkError::Snapshot(e.to_string()))
    }
}

/// Cloneable handle to a single world.
#[derive(Clone)]
pub struct World {
    state: Arc<Mutex<WorldState>>,
    clock: Arc<dyn Clock>,
    decay: Arc<dyn DecayCalculator>,
}

impl World {
    /// Create an empty world using linear decay.
    pub fn new(config: WorldConfig, clock: Arc<dyn Clock>) -> Result<Self, YonkError> {
        Self::with_decay(config, clock, Arc::new(LinearDecay::new()))
    }

    /// Create an empty world with a custom decay calculator.
    pub fn with_decay(
        config: WorldConfig,
        clock: Arc<dyn Clock>,
        decay: Arc<dyn DecayCalculator>,
    ) -> Result<Self, YonkError> {
        config.validate()?;
        let state = WorldState {
            registry: IdentityRegistry::new(&config),
            ledger: ValueTransferLedger::new(Arc::clone(&decay), config.max_life_seconds),
            escrow: EphemeralEscrow::new(&config.domain),
            residual_pool: Amount::ZERO,
            config,
        };
        info!(domain = %state.config.domain, "world created");
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            clock,
            decay,
        })
    }

    /// Rebuild a world from a snapshot using linear decay.
    pub fn from_snapshot(snapshot: WorldSnapshot, clock: Arc<dyn Clock>) -> Result<Self, YonkError> {
        Self::from_snapshot_with_decay(snapshot, clock, Arc::new(LinearDecay::new()))
    }

    /// Rebuild a world from a snapshot, re-checking every cross reference.
    ///
    /// The snapshot does not record the decay model; pass the one the world
    /// was created with or pending transfers will pay out differently.
    pub fn from_snapshot_with_decay(
        snapshot: WorldSnapshot,
        clock: Arc<dyn Clock>,
        decay: Arc<dyn DecayCalculator>,
    ) -> Result<Self, YonkError> {
        let WorldSnapshot {
            config,
            identities,
            next_identity_id,
            transfers,
            next_transfer_id,
            slots,
            events,
            residual_pool,
        } = snapshot;
        config.validate()?;

        let registry = IdentityRegistry::restore(&config, identities, next_identity_id)?;
        for t in &transfers {
            if !registry.contains(t.from) {
                return Err(YonkError::Snapshot(format!(
                    "transfer {} sent by unknown identity {}",
                    t.id, t.from
                )));
            }
        }
        let escrow = EphemeralEscrow::restore(&config.domain, slots)?;
        check_escrow_backing(&transfers, &escrow)?;
        let ledger = ValueTransferLedger::restore(
            Arc::clone(&decay),
            config.max_life_seconds,
            transfers,
            events,
            next_transfer_id,
        )?;
        info!(
            identities = registry.len(),
            transfers = ledger.len(),
            "world restored from snapshot"
        );
        Ok(Self {
            state: Arc::new(Mutex::new(WorldState {
                config,
                registry,
                ledger,
                escrow,
                residual_pool,
            })),
            clock,
            decay,
        })
    }

    /// Export the full state.
    pub fn snapshot(&self) -> WorldSnapshot {
        let state = self.state.lock();
        WorldSnapshot {
            config: state.config.clone(),
            identities: state.registry.iter().cloned().collect(),
            next_identity_id: state.registry.next_id(),
            transfers: state.ledger.iter().cloned().collect(),
            next_transfer_id: state.ledger.next_id(),
            slots: state.escrow.iter().cloned().collect(),
            events: state.ledger.events().to_vec(),
            residual_pool: state.residual_pool,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn domain(&self) -> String {
        self.state.lock().config.domain.clone()
    }

    /// Register a device key as a new identity.
    pub fn register(
        &self,
        device_key: DevicePublicKey,
        controlling_address: Option<Address>,
        proof: Option<&Signature>,
    ) -> Result<IdentityId, YonkError> {
        let mut state = self.state.lock();
        let id = state
            .registry
            .register(device_key, controlling_address, proof)
            .inspect_err(|e| debug!(error = %e, "registration rejected"))?;
        info!(id, key = %device_key, "identity registered");
        Ok(id)
    }

    /// Create a transfer from `caller` on the given terms.
    ///
    /// A device caller signs [`yell_challenge`] over the id the transfer will
    /// receive. For an ephemeral target an escrow slot is opened in the same
    /// step.
    pub fn yell(&self, caller: &Caller, terms: &YellTerms) -> Result<TransferId, YonkError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = self.clock.now();
        let next = state.ledger.next_id();
        let from = state
            .authenticate(Component::YellSystem, caller, |id| {
                yell_challenge(&state.config.domain, id, next, terms)
            })
            .inspect_err(|e| debug!(error = %e, "yell rejected"))?;

        let to = match terms.target {
            YellTarget::Identity(id) => Recipient::Identity(id),
            YellTarget::Ephemeral(key) => {
                key.validate().map_err(|_| EscrowError::InvalidKey)?;
                Recipient::Ephemeral(key.address())
            }
        };
        let request = TransferRequest {
            from,
            to,
            data_commitment: terms.data_commitment,
            start_value: terms.start_value,
            end_value: terms.end_value,
            life_seconds: terms.life_seconds,
        };
        state
            .ledger
            .validate(&state.registry, &request, now)
            .inspect_err(|e| debug!(from, error = %e, "yell rejected"))?;

        if let YellTarget::Ephemeral(key) = terms.target {
            state.escrow.create_slot(next, key)?;
        }
        let id = match state.ledger.create(&state.registry, request, now) {
            Ok(id) => id,
            Err(e) => {
                state.escrow.discard(next);
                return Err(e.into());
            }
        };
        info!(
            id,
            from,
            ephemeral = to.is_ephemeral(),
            start_value = %terms.start_value,
            life_seconds = terms.life_seconds,
            "transfer created"
        );
        Ok(id)
    }

    /// Claim transfer `id` for `caller` at the current time.
    pub fn claim(&self, caller: &Caller, id: TransferId) -> Result<ClaimReceipt, YonkError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = self.clock.now();
        let by = state.authenticate(Component::ClaimSystem, caller, |by| {
            claim_challenge(&state.config.domain, id, by)
        })?;
        let receipt = state
            .ledger
            .claim(id, by, &state.escrow, now)
            .inspect_err(|e| debug!(id, by, error = %e, "claim rejected"))?;
        state.burn(receipt.returned);
        info!(
            id,
            by,
            payout = %receipt.payout,
            returned = %receipt.returned,
            "transfer claimed"
        );
        Ok(receipt)
    }

    /// Release the escrow slot of ephemeral transfer `id` to `caller`.
    ///
    /// `authorization` is a signature by the ephemeral key over the release
    /// challenge naming the caller's identity. A device caller signs
    /// [`accept_release_challenge`].
    pub fn release(
        &self,
        caller: &Caller,
        id: TransferId,
        authorization: &Signature,
    ) -> Result<IdentityId, YonkError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let claimant = state.authenticate(Component::ClaimSystem, caller, |by| {
            accept_release_challenge(&state.config.domain, id, by)
        })?;
        state.ledger.check_claimable(id, self.clock.now())?;
        let to = state
            .escrow
            .release(id, claimant, authorization)
            .inspect_err(|e| debug!(id, claimant, error = %e, "release rejected"))?;
        state.ledger.record(LedgerEvent::Released { id, to });
        info!(id, to, "escrow released");
        Ok(to)
    }

    /// Release and claim ephemeral transfer `id` in one step.
    ///
    /// Either both happen or neither does. A device caller signs
    /// [`claim_challenge`].
    pub fn claim_ephemeral(
        &self,
        caller: &Caller,
        id: TransferId,
        authorization: &Signature,
    ) -> Result<ClaimReceipt, YonkError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = self.clock.now();
        let claimant = state.authenticate(Component::ClaimSystem, caller, |by| {
            claim_challenge(&state.config.domain, id, by)
        })?;
        state.ledger.check_claimable(id, now)?;
        state.escrow.check_release(id, claimant, authorization)?;

        state.escrow.release(id, claimant, authorization)?;
        state.ledger.record(LedgerEvent::Released { id, to: claimant });
        let receipt = state.ledger.claim(id, claimant, &state.escrow, now)?;
        state.burn(receipt.returned);
        info!(
            id,
            by = claimant,
            payout = %receipt.payout,
            "ephemeral transfer released and claimed"
        );
        Ok(receipt)
    }

    /// Return expired transfer `id` to its sender.
    pub fn reclaim(&self, caller: &Caller, id: TransferId) -> Result<ReclaimReceipt, YonkError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = self.clock.now();
        let by = state.authenticate(Component::ClaimSystem, caller, |by| {
            reclaim_challenge(&state.config.domain, id, by)
        })?;
        let receipt = state
            .ledger
            .reclaim(id, by, now)
            .inspect_err(|e| debug!(id, by, error = %e, "reclaim rejected"))?;
        state.burn(receipt.burned);
        info!(id, by, residual = %receipt.residual, "transfer reclaimed");
        Ok(receipt)
    }

    /// Resolve a controlling address on behalf of `component`.
    pub fn resolve(&self, component: Component, address: &Address) -> Result<IdentityId, YonkError> {
        Ok(self.state.lock().registry.resolve(component, address)?)
    }

    /// Device key of identity `id` on behalf of `component`.
    pub fn device_key(
        &self,
        component: Component,
        id: IdentityId,
    ) -> Result<DevicePublicKey, YonkError> {
        Ok(self.state.lock().registry.device_key(component, id)?)
    }

    pub fn identity(&self, id: IdentityId) -> Option<Identity> {
        self.state.lock().registry.get(id).cloned()
    }

    pub fn transfer(&self, id: TransferId) -> Option<Transfer> {
        self.state.lock().ledger.get(id).cloned()
    }

    /// Value of transfer `id` at the current time.
    pub fn current_value(&self, id: TransferId) -> Result<Amount, YonkError> {
        let transfer = self
            .transfer(id)
            .ok_or(LedgerError::UnknownTransfer(id))?;
        Ok(self.decay.value_at(&transfer.decay, self.clock.now())?)
    }

    /// Pending transfers addressed to identity `id`.
    pub fn pending_for(&self, id: IdentityId) -> Vec<Transfer> {
        self.state
            .lock()
            .ledger
            .pending_for(id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn escrow_slot(&self, id: TransferId) -> Option<EphemeralOwner> {
        self.state.lock().escrow.slot(id).cloned()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state.lock().ledger.events().to_vec()
    }

    /// Total value burned by claims and reclaims.
    pub fn residual_pool(&self) -> Amount {
        self.state.lock().residual_pool
    }
}

/// Every ephemeral transfer has its own slot at the transfer's address, every
/// slot backs an ephemeral transfer, and a claimed ephemeral transfer was
/// claimed by the identity its slot was released to.
fn check_escrow_backing(transfers: &[Transfer], escrow: &EphemeralEscrow) -> Result<(), YonkError> {
    for t in transfers {
        let Recipient::Ephemeral(address) = t.to else {
            continue;
        };
        let slot = escrow
            .slot(t.id)
            .filter(|s| s.address == address)
            .ok_or_else(|| {
                YonkError::Snapshot(format!(
                    "ephemeral transfer {} has no matching escrow slot",
                    t.id
                ))
            })?;
        if let TransferStatus::Claimed { by, .. } = t.status {
            if slot.released_to != Some(by) {
                return Err(YonkError::Snapshot(format!(
                    "ephemeral transfer {} claimed by {by} but its slot was not released to it",
                    t.id
                )));
            }
        }
    }
    for slot in escrow.iter() {
        let backs = transfers
            .iter()
            .any(|t| t.id == slot.id && t.to == Recipient::Ephemeral(slot.address));
        if !backs {
            return Err(YonkError::Snapshot(format!(
                "escrow slot {} backs no ephemeral transfer",
                slot.id
            )));
        }
    }
    Ok(())
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("World")
            .field("domain", &state.config.domain)
            .field("registry", &state.registry.len())
            .field("ledger", &state.ledger)
            .field("residual_pool", &state.residual_pool)
            .finish_non_exhaustive()
    }
}
