//! Identity registry: sequential numeric ids bound to P-256 device keys.
//!
//! Identities are append-only. Ids start at
//! [`WorldConfig::first_identity_id`] and increase by one per registration;
//! no id is ever reused. Each device key, and each controlling address when
//! address binding is enabled, maps to at most one identity.
//!
//! Resolving an address and reading a device key are restricted operations,
//! checked against the configured [`AccessList`].

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::access::{AccessList, Component, Operation};
use crate::challenge::registration_challenge;
use crate::config::WorldConfig;
use crate::crypto::{self, DevicePublicKey, Signature};
use crate::error::RegistryError;
use crate::types::{Address, Identity, IdentityId};

#[derive(Debug, Clone)]
struct RegistrationPolicy {
    domain: String,
    bind_controlling_address: bool,
    require_registration_proof: bool,
    access: AccessList,
}

/// Registry of identities, indexed by id, device key and address.
///
/// Not thread-safe; the world executor serializes all access.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    identities: BTreeMap<IdentityId, Identity>,
    by_key: HashMap<DevicePublicKey, IdentityId>,
    by_address: HashMap<Address, IdentityId>,
    next_id: IdentityId,
    policy: RegistrationPolicy,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            identities: BTreeMap::new(),
            by_key: HashMap::new(),
            by_address: HashMap::new(),
            next_id: config.first_identity_id,
            policy: RegistrationPolicy {
                domain: config.domain.clone(),
                bind_controlling_address: config.bind_controlling_address,
                require_registration_proof: config.require_registration_proof,
                access: config.access.clone(),
            },
        }
    }

    /// Rebuild a registry from previously exported identities.
    ///
    /// Indices are recomputed; duplicates, ids at or above `next_id` and
    /// device keys that are not P-256 points are reported as
    /// [`RegistryError::CorruptSnapshot`].
    pub fn restore(
        config: &WorldConfig,
        identities: Vec<Identity>,
        next_id: IdentityId,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(config);
        registry.next_id = next_id.max(config.first_identity_id);
        for identity in identities {
            if identity.id >= registry.next_id {
                return Err(RegistryError::CorruptSnapshot(format!(
                    "identity {} not below next id {}",
                    identity.id, registry.next_id
                )));
            }
            if identity.device_key.validate().is_err() {
                return Err(RegistryError::CorruptSnapshot(format!(
                    "device key of identity {} is not a P-256 point",
                    identity.id
                )));
            }
            if registry.by_key.insert(identity.device_key, identity.id).is_some() {
                return Err(RegistryError::CorruptSnapshot(format!(
                    "device key of identity {} registered twice",
                    identity.id
                )));
            }
            if let Some(address) = identity.controlling_address {
                if registry.by_address.insert(address, identity.id).is_some() {
                    return Err(RegistryError::CorruptSnapshot(format!(
                        "address {address} bound twice"
                    )));
                }
            }
            if registry.identities.insert(identity.id, identity).is_some() {
                return Err(RegistryError::CorruptSnapshot("duplicate identity id".into()));
            }
        }
        Ok(registry)
    }

    /// Register a device key, optionally binding a controlling address.
    ///
    /// `proof`, when given, must be a signature by `device_key` over
    /// [`registration_challenge`]. It is mandatory if the configuration
    /// requires registration proofs. All checks run before any state changes.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidPublicKey`] if the key is not on P-256
    /// - [`RegistryError::DuplicateRegistration`] if the key or address is taken
    /// - [`RegistryError::MissingProof`] / [`RegistryError::InvalidSignature`]
    pub fn register(
        &mut self,
        device_key: DevicePublicKey,
        controlling_address: Option<Address>,
        proof: Option<&Signature>,
    ) -> Result<IdentityId, RegistryError> {
        device_key
            .validate()
            .map_err(|_| RegistryError::InvalidPublicKey)?;

        if let Some(&existing) = self.by_key.get(&device_key) {
            return Err(RegistryError::DuplicateRegistration {
                what: "device key",
                existing,
            });
        }

        let address = if self.policy.bind_controlling_address {
            controlling_address
        } else {
            if controlling_address.is_some() {
                debug!("address binding disabled, ignoring controlling address");
            }
            None
        };
        if let Some(existing) = address.and_then(|a| self.by_address.get(&a).copied()) {
            return Err(RegistryError::DuplicateRegistration {
                what: "controlling address",
                existing,
            });
        }

        match proof {
            Some(sig) => {
                let challenge =
                    registration_challenge(&self.policy.domain, &device_key, address.as_ref());
                crypto::check_signature(&device_key, &challenge, sig)
                    .map_err(RegistryError::InvalidSignature)?;
            }
            None if self.policy.require_registration_proof => {
                return Err(RegistryError::MissingProof);
            }
            None => {}
        }

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(RegistryError::IdOverflow)?;
        self.by_key.insert(device_key, id);
        if let Some(a) = address {
            self.by_address.insert(a, id);
        }
        self.identities.insert(
            id,
            Identity {
                id,
                device_key,
                controlling_address: address,
            },
        );
        debug!(id, proven = proof.is_some(), "identity registered");
        Ok(id)
    }

    /// Resolve a controlling address to its identity.
    pub fn resolve(
        &self,
        component: Component,
        address: &Address,
    ) -> Result<IdentityId, RegistryError> {
        self.policy.access.check(Operation::ResolveIdentity, component)?;
        self.by_address
            .get(address)
            .copied()
            .ok_or_else(|| RegistryError::NotFound(address.to_string()))
    }

    /// Device key bound to identity `id`.
    pub fn device_key(
        &self,
        component: Component,
        id: IdentityId,
    ) -> Result<DevicePublicKey, RegistryError> {
        self.policy.access.check(Operation::ReadDeviceKey, component)?;
        self.identities
            .get(&id)
            .map(|i| i.device_key)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Identity record for `id`, bypassing capability checks.
    pub fn get(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.get(&id)
    }

    /// Whether identity `id` exists.
    pub fn contains(&self, id: IdentityId) -> bool {
        self.identities.contains_key(&id)
    }

    /// Id the next registration will receive.
    pub fn next_id(&self) -> IdentityId {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// All identities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DeviceKeyPair;
    use crate::error::{AccessError, SignatureError};

    fn kp(seed: u8) -> DeviceKeyPair {
        DeviceKeyPair::from_secret_bytes([seed; 32]).unwrap()
    }

    fn registry() -> IdentityRegistry {
        IdentityRegistry::new(&WorldConfig::default())
    }

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    fn proof(cfg: &WorldConfig, k: &DeviceKeyPair, address: Option<&Address>) -> Signature {
        let c = registration_challenge(&cfg.domain, &k.public_key(), address);
        k.sign_hash(&c).unwrap()
    }

    #[test]
    fn ids_start_at_base_and_increase() {
        let mut r = registry();
        let a = r.register(kp(1).public_key(), None, None).unwrap();
        let b = r.register(kp(2).public_key(), None, None).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(r.next_id(), 3);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn custom_base_id() {
        let cfg = WorldConfig {
            first_identity_id: 100,
            ..WorldConfig::default()
        };
        let mut r = IdentityRegistry::new(&cfg);
        assert_eq!(r.register(kp(1).public_key(), None, None).unwrap(), 100);
    }

    #[test]
    fn duplicate_key_rejected() {
        let mut r = registry();
        r.register(kp(1).public_key(), None, None).unwrap();
        let err = r.register(kp(1).public_key(), Some(addr(9)), None).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateRegistration {
                what: "device key",
                existing: 1
            }
        );
        assert_eq!(r.len(), 1);
        assert_eq!(r.next_id(), 2);
    }

    #[test]
    fn duplicate_address_rejected() {
        let mut r = registry();
        r.register(kp(1).public_key(), Some(addr(5)), None).unwrap();
        let err = r.register(kp(2).public_key(), Some(addr(5)), None).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateRegistration {
                what: "controlling address",
                ..
            }
        ));
    }

    #[test]
    fn address_ignored_when_binding_disabled() {
        let cfg = WorldConfig {
            bind_controlling_address: false,
            ..WorldConfig::default()
        };
        let mut r = IdentityRegistry::new(&cfg);
        r.register(kp(1).public_key(), Some(addr(5)), None).unwrap();
        r.register(kp(2).public_key(), Some(addr(5)), None).unwrap();
        assert!(matches!(
            r.resolve(Component::RegisterSystem, &addr(5)),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn off_curve_key_rejected() {
        let mut r = registry();
        let mut key = kp(1).public_key();
        key.y[0] ^= 0xFF;
        assert_eq!(
            r.register(key, None, None).unwrap_err(),
            RegistryError::InvalidPublicKey
        );
        assert!(r.is_empty());
    }

    #[test]
    fn valid_proof_accepted() {
        let cfg = WorldConfig {
            require_registration_proof: true,
            ..WorldConfig::default()
        };
        let mut r = IdentityRegistry::new(&cfg);
        let k = kp(4);
        let sig = proof(&cfg, &k, Some(&addr(1)));
        assert_eq!(r.register(k.public_key(), Some(addr(1)), Some(&sig)).unwrap(), 1);
    }

    #[test]
    fn missing_proof_rejected_when_required() {
        let cfg = WorldConfig {
            require_registration_proof: true,
            ..WorldConfig::default()
        };
        let mut r = IdentityRegistry::new(&cfg);
        assert_eq!(
            r.register(kp(4).public_key(), None, None).unwrap_err(),
            RegistryError::MissingProof
        );
    }

    #[test]
    fn proof_for_other_address_rejected() {
        let cfg = WorldConfig::default();
        let mut r = IdentityRegistry::new(&cfg);
        let k = kp(4);
        let sig = proof(&cfg, &k, Some(&addr(1)));
        assert_eq!(
            r.register(k.public_key(), Some(addr(2)), Some(&sig)).unwrap_err(),
            RegistryError::InvalidSignature(SignatureError::Mismatch)
        );
        assert!(r.is_empty());
    }

    #[test]
    fn high_s_proof_rejected() {
        let cfg = WorldConfig::default();
        let mut r = IdentityRegistry::new(&cfg);
        let k = kp(4);
        let twin = proof(&cfg, &k, None).negate_s().unwrap();
        assert_eq!(
            r.register(k.public_key(), None, Some(&twin)).unwrap_err(),
            RegistryError::InvalidSignature(SignatureError::HighS)
        );
    }

    #[test]
    fn proof_signed_by_other_key_rejected() {
        let cfg = WorldConfig::default();
        let mut r = IdentityRegistry::new(&cfg);
        let c = registration_challenge(&cfg.domain, &kp(4).public_key(), None);
        let forged = kp(5).sign_hash(&c).unwrap();
        assert!(r.register(kp(4).public_key(), None, Some(&forged)).is_err());
    }

    #[test]
    fn resolve_and_device_key() {
        let mut r = registry();
        let k = kp(3).public_key();
        let id = r.register(k, Some(addr(3)), None).unwrap();
        assert_eq!(r.resolve(Component::YellSystem, &addr(3)).unwrap(), id);
        assert_eq!(r.device_key(Component::ClaimSystem, id).unwrap(), k);
    }

    #[test]
    fn resolve_unknown_address() {
        let r = registry();
        assert!(matches!(
            r.resolve(Component::ClaimSystem, &addr(1)),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            r.device_key(Component::ClaimSystem, 42),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn external_lookup_denied() {
        let mut r = registry();
        let id = r.register(kp(3).public_key(), Some(addr(3)), None).unwrap();
        assert!(matches!(
            r.resolve(Component::External, &addr(3)),
            Err(RegistryError::Access(AccessError::Denied { .. }))
        ));
        assert!(matches!(
            r.device_key(Component::External, id),
            Err(RegistryError::Access(_))
        ));
    }

    #[test]
    fn restore_rebuilds_indices() {
        let cfg = WorldConfig::default();
        let mut r = IdentityRegistry::new(&cfg);
        r.register(kp(1).public_key(), Some(addr(1)), None).unwrap();
        r.register(kp(2).public_key(), None, None).unwrap();
        let exported: Vec<Identity> = r.iter().cloned().collect();

        let mut restored = IdentityRegistry::restore(&cfg, exported, r.next_id()).unwrap();
        assert_eq!(restored.resolve(Component::RegisterSystem, &addr(1)).unwrap(), 1);
        assert_eq!(restored.register(kp(3).public_key(), None, None).unwrap(), 3);
        assert!(restored.register(kp(2).public_key(), None, None).is_err());
    }

    #[test]
    fn restore_rejects_id_above_counter() {
        let cfg = WorldConfig::default();
        let identity = Identity {
            id: 5,
            device_key: kp(1).public_key(),
            controlling_address: None,
        };
        assert!(matches!(
            IdentityRegistry::restore(&cfg, vec![identity], 3),
            Err(RegistryError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn restore_rejects_off_curve_device_key() {
        let cfg = WorldConfig::default();
        let identity = Identity {
            id: 1,
            device_key: DevicePublicKey::from_coordinates([0x11; 32], [0x11; 32]),
            controlling_address: None,
        };
        let err = IdentityRegistry::restore(&cfg, vec![identity], 2).unwrap_err();
        assert!(
            matches!(&err, RegistryError::CorruptSnapshot(msg) if msg.contains("not a P-256 point")),
            "{err}"
        );
    }
}
