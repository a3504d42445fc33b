//! Engine configuration, validated once at startup.

use serde::{Deserialize, Serialize};

use crate::access::AccessList;
use crate::constants::{DEFAULT_DOMAIN, DEFAULT_FIRST_IDENTITY_ID, DEFAULT_MAX_LIFE_SECONDS};
use crate::error::ConfigError;

/// Configuration for a world instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WorldConfig {
    /// Deployment domain mixed into every signed challenge.
    pub domain: String,
    /// Id assigned to the first registered identity.
    pub first_identity_id: u64,
    /// Index identities by their controlling address.
    pub bind_controlling_address: bool,
    /// Refuse registrations that carry no proof of key control.
    pub require_registration_proof: bool,
    /// Longest lifetime a transfer may be created with.
    pub max_life_seconds: u64,
    /// Who may call restricted lookups.
    pub access: AccessList,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            first_identity_id: DEFAULT_FIRST_IDENTITY_ID,
            bind_controlling_address: true,
            require_registration_proof: false,
            max_life_seconds: DEFAULT_MAX_LIFE_SECONDS,
            access: AccessList::default(),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        if self.first_identity_id == 0 {
            return Err(ConfigError::ZeroFirstIdentity);
        }
        if self.max_life_seconds == 0 {
            return Err(ConfigError::ZeroMaxLife);
        }
        self.access.validate()
    }
}
