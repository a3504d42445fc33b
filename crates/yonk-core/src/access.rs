//! Explicit capability checks between internal components.
//!
//! The public systems (`register`, `yell`, `claim`) are open to any caller.
//! Identity lookups are not: only components named in the [`AccessList`]
//! may resolve an address to an identity or read a device key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AccessError, ConfigError};

/// A component that may invoke a restricted operation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Anything outside the engine.
    External,
    RegisterSystem,
    YellSystem,
    ClaimSystem,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::External => "external",
            Self::RegisterSystem => "register_system",
            Self::YellSystem => "yell_system",
            Self::ClaimSystem => "claim_system",
        };
        f.write_str(name)
    }
}

/// A restricted operation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ResolveIdentity,
    ReadDeviceKey,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveIdentity => f.write_str("resolve_identity"),
            Self::ReadDeviceKey => f.write_str("read_device_key"),
        }
    }
}

/// Allow-lists for each restricted operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AccessList {
    pub resolve_identity: Vec<Component>,
    pub read_device_key: Vec<Component>,
}

impl Default for AccessList {
    fn default() -> Self {
        let systems = vec![
            Component::RegisterSystem,
            Component::YellSystem,
            Component::ClaimSystem,
        ];
        Self {
            resolve_identity: systems.clone(),
            read_device_key: systems,
        }
    }
}

impl AccessList {
    fn allowed(&self, operation: Operation) -> &[Component] {
        match operation {
            Operation::ResolveIdentity => &self.resolve_identity,
            Operation::ReadDeviceKey => &self.read_device_key,
        }
    }

    /// Check that `component` may invoke `operation`.
    pub fn check(&self, operation: Operation, component: Component) -> Result<(), AccessError> {
        if self.allowed(operation).contains(&component) {
            Ok(())
        } else {
            Err(AccessError::Denied {
                operation,
                component,
            })
        }
    }

    /// Reject lists that open a restricted operation to external callers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for op in [Operation::ResolveIdentity, Operation::ReadDeviceKey] {
            if self.allowed(op).contains(&Component::External) {
                return Err(ConfigError::OpenCapability(op));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_systems() {
        let acl = AccessList::default();
        for c in [
            Component::RegisterSystem,
            Component::YellSystem,
            Component::ClaimSystem,
        ] {
            assert!(acl.check(Operation::ResolveIdentity, c).is_ok());
            assert!(acl.check(Operation::ReadDeviceKey, c).is_ok());
        }
    }

    #[test]
    fn default_denies_external() {
        let acl = AccessList::default();
        assert_eq!(
            acl.check(Operation::ResolveIdentity, Component::External),
            Err(AccessError::Denied {
                operation: Operation::ResolveIdentity,
                component: Component::External,
            })
        );
    }

    #[test]
    fn narrowed_list_denies_dropped_component() {
        let acl = AccessList {
            resolve_identity: vec![Component::RegisterSystem],
            ..AccessList::default()
        };
        assert!(acl.check(Operation::ResolveIdentity, Component::YellSystem).is_err());
        assert!(acl.check(Operation::ReadDeviceKey, Component::YellSystem).is_ok());
    }

    #[test]
    fn validate_rejects_external() {
        let acl = AccessList {
            read_device_key: vec![Component::External],
            ..AccessList::default()
        };
        assert_eq!(
            acl.validate(),
            Err(ConfigError::OpenCapability(Operation::ReadDeviceKey))
        );
        assert!(AccessList::default().validate().is_ok());
    }

    #[test]
    fn denial_message_names_both_sides() {
        let err = AccessList::default()
            .check(Operation::ReadDeviceKey, Component::External)
            .unwrap_err();
        assert_eq!(err.to_string(), "external may not invoke read_device_key");
    }

    #[test]
    fn components_deserialize_snake_case() {
        let c: Component = serde_json::from_str("\"yell_system\"").unwrap();
        assert_eq!(c, Component::YellSystem);
    }
}
