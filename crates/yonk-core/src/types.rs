//! Core protocol types: identities, transfers, escrow slots.
//!
//! Values are 256-bit [`Amount`]s. Times and lifetimes are Unix seconds
//! in `u64`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use crate::amount::Amount;
use crate::constants::ADDRESS_LEN;
use crate::crypto::DevicePublicKey;
use crate::error::DecayError;

/// Sequential numeric identity.
pub type IdentityId = u64;

/// Sequential transfer ("yonk") id.
pub type TransferId = u64;

/// Serde adapter encoding fixed-size byte arrays as hex strings.
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex_array(&s).map_err(serde::de::Error::custom)
    }
}

/// Decode a hex string (optional `0x` prefix) into exactly `N` bytes.
pub fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| e.to_string())?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| format!("expected {N} bytes, got {len}"))
}

/// A 32-byte hash value.
///
/// Used for message digests, authorization challenges and the off-chain
/// data commitment carried by each transfer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(#[serde(with = "hex_array")] pub [u8; 32]);

impl Hash256 {
    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Hash256 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_array(s).map(Self)
    }
}

/// A 20-byte account address.
///
/// Either the controlling address of a registered identity or the
/// address derived from an ephemeral owner's key.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(#[serde(with = "hex_array")] pub [u8; ADDRESS_LEN]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_array(s).map(Self)
    }
}

/// A registered identity. Immutable once created.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub device_key: DevicePublicKey,
    pub controlling_address: Option<Address>,
}

/// Who a transfer is addressed to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// A registered identity.
    Identity(IdentityId),
    /// An escrow slot owned by a one-time key, released later by signature.
    Ephemeral(Address),
}

impl Recipient {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral(_))
    }
}

/// Target named by a sender when creating a transfer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum YellTarget {
    Identity(IdentityId),
    /// The public half of a one-time key handed to the recipient out of band.
    Ephemeral(DevicePublicKey),
}

/// Terms of a transfer as proposed by its sender.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct YellTerms {
    pub target: YellTarget,
    pub data_commitment: Hash256,
    pub start_value: Amount,
    pub end_value: Amount,
    pub life_seconds: u64,
}

/// Linear decay parameters of a single transfer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecayParams {
    pub start_value: Amount,
    pub end_value: Amount,
    pub life_seconds: u64,
    pub start_timestamp: u64,
}

impl DecayParams {
    /// First instant at which the transfer counts as expired.
    pub fn expires_at(&self) -> Result<u64, DecayError> {
        self.start_timestamp
            .checked_add(self.life_seconds)
            .ok_or(DecayError::ArithmeticOverflow)
    }

    /// Whether the transfer is expired at `now`.
    pub fn is_expired(&self, now: u64) -> Result<bool, DecayError> {
        Ok(now >= self.expires_at()?)
    }
}

/// How a claimed value splits between the claimant and the residual pool.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ClaimSplit {
    /// Paid to the claimant.
    pub claimed: Amount,
    /// Decayed away; burned into the residual pool.
    pub returned: Amount,
}

/// Settlement state of a transfer. Terminal once it leaves `Pending`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Claimed { by: IdentityId, payout: Amount, returned: Amount, at: u64 },
    Reclaimed { residual: Amount, at: u64 },
}

impl TransferStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// An outstanding or settled decaying-value transfer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub id: TransferId,
    pub data_commitment: Hash256,
    pub decay: DecayParams,
    pub from: IdentityId,
    pub to: Recipient,
    pub status: TransferStatus,
}

impl Transfer {
    pub fn claimed(&self) -> bool {
        matches!(self.status, TransferStatus::Claimed { .. })
    }

    pub fn reclaimed(&self) -> bool {
        matches!(self.status, TransferStatus::Reclaimed { .. })
    }

    pub fn is_to_ephemeral_owner(&self) -> bool {
        self.to.is_ephemeral()
    }
}

/// Escrow slot backing a transfer addressed to an ephemeral owner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EphemeralOwner {
    /// Same as the id of the transfer it backs.
    pub id: TransferId,
    pub address: Address,
    pub key: DevicePublicKey,
    pub released_to: Option<IdentityId>,
}

/// Record of a state change, appended by the ledger.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Created { id: TransferId, from: IdentityId, to: Recipient, start_value: Amount, at: u64 },
    Released { id: TransferId, to: IdentityId },
    Claimed { id: TransferId, by: IdentityId, claimed: Amount, returned: Amount, at: u64 },
    Reclaimed { id: TransferId, by: IdentityId, residual: Amount, at: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_display_is_lowercase_hex() {
        let h = Hash256([0xAB; 32]);
        assert_eq!(h.to_string(), "ab".repeat(32));
    }

    #[test]
    fn hash_from_str_accepts_prefix() {
        let hex = format!("0x{}", "01".repeat(32));
        let h: Hash256 = hex.parse().unwrap();
        assert_eq!(h, Hash256([1; 32]));
    }

    #[test]
    fn hash_from_str_rejects_wrong_length() {
        let err = "abcd".parse::<Hash256>().unwrap_err();
        assert!(err.contains("expected 32 bytes"), "{err}");
    }

    #[test]
    fn address_serde_json_is_hex_string() {
        let a = Address([0x11; 20]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", "11".repeat(20)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn address_display_has_prefix() {
        assert!(Address([0; 20]).to_string().starts_with("0x"));
    }

    #[test]
    fn expires_at_overflow_detected() {
        let p = DecayParams {
            start_value: Amount::from_u64(1),
            end_value: Amount::ZERO,
            life_seconds: u64::MAX,
            start_timestamp: 2,
        };
        assert_eq!(p.expires_at(), Err(DecayError::ArithmeticOverflow));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let p = DecayParams {
            start_value: Amount::from_u64(10),
            end_value: Amount::ZERO,
            life_seconds: 100,
            start_timestamp: 1_000,
        };
        assert!(!p.is_expired(1_099).unwrap());
        assert!(p.is_expired(1_100).unwrap());
    }

    #[test]
    fn transfer_status_views() {
        let mut t = Transfer {
            id: 1,
            data_commitment: Hash256::ZERO,
            decay: DecayParams {
                start_value: Amount::from_u64(10),
                end_value: Amount::ZERO,
                life_seconds: 10,
                start_timestamp: 0,
            },
            from: 1,
            to: Recipient::Identity(2),
            status: TransferStatus::Pending,
        };
        assert!(!t.claimed() && !t.reclaimed());
        t.status = TransferStatus::Reclaimed { residual: Amount::ZERO, at: 10 };
        assert!(t.reclaimed() && !t.claimed());
        assert!(!t.is_to_ephemeral_owner());
    }
}
