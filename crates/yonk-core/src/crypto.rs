//! P-256 (secp256r1) ECDSA verification for device-bound keys.
//!
//! Verification is stricter than plain ECDSA: a signature is only accepted in
//! its canonical low-S form (`s <= n/2`). The high-S twin `(r, n - s)` of a
//! valid signature verifies mathematically but is rejected, so each
//! authorization has exactly one accepted encoding.
//!
//! The curve arithmetic comes from the `p256` crate. Scalar range checks,
//! the low-S check and the final `x(R) == r` comparison run in constant time.

use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::elliptic_curve::group::Group;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::point::AffineCoordinates;
use p256::elliptic_curve::scalar::IsHigh;
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::elliptic_curve::subtle::ConstantTimeEq;
use p256::elliptic_curve::{Field, PrimeField};
use p256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::constants::ADDRESS_LEN;
use crate::error::SignatureError;
use crate::types::{decode_hex_array, hex_array, Address, Hash256};

/// Uncompressed P-256 public key as its two affine coordinates.
///
/// Construction does not check that the point lies on the curve; use
/// [`DevicePublicKey::validate`] (the registry does so on registration).
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePublicKey {
    #[serde(with = "hex_array")]
    pub x: [u8; 32],
    #[serde(with = "hex_array")]
    pub y: [u8; 32],
}

impl DevicePublicKey {
    pub fn from_coordinates(x: [u8; 32], y: [u8; 32]) -> Self {
        Self { x, y }
    }

    /// Decode to a curve point, rejecting coordinates that are off the curve.
    pub fn to_affine(&self) -> Result<AffinePoint, SignatureError> {
        let encoded = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&self.x),
            FieldBytes::from_slice(&self.y),
            false,
        );
        Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or(SignatureError::InvalidPublicKey)
    }

    pub fn validate(&self) -> Result<(), SignatureError> {
        self.to_affine().map(|_| ())
    }

    /// Account address of this key: the last 20 bytes of `SHA-256(x || y)`.
    pub fn address(&self) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(self.x);
        hasher.update(self.y);
        let digest = hasher.finalize();
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Address(out)
    }
}

impl fmt::Debug for DevicePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePublicKey({}..)", &hex::encode(self.x)[..16])
    }
}

impl fmt::Display for DevicePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", hex::encode(self.x), hex::encode(self.y))
    }
}

impl FromStr for DevicePublicKey {
    type Err = String;

    /// Parses `x || y` as 128 hex characters, with an optional SEC1 `04` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let s = if s.len() == 130 { s.strip_prefix("04").unwrap_or(s) } else { s };
        let bytes: [u8; 64] = decode_hex_array(s)?;
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(&bytes[..32]);
        y.copy_from_slice(&bytes[32..]);
        Ok(Self { x, y })
    }
}

/// Raw ECDSA signature `(r, s)`, each a big-endian 32-byte integer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    #[serde(with = "hex_array")]
    pub r: [u8; 32],
    #[serde(with = "hex_array")]
    pub s: [u8; 32],
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self { r, s }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }

    /// The twin signature `(r, n - s)`.
    pub fn negate_s(&self) -> Result<Self, SignatureError> {
        let s = parse_scalar(&self.s, SignatureError::ZeroS, SignatureError::SOutOfRange)?;
        Ok(Self {
            r: self.r,
            s: scalar_bytes(&-s),
        })
    }

    /// The low-S representative of this signature.
    pub fn to_canonical(&self) -> Result<Self, SignatureError> {
        let s = parse_scalar(&self.s, SignatureError::ZeroS, SignatureError::SOutOfRange)?;
        if bool::from(s.is_high()) {
            self.negate_s()
        } else {
            Ok(*self)
        }
    }
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(data).into())
}

fn scalar_bytes(scalar: &Scalar) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&scalar.to_repr());
    out
}

/// Parse a big-endian integer as a non-zero scalar below `n`.
fn parse_scalar(
    bytes: &[u8; 32],
    zero: SignatureError,
    out_of_range: SignatureError,
) -> Result<Scalar, SignatureError> {
    let scalar = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
        .ok_or(out_of_range)?;
    if bool::from(scalar.is_zero()) {
        return Err(zero);
    }
    Ok(scalar)
}

/// Verify `signature` over the 32-byte digest `hash`, naming the rejection reason.
pub fn check_signature(
    key: &DevicePublicKey,
    hash: &Hash256,
    signature: &Signature,
) -> Result<(), SignatureError> {
    let r = parse_scalar(&signature.r, SignatureError::ZeroR, SignatureError::ROutOfRange)?;
    let s = parse_scalar(&signature.s, SignatureError::ZeroS, SignatureError::SOutOfRange)?;
    if bool::from(s.is_high()) {
        return Err(SignatureError::HighS);
    }
    let q = key.to_affine()?;

    let z = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(hash.as_bytes()));
    let s_inv = Option::<Scalar>::from(s.invert()).ok_or(SignatureError::ZeroS)?;
    let u1 = z * s_inv;
    let u2 = r * s_inv;

    let point = ProjectivePoint::GENERATOR * u1 + ProjectivePoint::from(q) * u2;
    if bool::from(point.is_identity()) {
        return Err(SignatureError::Mismatch);
    }
    let x = <Scalar as Reduce<U256>>::reduce_bytes(&point.to_affine().x());

    if bool::from(x.ct_eq(&r)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify a canonical P-256 signature over `hash`.
pub fn verify(key: &DevicePublicKey, hash: &Hash256, signature: &Signature) -> bool {
    check_signature(key, hash, signature).is_ok()
}

/// Verify a signature over `SHA-256(message)`.
pub fn verify_message(key: &DevicePublicKey, message: &[u8], signature: &Signature) -> bool {
    verify(key, &sha256(message), signature)
}

/// P-256 signing key held by a device.
///
/// Wraps [`p256::ecdsa::SigningKey`]. Signatures are always emitted in
/// canonical low-S form so they pass [`verify`].
pub struct DeviceKeyPair {
    signing_key: p256::ecdsa::SigningKey,
}

impl DeviceKeyPair {
    /// Generate a random keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: p256::ecdsa::SigningKey::random(&mut csprng),
        }
    }

    /// Create a keypair from a 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        let signing_key = p256::ecdsa::SigningKey::from_slice(&bytes)
            .map_err(|_| SignatureError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Big-endian secret scalar, for export by key-management tooling.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    pub fn public_key(&self) -> DevicePublicKey {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        // Uncompressed encoding of a non-identity point always carries both coordinates.
        if let (Some(px), Some(py)) = (point.x(), point.y()) {
            x.copy_from_slice(px);
            y.copy_from_slice(py);
        }
        DevicePublicKey { x, y }
    }

    /// Sign a 32-byte digest, returning the low-S signature.
    pub fn sign_hash(&self, hash: &Hash256) -> Result<Signature, SignatureError> {
        let sig: p256::ecdsa::Signature = self
            .signing_key
            .sign_prehash(hash.as_bytes())
            .map_err(|_| SignatureError::SigningFailed)?;
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(&sig.to_bytes());
        Signature::from_bytes(&bytes).to_canonical()
    }

    /// Sign `SHA-256(message)`.
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature, SignatureError> {
        self.sign_hash(&sha256(message))
    }
}

impl fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}
