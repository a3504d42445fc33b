//! P-256 test-vector records.
//!
//! One JSON object per line with hex fields
//! `{x, y, r, s, hash, valid, msg}`: public key coordinates, signature
//! scalars (canonicalized so `s <= n/2`), the SHA-256 digest of `msg`, the
//! expected verdict, and the signed message.

use serde::{Deserialize, Serialize};
use std::io::BufRead;

use crate::crypto::{self, DevicePublicKey, Signature};
use crate::error::{SignatureError, VectorError};
use crate::types::{decode_hex_array, Hash256};

/// A vector as it appears on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TestVector {
    pub x: String,
    pub y: String,
    pub r: String,
    pub s: String,
    pub hash: String,
    pub valid: bool,
    pub msg: String,
}

/// A vector with every hex field decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedVector {
    pub key: DevicePublicKey,
    pub signature: Signature,
    pub hash: Hash256,
    pub valid: bool,
    pub msg: Vec<u8>,
}

/// Result of checking one decoded vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorOutcome {
    /// Verifier verdict on the vector as given.
    pub verdict: Result<(), SignatureError>,
    /// Whether the verdict agrees with the vector's `valid` flag.
    pub agrees: bool,
    /// Whether `hash == SHA-256(msg)`.
    pub hash_matches_msg: bool,
    /// Verifier verdict on the `(r, n - s)` twin, when `s` is in range.
    pub twin_verdict: Option<Result<(), SignatureError>>,
}

fn field<const N: usize>(name: &'static str, value: &str) -> Result<[u8; N], VectorError> {
    decode_hex_array(value).map_err(|message| VectorError::Hex {
        field: name,
        message,
    })
}

impl TestVector {
    pub fn decode(&self) -> Result<DecodedVector, VectorError> {
        let msg = hex::decode(self.msg.strip_prefix("0x").unwrap_or(&self.msg)).map_err(|e| {
            VectorError::Hex {
                field: "msg",
                message: e.to_string(),
            }
        })?;
        Ok(DecodedVector {
            key: DevicePublicKey::from_coordinates(field("x", &self.x)?, field("y", &self.y)?),
            signature: Signature {
                r: field("r", &self.r)?,
                s: field("s", &self.s)?,
            },
            hash: Hash256(field("hash", &self.hash)?),
            valid: self.valid,
            msg,
        })
    }
}

impl DecodedVector {
    /// Run the verifier on the vector and on its high-S twin.
    pub fn check(&self) -> VectorOutcome {
        let verdict = crypto::check_signature(&self.key, &self.hash, &self.signature);
        let twin_verdict = self
            .signature
            .negate_s()
            .ok()
            .map(|twin| crypto::check_signature(&self.key, &self.hash, &twin));
        VectorOutcome {
            verdict,
            agrees: verdict.is_ok() == self.valid,
            hash_matches_msg: crypto::sha256(&self.msg) == self.hash,
            twin_verdict,
        }
    }
}

/// Parse newline-delimited vectors, skipping blank lines.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<Vec<TestVector>, VectorError> {
    let mut out = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| VectorError::Io(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let vector = serde_json::from_str(&line).map_err(|e| VectorError::Json {
            line: index + 1,
            message: e.to_string(),
        })?;
        out.push(vector);
    }
    Ok(out)
}
