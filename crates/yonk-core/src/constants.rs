//! Protocol constants.

/// Order `n` of the P-256 base point, big-endian.
pub const P256_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xBC, 0xE6, 0xFA, 0xAD, 0xA7, 0x17, 0x9E, 0x84, 0xF3, 0xB9, 0xCA, 0xC2, 0xFC, 0x63, 0x25, 0x51,
];

/// `floor(n / 2)`, the largest `s` accepted by the canonical low-S rule.
pub const P256_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0x80, 0x00, 0x00, 0x00, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xDE, 0x73, 0x7D, 0x56, 0xD3, 0x8B, 0xCF, 0x42, 0x79, 0xDC, 0xE5, 0x61, 0x7E, 0x31, 0x92, 0xA8,
];

/// Length of an account address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// First identity id handed out by a fresh registry.
pub const DEFAULT_FIRST_IDENTITY_ID: u64 = 1;

/// First transfer id handed out by a fresh ledger.
pub const FIRST_TRANSFER_ID: u64 = 1;

/// Domain mixed into every authorization challenge unless configured otherwise.
pub const DEFAULT_DOMAIN: &str = "yonk-local";

/// Upper bound on a transfer's lifetime: one year.
pub const DEFAULT_MAX_LIFE_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Challenge tags. Each operation signs a digest under its own tag.
pub const TAG_REGISTER: &[u8] = b"yonk/register/v1";
pub const TAG_YELL: &[u8] = b"yonk/yell/v1";
pub const TAG_CLAIM: &[u8] = b"yonk/claim/v1";
pub const TAG_RECLAIM: &[u8] = b"yonk/reclaim/v1";
pub const TAG_RELEASE: &[u8] = b"yonk/release/v1";
/// Signed by the claimant's device when taking delivery of a released slot.
pub const TAG_ACCEPT_RELEASE: &[u8] = b"yonk/accept-release/v1";
