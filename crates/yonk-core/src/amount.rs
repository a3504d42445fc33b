//! 256-bit transfer values.
//!
//! [`Amount`] wraps the curve crate's [`U256`]. All arithmetic is checked;
//! the decay product goes through a 512-bit intermediate so no span/elapsed
//! pair can overflow. Text and JSON use decimal strings; `0x`-prefixed hex
//! and plain JSON integers are accepted on input.

use std::fmt;
use std::str::FromStr;

use p256::elliptic_curve::bigint::{
    CheckedAdd, CheckedMul, CheckedSub, Encoding, NonZero, U256, U512,
};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::decode_hex_array;

/// An unsigned 256-bit value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(U256);

impl Amount {
    pub const ZERO: Self = Self(U256::ZERO);
    pub const MAX: Self = Self(U256::MAX);

    pub const fn from_u64(n: u64) -> Self {
        Self(U256::from_u64(n))
    }

    pub const fn from_u128(n: u128) -> Self {
        Self(U256::from_u128(n))
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(U256::from_be_bytes(bytes))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    /// `2^exp`, or `None` if `exp >= 256`.
    pub fn pow2(exp: u32) -> Option<Self> {
        if exp >= 256 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes[31 - (exp / 8) as usize] = 1 << (exp % 8);
        Some(Self::from_be_bytes(bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == U256::ZERO
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Option::<U256>::from(self.0.checked_add(&rhs.0)).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        Option::<U256>::from(self.0.checked_sub(&rhs.0)).map(Self)
    }

    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        Option::<U256>::from(self.0.checked_mul(&rhs.0)).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(&rhs.0))
    }

    /// `floor(self * num / den)` computed over 512 bits.
    ///
    /// `None` if `den` is zero or the quotient does not fit in 256 bits.
    pub fn mul_div_floor(self, num: u64, den: u64) -> Option<Self> {
        let den = Option::<NonZero<U512>>::from(NonZero::new(U512::from_u64(den)))?;
        let (lo, hi) = self.0.mul_wide(&U256::from_u64(num));
        let (quotient, _) = hi.concat(&lo).div_rem(&den);
        let (q_hi, q_lo) = quotient.split();
        (q_hi == U256::ZERO).then_some(Self(q_lo))
    }
}

impl From<u64> for Amount {
    fn from(n: u64) -> Self {
        Self::from_u64(n)
    }
}

impl From<u128> for Amount {
    fn from(n: u128) -> Self {
        Self::from_u128(n)
    }
}

impl TryFrom<Amount> for u64 {
    type Error = String;

    fn try_from(amount: Amount) -> Result<Self, Self::Error> {
        let bytes = amount.to_be_bytes();
        if bytes[..24].iter().any(|&b| b != 0) {
            return Err(format!("{amount} does not fit in 64 bits"));
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&bytes[24..]);
        Ok(u64::from_be_bytes(low))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Repeated long division of the big-endian bytes by ten.
        let mut n = self.to_be_bytes();
        let mut digits = Vec::with_capacity(78);
        loop {
            let mut rem = 0u16;
            for byte in n.iter_mut() {
                let cur = (rem << 8) | u16::from(*byte);
                *byte = (cur / 10) as u8;
                rem = cur % 10;
            }
            digits.push(b'0' + rem as u8);
            if n.iter().all(|&b| b == 0) {
                break;
            }
        }
        let s: String = digits.iter().rev().map(|&d| char::from(d)).collect();
        f.pad_integral(true, "", &s)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x") {
            if hex.is_empty() || hex.len() > 64 {
                return Err(format!("expected 1 to 64 hex digits, got {}", hex.len()));
            }
            return decode_hex_array(&format!("{hex:0>64}")).map(Self::from_be_bytes);
        }
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid amount {s:?}"));
        }
        let ten = Self::from_u64(10);
        s.bytes()
            .try_fold(Self::ZERO, |acc, b| {
                acc.checked_mul(ten)?
                    .checked_add(Self::from_u64(u64::from(b - b'0')))
            })
            .ok_or_else(|| format!("amount {s} exceeds 256 bits"))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal or 0x-hex string, or an unsigned integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount::from_u64(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        u64::try_from(v)
            .map(Amount::from_u64)
            .map_err(|_| E::custom(format!("negative amount {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse().map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX_DECIMAL: &str =
        "115792089237316195423570985008687907853269984665640564039457584007913129639935";

    #[test]
    fn display_is_decimal() {
        assert_eq!(Amount::ZERO.to_string(), "0");
        assert_eq!(Amount::from_u64(1_000).to_string(), "1000");
        assert_eq!(Amount::from_u128(u128::MAX).to_string(), u128::MAX.to_string());
        assert_eq!(Amount::MAX.to_string(), MAX_DECIMAL);
    }

    #[test]
    fn display_honours_width() {
        assert_eq!(format!("{:>6}", Amount::from_u64(42)), "    42");
    }

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!("1000".parse::<Amount>().unwrap(), Amount::from_u64(1000));
        assert_eq!("0x3e8".parse::<Amount>().unwrap(), Amount::from_u64(1000));
        assert_eq!(MAX_DECIMAL.parse::<Amount>().unwrap(), Amount::MAX);
        assert_eq!(format!("0x{}", "ff".repeat(32)).parse::<Amount>().unwrap(), Amount::MAX);
    }

    #[test]
    fn rejects_bad_text() {
        assert!("".parse::<Amount>().is_err());
        assert!("-1".parse::<Amount>().is_err());
        assert!("12a".parse::<Amount>().is_err());
        assert!("0x".parse::<Amount>().is_err());
        assert!(format!("0x1{}", "0".repeat(64)).parse::<Amount>().is_err());
        // MAX + 1
        let over = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(over.parse::<Amount>().unwrap_err().contains("exceeds 256 bits"));
    }

    #[test]
    fn pow2_matches_shifts() {
        assert_eq!(Amount::pow2(0), Some(Amount::from_u64(1)));
        assert_eq!(Amount::pow2(64), Some(Amount::from_u128(1 << 64)));
        assert_eq!(Amount::pow2(255).unwrap().to_be_bytes()[0], 0x80);
        assert_eq!(Amount::pow2(256), None);
    }

    #[test]
    fn checked_ops_detect_overflow() {
        let one = Amount::from_u64(1);
        assert_eq!(Amount::MAX.checked_add(one), None);
        assert_eq!(Amount::ZERO.checked_sub(one), None);
        assert_eq!(Amount::pow2(128).unwrap().checked_mul(Amount::pow2(128).unwrap()), None);
        assert_eq!(Amount::MAX.saturating_add(one), Amount::MAX);
    }

    #[test]
    fn mul_div_uses_wide_product() {
        // MAX * (2^64 - 1) / (2^64 - 1) overflows 256 bits mid-way but not at the end.
        assert_eq!(Amount::MAX.mul_div_floor(u64::MAX, u64::MAX), Some(Amount::MAX));
        let half = Amount::pow2(255).unwrap().checked_sub(Amount::from_u64(1));
        assert_eq!(Amount::MAX.mul_div_floor(1, 2), half);
        assert_eq!(Amount::MAX.mul_div_floor(2, 1), None);
        assert_eq!(Amount::from_u64(10).mul_div_floor(1, 3), Some(Amount::from_u64(3)));
        assert_eq!(Amount::from_u64(10).mul_div_floor(1, 0), None);
    }

    #[test]
    fn u64_conversion_checks_width() {
        assert_eq!(u64::try_from(Amount::from_u64(u64::MAX)), Ok(u64::MAX));
        assert!(u64::try_from(Amount::pow2(64).unwrap()).is_err());
    }

    #[test]
    fn serde_json_uses_decimal_strings() {
        let a = Amount::pow2(200).unwrap();
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{a}\""));
        assert_eq!(serde_json::from_str::<Amount>(&json).unwrap(), a);
        assert_eq!(serde_json::from_str::<Amount>("1000").unwrap(), Amount::from_u64(1000));
        assert_eq!(serde_json::from_str::<Amount>("\"0x10\"").unwrap(), Amount::from_u64(16));
        assert!(serde_json::from_str::<Amount>("-5").is_err());
    }

    fn arb_amount() -> impl Strategy<Value = Amount> {
        any::<[u8; 32]>().prop_map(Amount::from_be_bytes)
    }

    proptest! {
        #[test]
        fn text_round_trips(a in arb_amount()) {
            prop_assert_eq!(a.to_string().parse::<Amount>().unwrap(), a);
        }

        #[test]
        fn small_values_agree_with_u128(x in any::<u64>(), num in any::<u64>(), den in 1u64..) {
            let expected = u128::from(x) * u128::from(num) / u128::from(den);
            prop_assert_eq!(
                Amount::from_u64(x).mul_div_floor(num, den),
                Some(Amount::from_u128(expected))
            );
        }

        #[test]
        fn fraction_of_a_large_value_stays_in_range(a in arb_amount(), den in 1u64.., num_frac in 0u64..=1_000) {
            let num = ((u128::from(den) * u128::from(num_frac)) / 1_000) as u64;
            let q = a.mul_div_floor(num, den).unwrap();
            prop_assert!(q <= a);
        }
    }
}
