//! Shared helpers for the integration tests.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use yonk_core::config::WorldConfig;
use yonk_core::crypto::DeviceKeyPair;
use yonk_core::traits::ManualClock;
use yonk_core::types::{Address, Amount, Hash256, IdentityId, YellTarget, YellTerms};
use yonk_core::vectors::{self, TestVector};
use yonk_world::{Caller, World};

/// Start time of every test world.
pub const T0: u64 = 1_700_000_000;

/// Deterministic key pair from a seed byte in `1..=254`.
pub fn keypair(seed: u8) -> DeviceKeyPair {
    DeviceKeyPair::from_secret_bytes([seed; 32]).expect("seed is a valid scalar")
}

/// Controlling address derived from a seed byte.
pub fn address(seed: u8) -> Address {
    Address([seed; 20])
}

/// A world driven by a manual clock.
pub struct TestWorld {
    pub world: World,
    pub clock: Arc<ManualClock>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let world = World::new(config, clock.clone()).expect("valid config");
        Self { world, clock }
    }

    /// Register the key of `seed` bound to `address(seed)`.
    pub fn register(&self, seed: u8) -> IdentityId {
        self.world
            .register(keypair(seed).public_key(), Some(address(seed)), None)
            .expect("registration")
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(secs);
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller acting through the controlling address of `seed`.
pub fn by_address(seed: u8) -> Caller {
    Caller::Address(address(seed))
}

pub fn amount(n: u64) -> Amount {
    Amount::from_u64(n)
}

/// Transfer terms with a fixed data commitment.
pub fn terms(target: YellTarget, start: u64, end: u64, life: u64) -> YellTerms {
    wide_terms(target, amount(start), amount(end), life)
}

/// Like [`terms`], for values beyond 64 bits.
pub fn wide_terms(target: YellTarget, start: Amount, end: Amount, life: u64) -> YellTerms {
    YellTerms {
        target,
        data_commitment: Hash256([0x5A; 32]),
        start_value: start,
        end_value: end,
        life_seconds: life,
    }
}

/// Path of a file under `fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join(name)
}

/// Load a JSONL vector fixture.
pub fn load_vectors(name: &str) -> Vec<TestVector> {
    let file = File::open(fixture_path(name)).expect("fixture exists");
    vectors::parse_jsonl(BufReader::new(file)).expect("fixture parses")
}
