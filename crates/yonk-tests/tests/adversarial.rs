//! Adversarial tests against the verifier and the world executor.
//!
//! Attack vectors tested:
//! - Signature malleation and random garbage signatures
//! - Replay of device signatures across transfers, operations and domains
//! - Settling a transfer twice, or both claiming and reclaiming it
//! - Settling someone else's transfer
//! - Racing claims and reclaims from many threads

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use yonk_core::challenge::{
    accept_release_challenge, claim_challenge, reclaim_challenge, release_challenge,
};
use yonk_core::config::WorldConfig;
use yonk_core::crypto::{self, Signature};
use yonk_core::error::{LedgerError, SignatureError, YonkError};
use yonk_core::types::{Hash256, YellTarget};
use yonk_tests::helpers::*;
use yonk_world::Caller;

fn settled(result: &Result<impl std::fmt::Debug, YonkError>) -> bool {
    matches!(result, Err(YonkError::Ledger(LedgerError::AlreadySettled(_))))
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_signatures_never_verify(r in any::<[u8; 32]>(), s in any::<[u8; 32]>()) {
        let kp = keypair(11);
        let hash = crypto::sha256(b"fixed message");
        let sig = Signature { r, s };
        prop_assert!(!crypto::verify(&kp.public_key(), &hash, &sig));
    }

    #[test]
    fn signed_digests_verify_and_twins_do_not(digest in any::<[u8; 32]>(), seed in 1u8..=254) {
        let kp = keypair(seed);
        let hash = Hash256(digest);
        let sig = kp.sign_hash(&hash).unwrap();
        prop_assert!(crypto::verify(&kp.public_key(), &hash, &sig));
        prop_assert_eq!(
            crypto::check_signature(&kp.public_key(), &hash, &sig.negate_s().unwrap()),
            Err(SignatureError::HighS)
        );
    }
}

#[test]
fn claim_signature_cannot_be_replayed_on_another_transfer() {
    let tw = TestWorld::new();
    tw.register(1);
    let bob = tw.register(2);
    let first = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Identity(bob), 100, 0, 100))
        .unwrap();
    let second = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Identity(bob), 100, 0, 100))
        .unwrap();

    let sig = keypair(2)
        .sign_hash(&claim_challenge(&tw.world.domain(), first, bob))
        .unwrap();
    let caller = Caller::Device { id: bob, signature: sig };
    assert!(matches!(
        tw.world.claim(&caller, second),
        Err(YonkError::Authentication { .. })
    ));
    assert!(tw.world.claim(&caller, first).is_ok());
}

#[test]
fn claim_signature_cannot_authorize_reclaim() {
    let tw = TestWorld::new();
    let alice = tw.register(1);
    let bob = tw.register(2);
    let id = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Identity(bob), 100, 0, 10))
        .unwrap();
    tw.advance(10);

    let wrong_op = keypair(1)
        .sign_hash(&claim_challenge(&tw.world.domain(), id, alice))
        .unwrap();
    assert!(matches!(
        tw.world.reclaim(&Caller::Device { id: alice, signature: wrong_op }, id),
        Err(YonkError::Authentication { .. })
    ));

    let right_op = keypair(1)
        .sign_hash(&reclaim_challenge(&tw.world.domain(), id, alice))
        .unwrap();
    assert!(tw
        .world
        .reclaim(&Caller::Device { id: alice, signature: right_op }, id)
        .is_ok());
}

#[test]
fn signatures_do_not_cross_domains() {
    let other = TestWorld::with_config(WorldConfig {
        domain: "other-deployment".into(),
        ..WorldConfig::default()
    });
    let tw = TestWorld::new();
    for w in [&tw, &other] {
        w.register(1);
        w.register(2);
        w.world
            .yell(&by_address(1), &terms(YellTarget::Identity(2), 100, 0, 100))
            .unwrap();
    }

    let sig = keypair(2)
        .sign_hash(&claim_challenge(&other.world.domain(), 1, 2))
        .unwrap();
    let caller = Caller::Device { id: 2, signature: sig };
    assert!(matches!(
        tw.world.claim(&caller, 1),
        Err(YonkError::Authentication { .. })
    ));
    assert!(other.world.claim(&caller, 1).is_ok());
}

#[test]
fn release_authorization_bound_to_transfer() {
    let tw = TestWorld::new();
    tw.register(1);
    let bob = tw.register(2);
    let eph = keypair(150);
    let a = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Ephemeral(eph.public_key()), 100, 0, 100))
        .unwrap();
    let b = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Ephemeral(eph.public_key()), 100, 0, 100))
        .unwrap();

    let auth_a = eph
        .sign_hash(&release_challenge(&tw.world.domain(), a, bob))
        .unwrap();
    assert!(tw.world.release(&by_address(2), b, &auth_a).is_err());
    assert!(tw.world.release(&by_address(2), a, &auth_a).is_ok());
}

#[test]
fn claim_signature_cannot_accept_a_release() {
    let tw = TestWorld::new();
    tw.register(1);
    let bob = tw.register(2);
    let eph = keypair(151);
    let id = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Ephemeral(eph.public_key()), 100, 0, 100))
        .unwrap();
    let auth = eph
        .sign_hash(&release_challenge(&tw.world.domain(), id, bob))
        .unwrap();

    let domain = tw.world.domain();
    let claim_sig = keypair(2).sign_hash(&claim_challenge(&domain, id, bob)).unwrap();
    assert!(matches!(
        tw.world.release(&Caller::Device { id: bob, signature: claim_sig }, id, &auth),
        Err(YonkError::Authentication { .. })
    ));

    let accept_sig = keypair(2)
        .sign_hash(&accept_release_challenge(&domain, id, bob))
        .unwrap();
    assert!(tw
        .world
        .release(&Caller::Device { id: bob, signature: accept_sig }, id, &auth)
        .is_ok());
}

#[test]
fn high_s_device_signature_rejected() {
    let tw = TestWorld::new();
    tw.register(1);
    let bob = tw.register(2);
    let id = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Identity(bob), 100, 0, 100))
        .unwrap();
    let sig = keypair(2)
        .sign_hash(&claim_challenge(&tw.world.domain(), id, bob))
        .unwrap()
        .negate_s()
        .unwrap();
    assert!(matches!(
        tw.world.claim(&Caller::Device { id: bob, signature: sig }, id),
        Err(YonkError::Authentication { source: SignatureError::HighS, .. })
    ));
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[test]
fn third_party_cannot_settle() {
    let tw = TestWorld::new();
    tw.register(1);
    let bob = tw.register(2);
    tw.register(3);
    let id = tw
        .world
        .yell(&by_address(1), &terms(YellTarget::Identity(bob), 100, 0, 10))
        .unwrap();
    assert!(matches!(
        tw.world.claim(&by_address(3), id),
        Err(YonkError::Ledger(LedgerError::Unauthorized { caller: 3, .. }))
    ));
    tw.advance(10);
    assert!(matches!(
        tw.world.reclaim(&by_address(3), id),
        Err(YonkError::Ledger(LedgerError::Unauthorized { caller: 3, .. }))
    ));
    assert!(matches!(
        tw.world.reclaim(&by_address(2), id),
        Err(YonkError::Ledger(LedgerError::Unauthorized { caller: 2, .. }))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the timing, exactly one settlement succeeds.
    #[test]
    fn claim_and_reclaim_mutually_exclusive(
        life in 1u64..1_000,
        steps in proptest::collection::vec((0u64..400, any::<bool>()), 1..12),
    ) {
        let tw = TestWorld::new();
        tw.register(1);
        let bob = tw.register(2);
        let id = tw
            .world
            .yell(&by_address(1), &terms(YellTarget::Identity(bob), 1_000, 10, life))
            .unwrap();

        let mut successes = 0;
        for (advance, try_claim) in steps {
            tw.advance(advance);
            let ok = if try_claim {
                let r = tw.world.claim(&by_address(2), id);
                if successes > 0 {
                    prop_assert!(settled(&r));
                }
                r.is_ok()
            } else {
                let r = tw.world.reclaim(&by_address(1), id);
                if successes > 0 {
                    prop_assert!(settled(&r));
                }
                r.is_ok()
            };
            successes += usize::from(ok);
        }
        prop_assert!(successes <= 1);

        // Drive to a terminal state if nothing settled yet.
        if successes == 0 {
            tw.advance(life);
            prop_assert!(tw.world.reclaim(&by_address(1), id).is_ok());
        }
        prop_assert!(!tw.world.transfer(id).unwrap().status.is_pending());
        prop_assert!(settled(&tw.world.claim(&by_address(2), id)));
        prop_assert!(settled(&tw.world.reclaim(&by_address(1), id)));
    }

    /// Payout plus burned remainder always equals the start value.
    #[test]
    fn value_is_conserved(start in 1u64..1_000_000, end_frac in 0u64..=100, life in 1u64..10_000, at in 0u64..20_000) {
        let end = start * end_frac / 100;
        let tw = TestWorld::new();
        tw.register(1);
        let bob = tw.register(2);
        let id = tw
            .world
            .yell(&by_address(1), &terms(YellTarget::Identity(bob), start, end, life))
            .unwrap();
        tw.advance(at);
        let paid = if at < life {
            let r = tw.world.claim(&by_address(2), id).unwrap();
            prop_assert!(r.payout >= amount(end) && r.payout <= amount(start));
            r.payout
        } else {
            tw.world.reclaim(&by_address(1), id).unwrap().residual
        };
        prop_assert_eq!(paid.checked_add(tw.world.residual_pool()), Some(amount(start)));
    }
}

#[test]
fn racing_claim_and_reclaim_at_expiry_boundary() {
    let tw = TestWorld::new();
    tw.register(1);
    let bob = tw.register(2);
    let ids: Vec<_> = (0..16)
        .map(|_| {
            tw.world
                .yell(&by_address(1), &terms(YellTarget::Identity(bob), 100, 0, 5))
                .unwrap()
        })
        .collect();
    tw.advance(5);

    let ids = Arc::new(ids);
    let handles: Vec<_> = (0..4)
        .map(|n| {
            let world = tw.world.clone();
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                ids.iter()
                    .filter(|&&id| {
                        if n % 2 == 0 {
                            world.reclaim(&by_address(1), id).is_ok()
                        } else {
                            world.claim(&by_address(2), id).is_ok()
                        }
                    })
                    .count()
            })
        })
        .collect();
    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    // Expired: only reclaims can succeed, once per transfer.
    assert_eq!(total, ids.len());
    assert_eq!(tw.world.residual_pool(), amount(1600));
}
