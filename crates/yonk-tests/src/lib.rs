//! Cross-crate test suite for Yonk.
//!
//! Integration tests live under `tests/`: scenario walkthroughs of the
//! transfer lifecycle, adversarial inputs against the verifier and the
//! world executor, and checks against the shipped P-256 vector fixture.

pub mod helpers;
