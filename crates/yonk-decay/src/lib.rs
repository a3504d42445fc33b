//! # yonk-decay — Linear value decay engine.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! A transfer's value falls linearly from `start_value` to `end_value` over
//! `life_seconds`, then stays at `end_value`:
//!
//! `value = start - (start - end) * min(elapsed, life) / life`
//!
//! Values are 256-bit; the product `(start - end) * elapsed` is formed over
//! 512 bits. The decrement is rounded down, so the value is rounded up and
//! never drops below `end_value`.

pub mod engine;

pub use engine::LinearDecay;
