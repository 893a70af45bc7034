//! Synchronization primitives.
//!
//! Shims between loom and std synchronization primitives. Directory locks use
//! `parking_lot` directly; only the lock-free flags and counters go through
//! these re-exports so they can be model-checked.
pub mod atomic;
