//! Asynchronous orchestration layer for the confidential transfer engine.
//!
//! The engine in `veil-core` is pure; everything that suspends (the
//! authoritative state tree, the prover and the settlement ledger) sits
//! behind the service seams in [`services`]. [`apis::SecretSdk`] sequences
//! deposit/send/withdraw and account lifecycle operations across those
//! seams, buffering all local effects and committing them exactly once.

pub mod apis;
pub mod config;
pub mod services;
