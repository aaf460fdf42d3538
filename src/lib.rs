//! This crate contains the cryptographic state and transaction engine for a
//! confidential layer-2 transfer protocol: account balances are value-bearing
//! encrypted notes committed into a fixed-depth sparse Merkle accumulator,
//! and spending a note reveals a one-time nullifier that prevents reuse.
//! The proving system consuming the circuit inputs assembled here is external.

/// Account key material, addresses, commitments and lifecycle operations.
pub mod account;
/// Error taxonomy shared by the engine and its orchestration layer.
pub mod error;
/// The join-split transaction builder and circuit-input assembly.
pub mod join_split;
/// The note data model, commitments, nullifiers and note encryption.
pub mod note;
/// Field, hash, curve and signature primitives with a fixed circuit-compatible parameterization.
pub mod primitives;
/// The fixed-depth sparse Merkle state accumulator.
pub mod state_tree;
/// Encrypted transaction records and their re-encryption on key rotation.
pub mod transaction;
/// Field-element conversion and serialization helpers.
pub mod utils;
