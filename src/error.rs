use thiserror::Error;

/// Errors surfaced by the state/transaction engine.
///
/// Every public operation returns a tagged result built from this taxonomy so
/// callers can choose their own retry policy. A failure that occurs after the
/// state tree has been updated but before ledger settlement is reported
/// as-is; this engine performs no compensation for already-settled steps.
#[derive(Debug, Error)]
pub enum VeilError {
    /// Malformed alias, address, value or other caller-supplied data.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Signature, decryption or proof verification failure.
    #[error("crypto failure: {0}")]
    Crypto(&'static str),

    /// Duplicate nullifier or commitment: a replay or double-spend attempt.
    #[error("state conflict: {0}")]
    Conflict(&'static str),

    /// Unregistered alias or account.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// A tree/prover/ledger call failed, reverted or timed out.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// No combination of available notes can satisfy the requested value.
    #[error("insufficient funds for asset {asset_id}")]
    InsufficientFunds { asset_id: u32 },
}
