//! Seams to the external collaborators: the authoritative state tree, the
//! proof system, the settlement ledger and the note/transaction store. Each
//! seam has a remote (HTTP or contract) implementation and an in-process one
//! used by tests and embedded deployments.

mod ledger;
mod prover;
mod store;
mod tree;

pub use ledger::{LedgerService, RollupContract, WithdrawTxInfo};
pub use prover::{ProofBundle, ProofSystem, RemoteProver, WithdrawAuthInput};
pub use store::{MemoryStore, NoteStore, RemoteStore, StoredTransaction, TransactionPage};
pub use tree::{LocalTreeService, RemoteTreeService, TreeService};
