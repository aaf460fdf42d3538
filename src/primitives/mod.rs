mod babyjubjub;
mod cipher;
mod eddsa;
mod hash;
mod poseidon_spec;

pub use babyjubjub::{scalar_from_le_bytes, shared_secret, suborder, Point};
pub use cipher::{seal_bytes, unseal_bytes};
pub use eddsa::{Signature, SigningKey};
pub use hash::{poseidon_hash, poseidon_sponge};
pub use poseidon_spec::PoseidonSpec;
