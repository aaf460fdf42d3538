mod sdk;

use serde::{Deserialize, Serialize};

pub use sdk::{BalanceEntry, SecretSdk, TransactionEntry};

/// Caller identity forwarded with every remote request. The sequencer
/// authenticates it out of band; this layer only carries it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientContext {
    pub alias: String,
    pub eth_address: String,
    pub timestamp: u64,
    pub signature: String,
}

impl ClientContext {
    pub fn new(alias: &str, eth_address: &str, timestamp: u64, signature: &str) -> Self {
        ClientContext {
            alias: alias.to_string(),
            eth_address: eth_address.to_string(),
            timestamp,
            signature: signature.to_string(),
        }
    }
}
