use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use veil_core::error::VeilError;

/// Deployment/runtime configuration for the orchestrator, loaded from the
/// JSON file the deployment tooling writes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Base URL of the sequencer server (tree, prover and note store).
    pub server_url: String,
    /// JSON-RPC endpoint of the settlement chain.
    pub chain_url: String,
    /// Address of the rollup settlement contract.
    pub rollup_address: String,
    /// Private key of the L1 wallet acting for this user.
    pub signer_key: String,
}

impl SdkConfig {
    /// Reads the configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VeilError> {
        let file = File::open(path).map_err(|e| VeilError::Validation(format!("config: {e}")))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| VeilError::Validation(format!("config: {e}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_parses() {
        let raw = r#"{
            "server_url": "http://127.0.0.1:3000",
            "chain_url": "http://127.0.0.1:8545",
            "rollup_address": "0x0165878A594ca255338adfa4d48449f69242Eb8F",
            "signer_key": "0x01",
            "extra": "ignored"
        }"#;
        let config: SdkConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.server_url, "http://127.0.0.1:3000");
    }
}
