use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use veil_core::error::VeilError;
use veil_core::join_split::CircuitInput;
use veil_core::utils::fr_serde;

use halo2_proofs::halo2curves::bn256::Fr as Fp;

/// A proof with its public signals, as returned by the external prover.
/// Pure with respect to its declared inputs; potentially seconds-slow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub proof: Vec<u8>,
    pub public_signals: Vec<String>,
}

impl ProofBundle {
    /// Compact transport/storage form.
    pub fn encode(&self) -> String {
        base64::encode(bincode::serialize(self).unwrap())
    }

    pub fn decode(blob: &str) -> Result<Self, VeilError> {
        let bytes = base64::decode(blob)
            .map_err(|e| VeilError::Validation(format!("bad proof blob: {e}")))?;
        bincode::deserialize(&bytes)
            .map_err(|e| VeilError::Validation(format!("bad proof blob: {e}")))
    }
}

/// Input of the withdraw-authorization circuit: one signature over the
/// sponge digest of every root a consolidation chain produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawAuthInput {
    #[serde(with = "fr_serde")]
    pub message: Fp,
    pub owner: [String; 2],
    #[serde(rename = "signatureR8")]
    pub signature_r8: [String; 2],
    #[serde(rename = "signatureS")]
    pub signature_s: String,
}

/// The external proof system.
#[async_trait]
pub trait ProofSystem: Send + Sync {
    /// Proves one state-update step (join-split or account lifecycle).
    async fn update_state(&self, input: &CircuitInput) -> Result<ProofBundle, VeilError>;

    /// Proves the single withdraw authorization of a step chain.
    async fn withdraw_auth(&self, input: &WithdrawAuthInput) -> Result<ProofBundle, VeilError>;

    /// Verifies a previously generated bundle against its circuit input.
    async fn verify(&self, input: &CircuitInput, bundle: &ProofBundle) -> Result<bool, VeilError>;
}

#[derive(Serialize)]
struct ProveRequest<'a, T: Serialize> {
    circuit: &'a str,
    input: &'a T,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    circuit: &'a str,
    input: &'a CircuitInput,
    bundle: &'a ProofBundle,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
}

/// HTTP client for the proving service.
#[derive(Clone, Debug)]
pub struct RemoteProver {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteProver {
    pub fn new(base_url: &str) -> Self {
        RemoteProver {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        resource: &str,
        body: &T,
    ) -> Result<R, VeilError> {
        let url = format!("{}/{}", self.base_url, resource);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| VeilError::Remote(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(VeilError::Remote(format!("{url}: {}", response.status())));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| VeilError::Remote(format!("{url}: {e}")))
    }
}

#[async_trait]
impl ProofSystem for RemoteProver {
    async fn update_state(&self, input: &CircuitInput) -> Result<ProofBundle, VeilError> {
        let request = ProveRequest {
            circuit: "update_state",
            input,
        };
        self.post("proof/create", &request).await
    }

    async fn withdraw_auth(&self, input: &WithdrawAuthInput) -> Result<ProofBundle, VeilError> {
        let request = ProveRequest {
            circuit: "withdraw",
            input,
        };
        self.post("proof/create", &request).await
    }

    async fn verify(&self, input: &CircuitInput, bundle: &ProofBundle) -> Result<bool, VeilError> {
        let request = VerifyRequest {
            circuit: "update_state",
            input,
            bundle,
        };
        let response: VerifyResponse = self.post("proof/verify", &request).await?;
        Ok(response.valid)
    }
}
