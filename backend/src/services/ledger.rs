use async_trait::async_trait;
use ethers::{
    contract::abigen,
    prelude::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, U256},
};
use halo2_proofs::halo2curves::{bn256::Fr as Fp, group::ff::PrimeField};
use std::{str::FromStr, sync::Arc};
use tokio::sync::Mutex;

use veil_core::error::VeilError;
use veil_core::primitives::Point;

use super::prover::ProofBundle;

abigen!(
    RollupAbi,
    r#"[
        function dataTreeRoot() external view returns (uint256)
        function update(uint256[2] a, uint256[2][2] b, uint256[2] c, uint256[] input) external
        function deposit(uint256[2] pubKey, uint256 assetId, uint256 value, uint256 nonce) external payable
        function processDeposits(uint256[] keys, uint256[] values, uint256[][] siblings) external
        function withdraw(uint256[7] txInfo, uint256[] roots, uint256[] keys, uint256[] values, uint256[][] siblings, address receiver, uint256[2] a, uint256[2][2] b, uint256[2] c) external
    ]"#
);

/// Aggregate of a withdraw chain, handed to the settlement contract with
/// one authorization proof.
#[derive(Clone, Debug)]
pub struct WithdrawTxInfo {
    pub public_value: u128,
    pub public_owner: Point,
    pub output_nc1: Fp,
    pub output_nc2: Fp,
    pub public_asset_id: u32,
    pub data_tree_root: Fp,
    /// Every intermediate root, in step order.
    pub roots: Vec<Fp>,
    pub keys: Vec<Fp>,
    pub values: Vec<Fp>,
    /// Trimmed sibling paths for the on-chain SMT verifier.
    pub siblings: Vec<Vec<Fp>>,
}

/// The settlement contract boundary. Any revert is a hard failure for the
/// enclosing step.
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn update(&self, bundle: &ProofBundle) -> Result<(), VeilError>;

    async fn deposit(
        &self,
        pub_key: &Point,
        asset_id: u32,
        value: u128,
        nonce: u64,
    ) -> Result<(), VeilError>;

    async fn process_deposits(
        &self,
        keys: &[Fp],
        values: &[Fp],
        siblings: &[Vec<Fp>],
    ) -> Result<(), VeilError>;

    async fn withdraw(
        &self,
        receiver: &str,
        tx_info: &WithdrawTxInfo,
        bundle: &ProofBundle,
    ) -> Result<(), VeilError>;

    async fn data_tree_root(&self) -> Result<Fp, VeilError>;
}

pub(crate) fn fp_to_u256(f: &Fp) -> U256 {
    U256::from_little_endian(f.to_repr().as_ref())
}

pub(crate) fn u256_to_fp(v: &U256) -> Fp {
    let mut bytes = [0u8; 32];
    v.to_little_endian(&mut bytes);
    let mut repr = [0u8; 32];
    repr.copy_from_slice(&bytes);
    Option::<Fp>::from(Fp::from_repr(repr)).unwrap_or_else(Fp::zero)
}

/// Splits an encoded Groth16 proof into the contract's (a, b, c) shape.
fn parse_proof_words(proof: &[u8]) -> Result<([U256; 2], [[U256; 2]; 2], [U256; 2]), VeilError> {
    if proof.len() != 8 * 32 {
        return Err(VeilError::Validation(format!(
            "proof must be 8 words, got {} bytes",
            proof.len()
        )));
    }
    let word = |i: usize| U256::from_big_endian(&proof[i * 32..(i + 1) * 32]);
    Ok((
        [word(0), word(1)],
        [[word(2), word(3)], [word(4), word(5)]],
        [word(6), word(7)],
    ))
}

fn signals_to_u256(signals: &[String]) -> Result<Vec<U256>, VeilError> {
    signals
        .iter()
        .map(|s| {
            U256::from_dec_str(s)
                .map_err(|e| VeilError::Validation(format!("bad public signal {s}: {e}")))
        })
        .collect()
}

type RollupClient = RollupAbi<SignerMiddleware<Arc<Provider<Http>>, LocalWallet>>;

/// Ethers binding of the rollup settlement contract.
///
/// Submissions share one wallet, so a mutex serializes them to keep nonces
/// in order (concurrent `send`s would race the nonce manager).
#[derive(Debug)]
pub struct RollupContract {
    nonce_lock: Mutex<()>,
    rollup: RollupClient,
}

impl RollupContract {
    pub async fn new(signer_key: &str, url: &str, address: &str) -> Result<Self, VeilError> {
        let wallet = LocalWallet::from_str(signer_key)
            .map_err(|e| VeilError::Validation(format!("bad signer key: {e}")))?;
        let provider = Arc::new(
            Provider::<Http>::try_from(url)
                .map_err(|e| VeilError::Validation(format!("bad chain url: {e}")))?,
        );
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| VeilError::Remote(format!("chain id: {e}")))?
            .as_u64();
        let client = Arc::new(SignerMiddleware::new(
            provider,
            wallet.with_chain_id(chain_id),
        ));
        let address = Address::from_str(address)
            .map_err(|e| VeilError::Validation(format!("bad rollup address: {e}")))?;
        Ok(RollupContract {
            nonce_lock: Mutex::new(()),
            rollup: RollupAbi::new(address, client),
        })
    }

    async fn send_update(&self, bundle: &ProofBundle) -> Result<(), VeilError> {
        let (a, b, c) = parse_proof_words(&bundle.proof)?;
        let input = signals_to_u256(&bundle.public_signals)?;

        let lock_guard = self.nonce_lock.lock().await;
        let call = self.rollup.update(a, b, c, input);
        let pending = call
            .send()
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.update: {e}")))?;
        pending
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.update receipt: {e}")))?;
        drop(lock_guard);
        Ok(())
    }
}

#[async_trait]
impl LedgerService for RollupContract {
    async fn update(&self, bundle: &ProofBundle) -> Result<(), VeilError> {
        self.send_update(bundle).await
    }

    async fn deposit(
        &self,
        pub_key: &Point,
        asset_id: u32,
        value: u128,
        nonce: u64,
    ) -> Result<(), VeilError> {
        let lock_guard = self.nonce_lock.lock().await;
        let call = self.rollup.deposit(
            [fp_to_u256(&pub_key.x), fp_to_u256(&pub_key.y)],
            U256::from(asset_id),
            U256::from(value),
            U256::from(nonce),
        );
        let pending = call
            .send()
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.deposit: {e}")))?;
        pending
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.deposit receipt: {e}")))?;
        drop(lock_guard);
        Ok(())
    }

    async fn process_deposits(
        &self,
        keys: &[Fp],
        values: &[Fp],
        siblings: &[Vec<Fp>],
    ) -> Result<(), VeilError> {
        let lock_guard = self.nonce_lock.lock().await;
        let call = self.rollup.process_deposits(
            keys.iter().map(fp_to_u256).collect(),
            values.iter().map(fp_to_u256).collect(),
            siblings
                .iter()
                .map(|row| row.iter().map(fp_to_u256).collect())
                .collect(),
        );
        let pending = call
            .send()
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.processDeposits: {e}")))?;
        pending
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.processDeposits receipt: {e}")))?;
        drop(lock_guard);
        Ok(())
    }

    async fn withdraw(
        &self,
        receiver: &str,
        tx_info: &WithdrawTxInfo,
        bundle: &ProofBundle,
    ) -> Result<(), VeilError> {
        let (a, b, c) = parse_proof_words(&bundle.proof)?;
        let receiver = Address::from_str(receiver.trim_start_matches("eth:"))
            .map_err(|e| VeilError::Validation(format!("bad receiver address: {e}")))?;
        let packed = [
            U256::from(tx_info.public_value),
            fp_to_u256(&tx_info.public_owner.x),
            fp_to_u256(&tx_info.public_owner.y),
            fp_to_u256(&tx_info.output_nc1),
            fp_to_u256(&tx_info.output_nc2),
            U256::from(tx_info.public_asset_id),
            fp_to_u256(&tx_info.data_tree_root),
        ];

        let lock_guard = self.nonce_lock.lock().await;
        let call = self.rollup.withdraw(
            packed,
            tx_info.roots.iter().map(fp_to_u256).collect(),
            tx_info.keys.iter().map(fp_to_u256).collect(),
            tx_info.values.iter().map(fp_to_u256).collect(),
            tx_info
                .siblings
                .iter()
                .map(|row| row.iter().map(fp_to_u256).collect())
                .collect(),
            receiver,
            a,
            b,
            c,
        );
        let pending = call
            .send()
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.withdraw: {e}")))?;
        pending
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.withdraw receipt: {e}")))?;
        drop(lock_guard);
        Ok(())
    }

    async fn data_tree_root(&self) -> Result<Fp, VeilError> {
        let root = self
            .rollup
            .data_tree_root()
            .call()
            .await
            .map_err(|e| VeilError::Remote(format!("rollup.dataTreeRoot: {e}")))?;
        Ok(u256_to_fp(&root))
    }
}
