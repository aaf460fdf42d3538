use async_trait::async_trait;
use halo2_proofs::halo2curves::bn256::Fr as Fp;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use veil_core::error::VeilError;
use veil_core::state_tree::{StateTree, StateTreeUpdate, TreePatch, TreeWitness};

use crate::apis::ClientContext;

/// The authoritative accumulator, local or remote.
///
/// `update` is the only mutating entry point: it registers a step's output
/// commitments (value 1) and revealed nullifiers (value = the update's
/// binding digest, so a retried step is idempotent while a double-spend
/// conflicts) and returns the witnesses the circuit needs.
#[async_trait]
pub trait TreeService: Send + Sync {
    async fn update(
        &self,
        ctx: &ClientContext,
        update: &StateTreeUpdate,
    ) -> Result<TreePatch, VeilError>;

    async fn find(&self, ctx: &ClientContext, key: Fp) -> Result<TreeWitness, VeilError>;

    async fn root(&self, ctx: &ClientContext) -> Result<Fp, VeilError>;
}

/// In-process tree behind an async mutex.
///
/// The whole validate/apply/witness sequence for one update holds the lock:
/// the tree has exactly one logical writer at a time, and an update computed
/// against a stale root would be invalid.
#[derive(Debug, Default)]
pub struct LocalTreeService {
    tree: Mutex<StateTree>,
}

impl LocalTreeService {
    pub fn new() -> Self {
        LocalTreeService {
            tree: Mutex::new(StateTree::new()),
        }
    }

    fn planned_leaves(update: &StateTreeUpdate) -> Vec<(Fp, Fp)> {
        let mut leaves = Vec::with_capacity(4);
        if update.output_nc1 != Fp::zero() {
            leaves.push((update.output_nc1, Fp::one()));
        }
        if update.output_nc2 != Fp::zero() {
            leaves.push((update.output_nc2, Fp::one()));
        }
        // Nullifier leaves bind the spend to the step that revealed it.
        if update.nullifier1 != Fp::zero() {
            leaves.push((update.nullifier1, update.binding));
        }
        if update.nullifier2 != Fp::zero() {
            leaves.push((update.nullifier2, update.binding));
        }
        leaves
    }
}

#[async_trait]
impl TreeService for LocalTreeService {
    async fn update(
        &self,
        _ctx: &ClientContext,
        update: &StateTreeUpdate,
    ) -> Result<TreePatch, VeilError> {
        let mut tree = self.tree.lock().await;
        let leaves = Self::planned_leaves(update);

        // Validate the whole batch before touching a single node, so a
        // conflict can never leave a half-applied update behind.
        for (key, value) in &leaves {
            tree.can_insert(*key, *value)?;
        }
        for (key, value) in &leaves {
            tree.insert(*key, *value)?;
        }

        let witness1 = tree.find(update.output_nc1);
        let witness2 = tree.find(update.output_nc2);
        let witness_ac = tree.find(update.ac_state_key);
        let (siblings1, siblings2, siblings_ac) = if update.padding {
            (witness1.siblings, witness2.siblings, witness_ac.siblings)
        } else {
            (
                tree.trim(&witness1.siblings),
                tree.trim(&witness2.siblings),
                tree.trim(&witness_ac.siblings),
            )
        };

        tracing::debug!(
            root = %veil_core::utils::fp_to_dec_string(&tree.root()),
            leaves = leaves.len(),
            "state tree updated"
        );
        Ok(TreePatch {
            data_tree_root: tree.root(),
            keys: vec![update.output_nc1, update.output_nc2],
            siblings: vec![siblings1, siblings2],
            siblings_ac,
        })
    }

    async fn find(&self, _ctx: &ClientContext, key: Fp) -> Result<TreeWitness, VeilError> {
        Ok(self.tree.lock().await.find(key))
    }

    async fn root(&self, _ctx: &ClientContext) -> Result<Fp, VeilError> {
        Ok(self.tree.lock().await.root())
    }
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    context: &'a ClientContext,
    padding: bool,
    new_states: &'a StateTreeUpdate,
}

#[derive(Serialize)]
struct FindRequest<'a> {
    context: &'a ClientContext,
    key: String,
}

#[derive(Deserialize)]
struct RootResponse {
    root: String,
}

/// HTTP client for the sequencer's authoritative tree.
#[derive(Clone, Debug)]
pub struct RemoteTreeService {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteTreeService {
    pub fn new(base_url: &str) -> Self {
        RemoteTreeService {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
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
impl TreeService for RemoteTreeService {
    async fn update(
        &self,
        ctx: &ClientContext,
        update: &StateTreeUpdate,
    ) -> Result<TreePatch, VeilError> {
        let request = UpdateRequest {
            context: ctx,
            padding: update.padding,
            new_states: update,
        };
        self.post("statetree", &request).await
    }

    async fn find(&self, ctx: &ClientContext, key: Fp) -> Result<TreeWitness, VeilError> {
        let request = FindRequest {
            context: ctx,
            key: veil_core::utils::fp_to_dec_string(&key),
        };
        self.post("statetree/get", &request).await
    }

    async fn root(&self, ctx: &ClientContext) -> Result<Fp, VeilError> {
        let request = FindRequest {
            context: ctx,
            key: String::new(),
        };
        let response: RootResponse = self.post("statetree/root", &request).await?;
        veil_core::utils::fp_from_dec_string(&response.root)
    }
}
