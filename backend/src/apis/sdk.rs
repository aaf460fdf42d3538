//! The operation orchestrator.
//!
//! Every public operation follows the same discipline: resolve the signer
//! mode once, derive steps locally, then run each step (register with the
//! tree service, cross-check the echoed commitments, assemble the circuit
//! input, prove, settle) while accumulating all caller-visible notes and
//! transaction records in a [`CommitBuffer`] that is flushed exactly once at
//! the end. A failure before the flush discards the buffer; ledger calls
//! already settled by completed steps are not rolled back and surface as
//! the step's error.

use halo2_proofs::halo2curves::bn256::Fr as Fp;
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use veil_core::account::{
    AccountAction, AccountOperation, EigenAddress, EthAddress, SecretAccount, SignerMode,
};
use veil_core::error::VeilError;
use veil_core::join_split::{withdraw_digest, CircuitInput, JoinSplitBuilder, JoinSplitStep};
use veil_core::note::{
    decrypt_notes, encrypt_note, EncryptedNoteRecord, Note, NoteState, DEFAULT_ALIAS,
};
use veil_core::primitives::SigningKey;
use veil_core::state_tree::{verify_witness, StateTreeUpdate, TreePatch};
use veil_core::transaction::{decrypt_tx, encrypt_tx, re_encrypt_txs, tx_hash, TxData};
use veil_core::utils::fp_to_dec_string;

use crate::apis::ClientContext;
use crate::services::{
    LedgerService, NoteStore, ProofBundle, ProofSystem, StoredTransaction, TreeService,
    WithdrawAuthInput, WithdrawTxInfo,
};

const TX_PAGE_SIZE: u64 = 1000;

/// Per-operation accumulation of local effects, flushed in one commit.
#[derive(Debug, Default)]
struct CommitBuffer {
    notes: Vec<EncryptedNoteRecord>,
    txs: Vec<StoredTransaction>,
}

/// Aggregates collected across the steps of one operation, needed by the
/// deposit and withdraw finalization legs.
#[derive(Debug, Default)]
struct StepAggregates {
    keys: Vec<Fp>,
    values: Vec<Fp>,
    roots: Vec<Fp>,
    siblings: Vec<Vec<Fp>>,
    last_ncs: [Fp; 2],
    last_root: Fp,
}

/// A per-asset balance line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceEntry {
    pub asset_id: u32,
    pub balance: u128,
}

/// A decrypted row of transaction history.
#[derive(Clone, Debug)]
pub struct TransactionEntry {
    pub operation: String,
    pub amount: u128,
    pub asset_id: u32,
    pub to: String,
    pub tx_hash: String,
}

/// The confidential-transfer SDK for one account.
pub struct SecretSdk {
    account: SecretAccount,
    mode: SignerMode,
    tree: Arc<dyn TreeService>,
    prover: Arc<dyn ProofSystem>,
    ledger: Arc<dyn LedgerService>,
    store: Arc<dyn NoteStore>,
}

impl SecretSdk {
    pub fn new(
        account: SecretAccount,
        tree: Arc<dyn TreeService>,
        prover: Arc<dyn ProofSystem>,
        ledger: Arc<dyn LedgerService>,
        store: Arc<dyn NoteStore>,
    ) -> Self {
        SecretSdk {
            account,
            mode: SignerMode::SigningKey,
            tree,
            prover,
            ledger,
            store,
        }
    }

    /// Switches the account-required signing mode for subsequent operations.
    pub fn with_mode(mut self, mode: SignerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restores an SDK from the sealed account blob held by the store.
    pub async fn from_stored_account(
        ctx: &ClientContext,
        password: &str,
        tree: Arc<dyn TreeService>,
        prover: Arc<dyn ProofSystem>,
        ledger: Arc<dyn LedgerService>,
        store: Arc<dyn NoteStore>,
    ) -> Result<Self, VeilError> {
        let blob = store.get_account(ctx).await?;
        let account = SecretAccount::deserialize(password, &blob)?;
        Ok(Self::new(account, tree, prover, ledger, store))
    }

    pub fn account(&self) -> &SecretAccount {
        &self.account
    }

    pub fn address(&self) -> EigenAddress {
        self.account.address()
    }

    fn ac_state_key(&self) -> Fp {
        self.account.commitment(self.mode)
    }

    /// The account commitment must be active in the tree before any
    /// join-split operation.
    async fn require_account(&self, ctx: &ClientContext) -> Result<Fp, VeilError> {
        let key = self.ac_state_key();
        let witness = self.tree.find(ctx, key).await?;
        if witness.value != Fp::one() {
            return Err(VeilError::NotFound("account commitment is not registered"));
        }
        Ok(key)
    }

    /// Fetches and decrypts the caller's spendable notes, adopting any wild
    /// records (alias rebind only; commitment and value unchanged).
    async fn fetch_spendable(&self, ctx: &ClientContext) -> Result<Vec<Note>, VeilError> {
        let records = self
            .store
            .get_notes(ctx, &[NoteState::Proved], &[])
            .await?;
        let decrypted = decrypt_notes(&self.account.account_key, &records, true);

        let mut adopted = Vec::new();
        for entry in &decrypted {
            if entry.adopted {
                continue;
            }
            for record in &records {
                if record.index == entry.note.index && record.alias == DEFAULT_ALIAS {
                    let mut rebound = record.clone();
                    rebound.alias = ctx.alias.clone();
                    adopted.push(rebound);
                }
            }
        }
        if !adopted.is_empty() {
            debug!(count = adopted.len(), "adopting wild notes");
            self.store.commit(ctx, adopted, Vec::new()).await?;
        }

        Ok(decrypted.into_iter().map(|d| d.note).collect())
    }

    /// Registers one step with the tree service and cross-checks the echoed
    /// commitments and witnesses against the locally derived values. Any
    /// mismatch aborts the whole multi-step operation.
    async fn register_step(
        &self,
        ctx: &ClientContext,
        step: &JoinSplitStep,
        ac_state_key: Fp,
        padding: bool,
    ) -> Result<TreePatch, VeilError> {
        let update = StateTreeUpdate {
            output_nc1: step.output_ncs[0],
            nullifier1: step.nullifiers[0],
            output_nc2: step.output_ncs[1],
            nullifier2: step.nullifiers[1],
            ac_state_key,
            binding: step.digest(),
            padding,
        };
        let patch = self.tree.update(ctx, &update).await?;
        if patch.keys != step.output_ncs {
            return Err(VeilError::Crypto(
                "tree service echoed commitments that do not match the local step",
            ));
        }
        for (key, siblings) in patch.keys.iter().zip(patch.siblings.iter()) {
            if !verify_witness(patch.data_tree_root, *key, Fp::one(), siblings) {
                return Err(VeilError::Crypto("tree witness does not re-derive the root"));
            }
        }
        Ok(patch)
    }

    /// The note records one settled step leaves behind: consumed inputs
    /// rewritten as spent, outputs stored for their owners.
    fn step_records(&self, step: &JoinSplitStep, receiver_alias: &str) -> Vec<EncryptedNoteRecord> {
        let self_pk = self.account.account_key.public();
        let signer = &self.account.signing_key;
        let mut records = Vec::new();

        for input in step.inputs.iter().flatten() {
            let mut spent = input.clone();
            spent.state = NoteState::Spent;
            records.push(encrypt_note(&spent, signer, &self_pk, &self.account.alias));
        }
        for output in step.outputs.iter().flatten() {
            let mut proved = output.clone();
            proved.state = NoteState::Proved;
            let alias = if proved.owner == self_pk {
                self.account.alias.as_str()
            } else {
                receiver_alias
            };
            records.push(encrypt_note(&proved, signer, &proved.owner, alias));
        }
        records
    }

    fn tx_record(
        &self,
        operation: &str,
        amount: u128,
        asset_id: u32,
        to: &str,
        bundle: &ProofBundle,
    ) -> StoredTransaction {
        let data = TxData {
            from: EigenAddress::from_point(&self.account.signing_key.public())
                .as_str()
                .to_string(),
            to: to.to_string(),
            amount,
            asset_id,
        };
        StoredTransaction {
            operation: operation.to_string(),
            tx_data: encrypt_tx(&data, &self.account.signing_key),
            proof: bundle.encode(),
            public_input: serde_json::to_string(&bundle.public_signals).unwrap(),
        }
    }

    /// Runs a step chain (register, prove, settle, buffer) strictly in
    /// order, since step N+1 spends step N's freshly registered outputs.
    async fn run_steps(
        &self,
        ctx: &ClientContext,
        steps: &[JoinSplitStep],
        ac_state_key: Fp,
        padding: bool,
        operation: &str,
        amount: u128,
        recipient: &str,
        receiver_alias: &str,
        buffer: &mut CommitBuffer,
    ) -> Result<(Vec<ProofBundle>, StepAggregates), VeilError> {
        let mut bundles = Vec::with_capacity(steps.len());
        let mut aggregates = StepAggregates::default();

        for (i, step) in steps.iter().enumerate() {
            let patch = self.register_step(ctx, step, ac_state_key, padding).await?;
            let input = CircuitInput::from_step(step, &self.account, &patch)?;
            let bundle = self.prover.update_state(&input).await?;

            buffer.txs.push(self.tx_record(operation, amount, step.asset_id, recipient, &bundle));
            buffer.notes.extend(self.step_records(step, receiver_alias));

            self.ledger.update(&bundle).await?;

            aggregates.keys.extend(step.output_ncs);
            aggregates.values.extend([Fp::one(), Fp::one()]);
            aggregates.roots.push(patch.data_tree_root);
            aggregates.siblings.extend(patch.siblings.clone());
            aggregates.last_ncs = step.output_ncs;
            aggregates.last_root = patch.data_tree_root;

            debug!(
                step = i,
                root = %fp_to_dec_string(&patch.data_tree_root),
                "step settled"
            );
            bundles.push(bundle);
        }
        Ok((bundles, aggregates))
    }

    /// Deposits `value` of `asset_id` from L1 into a fresh shielded note
    /// owned by `receiver`.
    pub async fn deposit(
        &self,
        ctx: &ClientContext,
        receiver: &EigenAddress,
        value: u128,
        asset_id: u32,
        nonce: u64,
    ) -> Result<Vec<ProofBundle>, VeilError> {
        info!(value = %value, asset_id, "deposit");
        let ac_state_key = self.require_account(ctx).await?;
        // Adoption pass runs even though a deposit spends nothing.
        self.fetch_spendable(ctx).await?;

        let steps = JoinSplitBuilder::new(&self.account, self.mode).deposit(
            value,
            asset_id,
            receiver.point()?,
            &mut OsRng,
        )?;

        let mut buffer = CommitBuffer::default();
        let (bundles, aggregates) = self
            .run_steps(
                ctx,
                &steps,
                ac_state_key,
                true,
                "deposit",
                value,
                receiver.as_str(),
                &ctx.alias,
                &mut buffer,
            )
            .await?;

        self.ledger
            .deposit(&self.account.account_key.public(), asset_id, value, nonce)
            .await?;
        self.ledger
            .process_deposits(&aggregates.keys, &aggregates.values, &aggregates.siblings)
            .await?;

        self.store.commit(ctx, buffer.notes, buffer.txs).await?;
        Ok(bundles)
    }

    /// Sends `value` of `asset_id` to `receiver` inside the shielded pool.
    pub async fn send(
        &self,
        ctx: &ClientContext,
        receiver: &EigenAddress,
        receiver_alias: &str,
        value: u128,
        asset_id: u32,
    ) -> Result<Vec<ProofBundle>, VeilError> {
        info!(value = %value, asset_id, "send");
        let ac_state_key = self.require_account(ctx).await?;
        let spendable = self.fetch_spendable(ctx).await?;

        let steps = JoinSplitBuilder::new(&self.account, self.mode).send(
            value,
            asset_id,
            receiver.point()?,
            &spendable,
            &mut OsRng,
        )?;

        let mut buffer = CommitBuffer::default();
        let (bundles, _) = self
            .run_steps(
                ctx,
                &steps,
                ac_state_key,
                true,
                "send",
                value,
                receiver.as_str(),
                receiver_alias,
                &mut buffer,
            )
            .await?;

        self.store.commit(ctx, buffer.notes, buffer.txs).await?;
        Ok(bundles)
    }

    /// Withdraws `value` of `asset_id` to the L1 address `receiver`. All
    /// per-step roots are bound into one signed digest: one signature
    /// authorizes an arbitrarily long consolidation chain.
    pub async fn withdraw(
        &self,
        ctx: &ClientContext,
        receiver: &EthAddress,
        value: u128,
        asset_id: u32,
    ) -> Result<Vec<ProofBundle>, VeilError> {
        info!(value = %value, asset_id, "withdraw");
        let ac_state_key = self.require_account(ctx).await?;
        let spendable = self.fetch_spendable(ctx).await?;

        let public_owner = self.account.signing_key.public();
        let steps = JoinSplitBuilder::new(&self.account, self.mode).withdraw(
            value,
            asset_id,
            public_owner,
            &spendable,
            &mut OsRng,
        )?;

        let mut buffer = CommitBuffer::default();
        // Unpadded witnesses: the on-chain SMT verifier takes compact paths.
        let (mut bundles, aggregates) = self
            .run_steps(
                ctx,
                &steps,
                ac_state_key,
                false,
                "withdraw",
                value,
                receiver.as_str(),
                &ctx.alias,
                &mut buffer,
            )
            .await?;

        let message = withdraw_digest(
            value,
            &public_owner,
            aggregates.last_ncs[0],
            aggregates.last_ncs[1],
            asset_id,
            &aggregates.roots,
        );
        let signature = self.account.signing_key.sign(message);
        let auth = WithdrawAuthInput {
            message,
            owner: [
                fp_to_dec_string(&public_owner.x),
                fp_to_dec_string(&public_owner.y),
            ],
            signature_r8: [
                fp_to_dec_string(&signature.r8.x),
                fp_to_dec_string(&signature.r8.y),
            ],
            signature_s: signature.s.to_str_radix(10),
        };
        let auth_bundle = self.prover.withdraw_auth(&auth).await?;

        let tx_info = WithdrawTxInfo {
            public_value: value,
            public_owner,
            output_nc1: aggregates.last_ncs[0],
            output_nc2: aggregates.last_ncs[1],
            public_asset_id: asset_id,
            data_tree_root: aggregates.last_root,
            roots: aggregates.roots,
            keys: aggregates.keys,
            values: aggregates.values,
            siblings: aggregates.siblings,
        };
        self.ledger.withdraw(receiver.as_str(), &tx_info, &auth_bundle).await?;

        self.store.commit(ctx, buffer.notes, buffer.txs).await?;
        bundles.push(auth_bundle);
        Ok(bundles)
    }

    /// Registers the alias: inserts the account commitment (value 1) and
    /// both creation nullifiers. A second CREATE for the same alias trips
    /// the tree's conflict rule.
    pub async fn create_account(
        &self,
        ctx: &ClientContext,
        password: &str,
    ) -> Result<ProofBundle, VeilError> {
        info!(alias = %self.account.alias, "create account");
        let op = AccountOperation::new(
            AccountAction::Create,
            &self.account,
            self.mode,
            self.account.account_key.public(),
            self.account.new_signing_key1.public(),
            self.account.new_signing_key2.public(),
        )?;

        let ac_state_key = self.ac_state_key();
        let update = StateTreeUpdate {
            output_nc1: ac_state_key,
            nullifier1: op.nullifiers[0],
            output_nc2: Fp::zero(),
            nullifier2: op.nullifiers[1],
            ac_state_key,
            binding: ac_state_key,
            padding: true,
        };
        let patch = self.tree.update(ctx, &update).await?;

        let input = CircuitInput::from_account_op(&op, &patch);
        let bundle = self.prover.update_state(&input).await?;
        if !self.prover.verify(&input, &bundle).await? {
            return Err(VeilError::Crypto("account creation proof did not verify"));
        }
        self.ledger.update(&bundle).await?;

        self.store
            .create_account(ctx, self.account.serialize(password))
            .await?;
        Ok(bundle)
    }

    /// Rotates the signing key with a two-phase swap: stage the promoted key
    /// set, re-encrypt every note and transaction record (old key reads, new
    /// key writes), and only then replace the active keys. Any failure
    /// discards the stage; no partial swap is observable.
    pub async fn update_account(
        &mut self,
        ctx: &ClientContext,
        new_signing_key: SigningKey,
        password: &str,
    ) -> Result<ProofBundle, VeilError> {
        info!(alias = %self.account.alias, "update account");
        let staged_active = self.account.new_signing_key1.clone();
        let staged_second = self.account.new_signing_key2.clone();

        let op = AccountOperation::new(
            AccountAction::Update,
            &self.account,
            self.mode,
            self.account.account_key.public(),
            staged_active.public(),
            staged_second.public(),
        )?;

        let update = StateTreeUpdate {
            output_nc1: op.commitment,
            nullifier1: op.nullifiers[0],
            output_nc2: Fp::zero(),
            nullifier2: Fp::zero(),
            ac_state_key: op.commitment,
            binding: op.commitment,
            padding: true,
        };
        let patch = self.tree.update(ctx, &update).await?;
        let input = CircuitInput::from_account_op(&op, &patch);
        let bundle = self.prover.update_state(&input).await?;
        if !self.prover.verify(&input, &bundle).await? {
            return Err(VeilError::Crypto("account update proof did not verify"));
        }
        self.ledger.update(&bundle).await?;

        // Phase one: re-encrypt everything against the staged key, into the
        // buffer only. The active key set is untouched until all of it
        // succeeded.
        let mut buffer = CommitBuffer::default();
        let records = self
            .store
            .get_notes(
                ctx,
                &[NoteState::Pending, NoteState::Proved, NoteState::Spent],
                &[],
            )
            .await?;
        let self_pk = self.account.account_key.public();
        // Wild records are not the account's yet; the adoption pass owns them.
        for record in records.iter().filter(|r| r.alias == ctx.alias) {
            let note = veil_core::note::decrypt_note(record, &self.account.account_key)?;
            buffer
                .notes
                .push(encrypt_note(&note, &staged_active, &self_pk, &record.alias));
        }

        let mut page = 0;
        loop {
            let tx_page = self.store.get_transactions(ctx, page, TX_PAGE_SIZE).await?;
            if tx_page.transactions.is_empty() {
                break;
            }
            let blobs: Vec<String> = tx_page
                .transactions
                .iter()
                .map(|t| t.tx_data.clone())
                .collect();
            let rewrapped = re_encrypt_txs(&staged_active, &self.account.signing_key, &blobs)?;
            for (tx, tx_data) in tx_page.transactions.iter().zip(rewrapped) {
                buffer.txs.push(StoredTransaction {
                    operation: tx.operation.clone(),
                    tx_data,
                    proof: tx.proof.clone(),
                    public_input: tx.public_input.clone(),
                });
            }
            page += 1;
        }

        self.store.commit(ctx, buffer.notes, buffer.txs).await?;

        // Phase two: the swap itself.
        self.account.signing_key = staged_active;
        self.account.new_signing_key1 = staged_second;
        self.account.new_signing_key2 = new_signing_key;
        self.store
            .update_account(ctx, self.account.serialize(password))
            .await?;
        Ok(bundle)
    }

    /// Replaces the account key and re-sends every balance to the new key
    /// material as a batch of SENDs.
    pub async fn migrate_account(
        &mut self,
        ctx: &ClientContext,
        new_account_key: SigningKey,
        password: &str,
    ) -> Result<ProofBundle, VeilError> {
        info!(alias = %self.account.alias, "migrate account");
        let op = AccountOperation::new(
            AccountAction::Migrate,
            &self.account,
            self.mode,
            new_account_key.public(),
            self.account.signer(self.mode).public(),
            self.account.new_signing_key1.public(),
        )?;

        let update = StateTreeUpdate {
            output_nc1: op.commitment,
            nullifier1: op.nullifiers[0],
            output_nc2: Fp::zero(),
            nullifier2: op.nullifiers[1],
            ac_state_key: op.commitment,
            binding: op.commitment,
            padding: true,
        };
        let patch = self.tree.update(ctx, &update).await?;
        let input = CircuitInput::from_account_op(&op, &patch);
        let bundle = self.prover.update_state(&input).await?;
        if !self.prover.verify(&input, &bundle).await? {
            return Err(VeilError::Crypto("account migration proof did not verify"));
        }
        self.ledger.update(&bundle).await?;

        // Ownership transfer: the old key still spends, the new key receives.
        let new_address = EigenAddress::from_point(&new_account_key.public());
        for entry in self.get_all_balance(ctx).await? {
            if entry.balance > 0 {
                self.send(ctx, &new_address, &ctx.alias, entry.balance, entry.asset_id)
                    .await?;
            }
        }

        self.account.account_key = new_account_key;
        self.store
            .update_account(ctx, self.account.serialize(password))
            .await?;
        Ok(bundle)
    }

    /// Sums spendable notes per asset.
    pub async fn get_all_balance(&self, ctx: &ClientContext) -> Result<Vec<BalanceEntry>, VeilError> {
        let notes = self.fetch_spendable(ctx).await?;
        let mut by_asset: BTreeMap<u32, u128> = BTreeMap::new();
        for note in notes {
            *by_asset.entry(note.asset_id).or_default() += note.val;
        }
        Ok(by_asset
            .into_iter()
            .map(|(asset_id, balance)| BalanceEntry { asset_id, balance })
            .collect())
    }

    /// Decrypted transaction history; records sealed under a key this
    /// account never held are skipped.
    pub async fn get_transactions(
        &self,
        ctx: &ClientContext,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<TransactionEntry>, VeilError> {
        let tx_page = self.store.get_transactions(ctx, page, page_size).await?;
        let mut entries = Vec::new();
        for tx in &tx_page.transactions {
            match decrypt_tx(&tx.tx_data, &self.account.signing_key) {
                Ok(data) => entries.push(TransactionEntry {
                    operation: tx.operation.clone(),
                    amount: data.amount,
                    asset_id: data.asset_id,
                    to: data.to,
                    tx_hash: tx_hash(&tx.proof, &tx.public_input),
                }),
                Err(_) => {
                    debug!("skipping transaction record sealed under a rotated-away key");
                }
            }
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for SecretSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSdk")
            .field("alias", &self.account.alias)
            .field("mode", &self.mode)
            .finish()
    }
}
