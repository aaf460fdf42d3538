use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

use veil_core::error::VeilError;
use veil_core::note::{EncryptedNoteRecord, NoteState};

use crate::apis::ClientContext;

/// A persisted transaction record plus its settlement material. The store
/// only ever sees ciphertext blobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub operation: String,
    pub tx_data: String,
    pub proof: String,
    pub public_input: String,
}

/// One page of transaction history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<StoredTransaction>,
    pub total_pages: u64,
}

/// The persistence collaborator for notes, transactions and sealed account
/// blobs. Notes and transactions accumulated during one operation arrive in
/// a single `commit` call; there is no partial flush.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Fetches encrypted notes in any of `states` (all indices, unless
    /// `indices` narrows the query).
    async fn get_notes(
        &self,
        ctx: &ClientContext,
        states: &[NoteState],
        indices: &[u64],
    ) -> Result<Vec<EncryptedNoteRecord>, VeilError>;

    /// Atomically upserts note records (keyed by index) and appends
    /// transaction records.
    async fn commit(
        &self,
        ctx: &ClientContext,
        notes: Vec<EncryptedNoteRecord>,
        txs: Vec<StoredTransaction>,
    ) -> Result<(), VeilError>;

    async fn get_transactions(
        &self,
        ctx: &ClientContext,
        page: u64,
        page_size: u64,
    ) -> Result<TransactionPage, VeilError>;

    async fn create_account(&self, ctx: &ClientContext, blob: String) -> Result<(), VeilError>;

    async fn update_account(&self, ctx: &ClientContext, blob: String) -> Result<(), VeilError>;

    async fn get_account(&self, ctx: &ClientContext) -> Result<String, VeilError>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    notes: HashMap<u64, EncryptedNoteRecord>,
    txs: Vec<StoredTransaction>,
    accounts: HashMap<String, String>,
}

/// In-memory store used by tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: how many note records exist.
    pub async fn note_count(&self) -> usize {
        self.inner.lock().await.notes.len()
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn get_notes(
        &self,
        ctx: &ClientContext,
        states: &[NoteState],
        indices: &[u64],
    ) -> Result<Vec<EncryptedNoteRecord>, VeilError> {
        let inner = self.inner.lock().await;
        let mut notes: Vec<EncryptedNoteRecord> = inner
            .notes
            .values()
            .filter(|n| n.alias == ctx.alias || n.alias == veil_core::note::DEFAULT_ALIAS)
            .filter(|n| states.contains(&n.state))
            .filter(|n| indices.is_empty() || indices.contains(&n.index))
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.index);
        Ok(notes)
    }

    async fn commit(
        &self,
        _ctx: &ClientContext,
        notes: Vec<EncryptedNoteRecord>,
        txs: Vec<StoredTransaction>,
    ) -> Result<(), VeilError> {
        let mut inner = self.inner.lock().await;
        for note in notes {
            inner.notes.insert(note.index, note);
        }
        // Re-encrypted history arrives with the proof material unchanged;
        // match on it so a rotation replaces records instead of duplicating.
        for tx in txs {
            let existing = inner
                .txs
                .iter_mut()
                .find(|t| t.proof == tx.proof && t.public_input == tx.public_input);
            match existing {
                Some(slot) => *slot = tx,
                None => inner.txs.push(tx),
            }
        }
        Ok(())
    }

    async fn get_transactions(
        &self,
        _ctx: &ClientContext,
        page: u64,
        page_size: u64,
    ) -> Result<TransactionPage, VeilError> {
        let inner = self.inner.lock().await;
        let start = (page * page_size) as usize;
        let transactions = inner
            .txs
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        let total_pages = (inner.txs.len() as u64).div_ceil(page_size.max(1));
        Ok(TransactionPage {
            transactions,
            total_pages,
        })
    }

    async fn create_account(&self, ctx: &ClientContext, blob: String) -> Result<(), VeilError> {
        let mut inner = self.inner.lock().await;
        if inner.accounts.contains_key(&ctx.alias) {
            return Err(VeilError::Conflict("account already registered"));
        }
        inner.accounts.insert(ctx.alias.clone(), blob);
        Ok(())
    }

    async fn update_account(&self, ctx: &ClientContext, blob: String) -> Result<(), VeilError> {
        let mut inner = self.inner.lock().await;
        if !inner.accounts.contains_key(&ctx.alias) {
            return Err(VeilError::NotFound("account is not registered"));
        }
        inner.accounts.insert(ctx.alias.clone(), blob);
        Ok(())
    }

    async fn get_account(&self, ctx: &ClientContext) -> Result<String, VeilError> {
        self.inner
            .lock()
            .await
            .accounts
            .get(&ctx.alias)
            .cloned()
            .ok_or(VeilError::NotFound("account is not registered"))
    }
}

#[derive(Serialize)]
struct NotesRequest<'a> {
    context: &'a ClientContext,
    note_state: &'a [NoteState],
    indices: &'a [u64],
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    context: &'a ClientContext,
    notes: &'a [EncryptedNoteRecord],
    inputs: &'a [StoredTransaction],
}

#[derive(Serialize)]
struct PageRequest<'a> {
    context: &'a ClientContext,
    page: u64,
    page_size: u64,
}

#[derive(Serialize)]
struct AccountRequest<'a> {
    context: &'a ClientContext,
    secret_account: Option<&'a str>,
}

#[derive(Deserialize)]
struct AccountResponse {
    secret_account: String,
}

/// HTTP client for the sequencer's note/transaction/account storage.
#[derive(Clone, Debug)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteStore {
    pub fn new(base_url: &str) -> Self {
        RemoteStore {
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
impl NoteStore for RemoteStore {
    async fn get_notes(
        &self,
        ctx: &ClientContext,
        states: &[NoteState],
        indices: &[u64],
    ) -> Result<Vec<EncryptedNoteRecord>, VeilError> {
        let request = NotesRequest {
            context: ctx,
            note_state: states,
            indices,
        };
        self.post("notes/get", &request).await
    }

    async fn commit(
        &self,
        ctx: &ClientContext,
        notes: Vec<EncryptedNoteRecord>,
        txs: Vec<StoredTransaction>,
    ) -> Result<(), VeilError> {
        let request = CommitRequest {
            context: ctx,
            notes: &notes,
            inputs: &txs,
        };
        let _: serde_json::Value = self.post("transactions/create", &request).await?;
        Ok(())
    }

    async fn get_transactions(
        &self,
        ctx: &ClientContext,
        page: u64,
        page_size: u64,
    ) -> Result<TransactionPage, VeilError> {
        let request = PageRequest {
            context: ctx,
            page,
            page_size,
        };
        self.post("transactions/get", &request).await
    }

    async fn create_account(&self, ctx: &ClientContext, blob: String) -> Result<(), VeilError> {
        let request = AccountRequest {
            context: ctx,
            secret_account: Some(&blob),
        };
        let _: serde_json::Value = self.post("accounts/create", &request).await?;
        Ok(())
    }

    async fn update_account(&self, ctx: &ClientContext, blob: String) -> Result<(), VeilError> {
        let request = AccountRequest {
            context: ctx,
            secret_account: Some(&blob),
        };
        let _: serde_json::Value = self.post("accounts/update", &request).await?;
        Ok(())
    }

    async fn get_account(&self, ctx: &ClientContext) -> Result<String, VeilError> {
        let request = AccountRequest {
            context: ctx,
            secret_account: None,
        };
        let response: AccountResponse = self.post("accounts/get", &request).await?;
        Ok(response.secret_account)
    }
}
