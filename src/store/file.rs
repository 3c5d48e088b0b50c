//! File-backed channel storage
//!
//! Persists the whole registry as one JSON document
//! `{keyPathCounter, channels, payments}` and rewrites it atomically on
//! every mutation through a temp-file-then-rename. The document is small
//! (one record per hosted channel), so whole-file rewrites keep the
//! durability contract simple: a crash leaves either the old or the new
//! document, never a torn one.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::channel::SharedState;
use crate::errors::{Result, StoreError};
use crate::store::{Record, Store};

/// A payment blob, hex-encoded on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Blob(#[serde(with = "hex::serde")] Vec<u8>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    key_path_counter: u32,
    channels: BTreeMap<String, Record>,
    payments: BTreeMap<String, Vec<Blob>>,
}

/// Durable [`Store`] implementation over a single JSON file
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<Document>,
}

impl FileStore {
    /// Opens a store, loading the existing document if there is one
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(StoreError::Serialization)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Document::default(),
            Err(e) => return Err(StoreError::Io(e).into()),
        };

        Ok(Self { path, inner: Mutex::new(document) })
    }

    /// Writes a document to disk via temp file and rename
    async fn persist(&self, document: &Document) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document).map_err(StoreError::Serialization)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await.map_err(StoreError::Io)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(StoreError::Io)?;
        Ok(())
    }

    /// Applies a mutation to a copy of the document and commits it to
    /// memory only once the copy has reached disk
    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Document) -> Result<()>,
    {
        let mut inner = self.inner.lock().await;

        let mut candidate = inner.clone();
        f(&mut candidate)?;
        self.persist(&candidate).await?;

        *inner = candidate;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, id: &str) -> Result<Record> {
        let inner = self.inner.lock().await;
        inner.channels.get(id).cloned().ok_or_else(|| StoreError::NotFound.into())
    }

    async fn list(&self) -> Result<Vec<Record>> {
        let inner = self.inner.lock().await;
        Ok(inner.channels.values().cloned().collect())
    }

    async fn create(&self, record: Record) -> Result<()> {
        self.mutate(|doc| {
            if doc.channels.contains_key(&record.id) {
                return Err(StoreError::AlreadyExists.into());
            }
            doc.channels.insert(record.id.clone(), record.clone());
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        id: &str,
        prev: &SharedState,
        new: &SharedState,
        payment: Option<&[u8]>,
    ) -> Result<()> {
        self.mutate(|doc| {
            let record = doc.channels.get_mut(id).ok_or(StoreError::NotFound)?;
            if record.state.cas_tuple() != prev.cas_tuple() {
                return Err(StoreError::ConcurrentUpdate.into());
            }
            record.state = new.clone();
            if let Some(payment) = payment {
                doc.payments.entry(id.to_string()).or_default().push(Blob(payment.to_vec()));
            }
            Ok(())
        })
        .await
    }

    async fn reserve_key_path(&self) -> Result<u32> {
        let mut reserved = 0;
        self.mutate(|doc| {
            reserved = doc.key_path_counter;
            doc.key_path_counter += 1;
            Ok(())
        })
        .await?;
        Ok(reserved)
    }

    async fn list_payments(&self, id: &str) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .get(id)
            .map(|blobs| blobs.iter().map(|b| b.0.clone()).collect())
            .unwrap_or_default())
    }
}
