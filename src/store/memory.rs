//! In-memory channel storage
//!
//! Reference implementation of the [`Store`] contract backed by plain
//! maps. Used by tests and useful as the semantics baseline for durable
//! backends: the file store must behave identically apart from surviving
//! restarts.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::channel::SharedState;
use crate::errors::{Result, StoreError};
use crate::store::{Record, Store};

#[derive(Default)]
struct Inner {
    key_path_counter: u32,
    channels: HashMap<String, Record>,
    payments: HashMap<String, Vec<Vec<u8>>>,
}

/// Volatile [`Store`] implementation
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, id: &str) -> Result<Record> {
        let inner = self.inner.lock().await;
        inner.channels.get(id).cloned().ok_or_else(|| StoreError::NotFound.into())
    }

    async fn list(&self) -> Result<Vec<Record>> {
        let inner = self.inner.lock().await;
        Ok(inner.channels.values().cloned().collect())
    }

    async fn create(&self, record: Record) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.channels.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists.into());
        }
        inner.channels.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        prev: &SharedState,
        new: &SharedState,
        payment: Option<&[u8]>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let record = inner.channels.get(id).ok_or(StoreError::NotFound)?;
        if record.state.cas_tuple() != prev.cas_tuple() {
            return Err(StoreError::ConcurrentUpdate.into());
        }

        if let Some(record) = inner.channels.get_mut(id) {
            record.state = new.clone();
        }
        if let Some(payment) = payment {
            inner.payments.entry(id.to_string()).or_default().push(payment.to_vec());
        }
        Ok(())
    }

    async fn reserve_key_path(&self) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        let path = inner.key_path_counter;
        inner.key_path_counter += 1;
        Ok(path)
    }

    async fn list_payments(&self, id: &str) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.lock().await;
        Ok(inner.payments.get(id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_utils::test_state;
    use crate::channel::Status;
    use crate::errors::Error;
    use crate::wire::channel_id;

    fn test_record() -> Record {
        let state = test_state();
        Record {
            id: channel_id(&state.funding_txid, state.funding_vout),
            key_path: 0,
            state,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let record = test_record();

        assert!(matches!(
            store.get(&record.id).await,
            Err(Error::Store(StoreError::NotFound))
        ));

        store.create(record.clone()).await.expect("create");
        assert_eq!(store.get(&record.id).await.expect("get"), record);

        assert!(matches!(
            store.create(record).await,
            Err(Error::Store(StoreError::AlreadyExists))
        ));
    }

    #[tokio::test]
    async fn test_update_cas() {
        let store = MemoryStore::new();
        let record = test_record();
        store.create(record.clone()).await.expect("create");

        let prev = record.state.clone();
        let mut next = prev.clone();
        next.balance = 1000;
        next.count = 1;

        store.update(&record.id, &prev, &next, Some(&[1, 2, 3])).await.expect("update");

        // A second update from the stale previous state must fail
        let mut other = prev.clone();
        other.balance = 2000;
        other.count = 1;
        assert!(matches!(
            store.update(&record.id, &prev, &other, None).await,
            Err(Error::Store(StoreError::ConcurrentUpdate))
        ));

        let stored = store.get(&record.id).await.expect("get");
        assert_eq!(stored.state.balance, 1000);
        assert_eq!(store.list_payments(&record.id).await.expect("payments"), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_concurrent_sends_one_wins() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let record = test_record();
        store.create(record.clone()).await.expect("create");

        let prev = record.state.clone();
        let mut a = prev.clone();
        a.balance = 1000;
        a.count = 1;
        let mut b = prev.clone();
        b.balance = 2000;
        b.count = 1;

        let (ra, rb) = tokio::join!(
            store.update(&record.id, &prev, &a, Some(b"a")),
            store.update(&record.id, &prev, &b, Some(b"b")),
        );

        // Exactly one concurrent update may win
        assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
        assert_eq!(store.list_payments(&record.id).await.expect("payments").len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = MemoryStore::new();
        let state = test_state();
        assert!(matches!(
            store.update("missing-0", &state, &state, None).await,
            Err(Error::Store(StoreError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_reserve_key_path() {
        let store = MemoryStore::new();
        assert_eq!(store.reserve_key_path().await.expect("reserve"), 0);
        assert_eq!(store.reserve_key_path().await.expect("reserve"), 1);
        assert_eq!(store.reserve_key_path().await.expect("reserve"), 2);
    }

    #[tokio::test]
    async fn test_closed_is_terminal_in_cas() {
        let store = MemoryStore::new();
        let mut record = test_record();
        record.state.status = Status::Closed;
        store.create(record.clone()).await.expect("create");

        // An update racing against the terminal state loses
        let mut stale = record.state.clone();
        stale.status = Status::Closing;
        let next = record.state.clone();
        assert!(matches!(
            store.update(&record.id, &stale, &next, None).await,
            Err(Error::Store(StoreError::ConcurrentUpdate))
        ));
    }
}
