//! Channel registry storage
//!
//! The receiver keeps every channel it hosts in a durable store keyed by
//! channel id (`<lower-hex-txid>-<vout>`). Mutations go through an
//! optimistic compare-and-swap over the state tuple
//! `(status, count, balance, payments_hash)`, which makes per-channel
//! operations linearizable without any in-memory locking between worker
//! tasks. Each mutating call either completes and is visible to later
//! reads, or fails without modifying state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::SharedState;
use crate::errors::Result;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// One hosted channel as persisted by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Channel id, `<lower-hex-txid>-<vout>`
    pub id: String,
    /// Index of the receiver's HD child key for this channel
    pub key_path: u32,
    /// Latest agreed channel state
    pub state: SharedState,
}

/// Durable, optimistically-concurrent channel storage
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches a record by channel id
    ///
    /// # Errors
    /// * `StoreError::NotFound` - no record exists for the id
    async fn get(&self, id: &str) -> Result<Record>;

    /// Lists all records
    async fn list(&self) -> Result<Vec<Record>>;

    /// Creates a record
    ///
    /// # Errors
    /// * `StoreError::AlreadyExists` - the id is already registered
    async fn create(&self, record: Record) -> Result<()>;

    /// Replaces a channel's state, compare-and-swap style
    ///
    /// The persisted state's `(status, count, balance, payments_hash)`
    /// tuple must equal `prev`'s; on success the state is replaced and
    /// `payment`, if any, is appended to the channel's payment log in
    /// the same atomic step.
    ///
    /// # Errors
    /// * `StoreError::NotFound` - no record exists for the id
    /// * `StoreError::ConcurrentUpdate` - the tuple no longer matches
    async fn update(
        &self,
        id: &str,
        prev: &SharedState,
        new: &SharedState,
        payment: Option<&[u8]>,
    ) -> Result<()>;

    /// Reserves the next HD key path
    ///
    /// The counter is monotonic; a reserved path is never handed out
    /// again, even if the channel it was reserved for never opens.
    async fn reserve_key_path(&self) -> Result<u32>;

    /// Lists the payment blobs accepted on a channel, oldest first
    async fn list_payments(&self, id: &str) -> Result<Vec<Vec<u8>>>;
}
