//! Blockchain backend interface
//!
//! The receiver service only needs four things from a Bitcoin node: a
//! UTXO lookup for funding outputs, the current block count, block
//! header metadata for height resolution, and transaction broadcast.
//! They are modeled as an async trait so the node RPC client stays
//! outside this crate and tests can substitute a mock.
//!
//! All methods may suspend; callers bound them with their own deadlines.

use async_trait::async_trait;
use bitcoin::{ScriptBuf, Txid};

use crate::errors::Result;

/// A confirmed transaction output as reported by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutInfo {
    /// Output value in satoshis
    pub value: i64,
    /// Locking script of the output
    pub script_pubkey: ScriptBuf,
    /// Confirmations at lookup time
    pub confirmations: u64,
    /// Whether the output belongs to a coinbase transaction
    pub coinbase: bool,
    /// Hash of the chain tip the lookup was answered at
    pub best_block: String,
}

/// Block header metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderInfo {
    /// Block hash, lower-case hex
    pub hash: String,
    /// Height of the block
    pub height: u64,
}

/// Read and broadcast access to the Bitcoin network
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Looks up an unspent, confirmed transaction output
    ///
    /// Returns `None` when the outpoint is unknown or already spent.
    async fn get_tx_out(&self, txid: &Txid, vout: u32) -> Result<Option<TxOutInfo>>;

    /// Current number of blocks in the best chain
    async fn block_count(&self) -> Result<u64>;

    /// Header metadata for a block hash
    async fn get_block_header(&self, hash: &str) -> Result<BlockHeaderInfo>;

    /// Broadcasts a raw transaction, returning its txid
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Txid>;
}

#[async_trait]
impl<T: ChainBackend + ?Sized> ChainBackend for std::sync::Arc<T> {
    async fn get_tx_out(&self, txid: &Txid, vout: u32) -> Result<Option<TxOutInfo>> {
        (**self).get_tx_out(txid, vout).await
    }

    async fn block_count(&self) -> Result<u64> {
        (**self).block_count().await
    }

    async fn get_block_header(&self, hash: &str) -> Result<BlockHeaderInfo> {
        (**self).get_block_header(hash).await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Txid> {
        (**self).send_raw_transaction(raw).await
    }
}
