#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Moonbeam
//!
//! Unidirectional off-chain Bitcoin payment channels between a paying
//! sender and a receiving service that aggregates many channels on
//! behalf of a hosted domain.
//!
//! Funds are locked on chain in a 2-of-2-or-timeout P2SH output;
//! payments are off-chain state updates signed by the sender, and
//! settlement happens when either party publishes the latest co-signed
//! closure transaction. The crate provides the shared channel state
//! machine, the script and transaction engine, both role state
//! machines, the receiver's durable channel registry, and the chain
//! watcher that force-closes channels approaching their refund timeout.

pub mod address;
pub mod chain;
pub mod channel;
pub mod errors;
pub mod service;
pub mod store;
pub mod types;
pub mod wire;

// Re-export commonly used types
pub use chain::ChainBackend;
pub use channel::{Net, Receiver, ReceiverConfig, Sender, SenderConfig, SharedState, Status};
pub use errors::{ChannelError, Error, Result};
pub use service::{ChainWatcher, KeyChain, ReceiverService, ServiceConfig};
pub use store::{FileStore, MemoryStore, Record, Store};
