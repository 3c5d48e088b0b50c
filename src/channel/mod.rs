//! Channel module for unidirectional payment channels
//!
//! This module provides the shared state machine for unidirectional
//! payment channels between a paying sender and a receiving service.
//! Funds are locked on chain in a 2-of-2-or-timeout P2SH output;
//! payments are off-chain state updates signed by the sender, and
//! settlement happens when either party publishes the latest co-signed
//! closure transaction.
//!
//! # Structure
//!
//! The module is organized into functional domains:
//! - `state`: Lifecycle status and the shared channel state record
//! - `script`: Funding redeem script and P2SH address construction
//! - `tx`: Closure and refund transaction builders, signing, validation
//! - `sender` / `receiver`: The two role state machines

pub mod receiver;
pub mod script;
pub mod sender;
pub mod state;
pub mod tx;

#[cfg(test)]
pub mod test_utils;

pub use receiver::{Receiver, ReceiverConfig};
pub use script::funding_script;
pub use sender::{Sender, SenderConfig};
pub use state::{chain_hash, Net, SharedState, Status};
