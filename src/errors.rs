//! Error types for the moonbeam library
//!
//! This module defines all error types used throughout the library,
//! providing detailed error information for debugging and handling.
//! The RPC layer maps these onto HTTP status codes; everything not
//! explicitly exposable is reported as an internal error.

use thiserror::Error;

use crate::channel::Status;

/// The main error type for the moonbeam library
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Channel protocol errors
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Durable storage errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Blockchain backend errors
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Receiver service errors
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Errors that can occur during channel operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChannelError {
    /// Output address is malformed, of an unsupported script class, or
    /// for the wrong network
    #[error("invalid address")]
    InvalidAddress,

    /// Public key is not a valid compressed secp256k1 point
    #[error("invalid public key")]
    InvalidPubKey,

    /// Funding transaction id is not 32 bytes of hex
    #[error("invalid txid")]
    InvalidTxId,

    /// Amount is malformed (non-positive where a positive value is required)
    #[error("invalid amount")]
    InvalidAmount,

    /// Sender signature does not validate the reconstructed closure
    /// transaction under the script interpreter
    #[error("invalid signature")]
    InvalidSignature,

    /// Payment blob is malformed or out of size bounds
    #[error("invalid payment")]
    InvalidPayment,

    /// Amount would leave the receiver balance below the dust threshold
    #[error("amount is too small")]
    AmountTooSmall,

    /// Amount exceeds the channel capacity net of the close fee
    #[error("amount exceeds channel capacity")]
    InsufficientCapacity,

    /// Operation was attempted in the wrong lifecycle state
    #[error("channel is not in state {expected}")]
    WrongStatus {
        /// Status the operation requires
        expected: Status,
    },

    /// Counterparty speaks a different protocol version
    #[error("unsupported version")]
    UnsupportedVersion,

    /// Counterparty is on a different network
    #[error("unsupported net")]
    UnsupportedNet,

    /// Proposed timeout is outside the accepted policy window
    #[error("timeout out of range")]
    TimeoutOutOfRange,

    /// Proposed close fee is outside the accepted policy window
    #[error("fee out of range")]
    FeeOutOfRange,

    /// Counterparty's funding address differs from the locally
    /// recomputed P2SH address
    #[error("funding address mismatch")]
    FundingAddressMismatch,

    /// Serialized transaction failed decode or interpreter validation
    #[error("invalid transaction: {0}")]
    InvalidTx(String),

    /// Script construction failed
    #[error("script error: {0}")]
    Script(String),

    /// Loaded state is internally inconsistent
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Errors that can occur in the channel registry's durable storage
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// No record exists for the channel id
    #[error("record not found")]
    NotFound,

    /// A record already exists for the channel id
    #[error("record already exists")]
    AlreadyExists,

    /// The persisted state tuple no longer matches the caller's previous
    /// state; the caller must re-read and re-evaluate
    #[error("concurrent update")]
    ConcurrentUpdate,

    /// Underlying filesystem failure
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted document failed to encode or decode
    #[error("storage encoding: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by the blockchain backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainError {
    /// The node RPC call failed
    #[error("chain backend: {0}")]
    Backend(String),
}

/// Errors that can occur in the receiver service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServiceError {
    /// The funding outpoint is not a known unspent output
    #[error("confirmed utxo not found")]
    UtxoNotFound,

    /// The funding transaction has too few confirmations
    #[error("too few confirmations: have {have}, need {need}")]
    TooFewConfirmations {
        /// Confirmations observed on the funding transaction
        have: u64,
        /// Confirmations required by policy
        need: u64,
    },

    /// Coinbase outputs cannot fund a channel
    #[error("cannot use coinbase utxo")]
    CoinbaseForbidden,

    /// Auth token is missing or does not match the channel
    #[error("unauthorized")]
    Unauthorized,

    /// Child key derivation failed
    #[error("key derivation: {0}")]
    KeyDerivation(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
