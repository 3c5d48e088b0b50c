//! Wire message schemas and RPC surface
//!
//! Self-describing JSON messages exchanged between sender and receiver,
//! plus the transport-free description of the receiver's RPC surface
//! (method, path and auth gating per operation) and the domain discovery
//! document. The HTTP transport itself lives outside this crate; servers
//! and clients consume these schemas and tables.
//!
//! Byte fields (keys, signatures, hashes) travel as lower-case hex so
//! that serializing and deserializing any message preserves them
//! byte-for-byte.

use serde::{Deserialize, Serialize};

use crate::channel::Net;
use crate::errors::{ChainError, Error, ServiceError, StoreError};

/// Well-known path of the domain discovery document
pub const MOONBEAM_JSON_PATH: &str = "/moonbeam.json";

/// One receiver endpoint advertised by a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainReceiver {
    /// Base URL of the receiver's RPC endpoint
    pub url: String,
}

/// Domain discovery document served at `/moonbeam.json`
///
/// The first listed receiver wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDocument {
    /// Receivers hosted by the domain, in preference order
    pub receivers: Vec<DomainReceiver>,
}

/// Payment blob understood by the receiver's application layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Amount in satoshis
    pub amount: i64,
    /// Moonbeam address of the recipient within the hosted domain
    pub target: String,
}

/// Sender's channel proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    /// Protocol version
    pub version: i64,
    /// Network the channel will live on
    pub net: Net,
    /// Sender's compressed public key
    #[serde(with = "hex::serde")]
    pub sender_pub_key: Vec<u8>,
    /// Sender's payout address
    pub sender_output: String,
}

/// Receiver's terms in answer to a [`CreateRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    /// Protocol version
    pub version: i64,
    /// Network the channel will live on
    pub net: Net,
    /// Refund timeout in blocks chosen by the receiver
    pub timeout: i64,
    /// Absolute close fee in satoshis chosen by the receiver
    pub fee: i64,
    /// Receiver's compressed public key
    #[serde(with = "hex::serde")]
    pub receiver_pub_key: Vec<u8>,
    /// Receiver's payout address
    pub receiver_output: String,
    /// P2SH address the sender must fund
    pub funding_address: String,
    /// Opaque receiver bookkeeping echoed back on open
    #[serde(with = "hex::serde")]
    pub receiver_data: Vec<u8>,
}

/// Sender's request to open a funded channel
///
/// Carries the full negotiated terms so the receiver can rebuild the
/// shared state without trusting anything beyond its own key and policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    /// Protocol version
    pub version: i64,
    /// Network the channel lives on
    pub net: Net,
    /// Negotiated refund timeout in blocks
    pub timeout: i64,
    /// Negotiated absolute close fee in satoshis
    pub fee: i64,
    /// Sender's compressed public key
    #[serde(with = "hex::serde")]
    pub sender_pub_key: Vec<u8>,
    /// Sender's payout address
    pub sender_output: String,
    /// Receiver's compressed public key
    #[serde(with = "hex::serde")]
    pub receiver_pub_key: Vec<u8>,
    /// Receiver's payout address
    pub receiver_output: String,
    /// Funding transaction id, lower-case hex
    pub txid: String,
    /// Funding output index
    pub vout: u32,
    /// Sender's signature over the zero-balance closure
    #[serde(with = "hex::serde")]
    pub sender_sig: Vec<u8>,
    /// Receiver bookkeeping from the create response
    #[serde(with = "hex::serde")]
    pub receiver_data: Vec<u8>,
}

/// Receiver's acknowledgement that a channel is open
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResponse {
    /// Bearer token the sender must present on subsequent calls
    pub auth_token: String,
}

/// Dry-run validation of a prospective payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    /// Funding transaction id
    pub txid: String,
    /// Funding output index
    pub vout: u32,
    /// Serialized payment blob
    #[serde(with = "hex::serde")]
    pub payment: Vec<u8>,
}

/// Result of a validation dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Whether the payment would currently be accepted
    pub valid: bool,
}

/// A payment together with the signature covering the advanced state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// Funding transaction id
    pub txid: String,
    /// Funding output index
    pub vout: u32,
    /// Serialized payment blob
    #[serde(with = "hex::serde")]
    pub payment: Vec<u8>,
    /// Sender's signature over the closure for the new
    /// `(balance, payments_hash)`
    #[serde(with = "hex::serde")]
    pub sender_sig: Vec<u8>,
}

/// Receiver's acknowledgement of an accepted payment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendResponse {}

/// Request to settle the channel cooperatively
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    /// Funding transaction id
    pub txid: String,
    /// Funding output index
    pub vout: u32,
}

/// The co-signed close transaction, ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
    /// Serialized close transaction
    #[serde(with = "hex::serde")]
    pub close_tx: Vec<u8>,
}

/// Request for the receiver's view of the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    /// Funding transaction id
    pub txid: String,
    /// Funding output index
    pub vout: u32,
}

/// Receiver's view of the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Lifecycle status wire code (1..4)
    pub status: u8,
    /// Satoshis committed to the receiver so far
    pub balance: i64,
    /// Rolling digest over the accepted payments
    #[serde(with = "hex::serde")]
    pub payments_hash: Vec<u8>,
}

/// Derives the channel id for a funding outpoint
///
/// Channel ids have the form `<lower-hex-txid>-<vout>`.
pub fn channel_id(txid: &str, vout: u32) -> String {
    format!("{}-{}", txid.to_lowercase(), vout)
}

/// Splits a channel id back into its funding outpoint
pub fn parse_channel_id(id: &str) -> Option<(String, u32)> {
    let (txid, vout) = id.rsplit_once('-')?;
    if txid.len() != 64 || !txid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
        return None;
    }
    let vout = vout.parse().ok()?;
    Some((txid.to_string(), vout))
}

/// Operations exposed over the receiver's RPC surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Negotiate channel terms
    Create,
    /// Open a funded channel
    Open,
    /// Dry-run a payment
    Validate,
    /// Submit a payment
    Send,
    /// Settle cooperatively
    Close,
    /// Read channel status
    Status,
}

impl Operation {
    /// HTTP method used by this operation
    pub fn method(self) -> &'static str {
        match self {
            Operation::Create => "POST",
            Operation::Open => "PUT",
            Operation::Validate => "PUT",
            Operation::Send => "POST",
            Operation::Close => "DELETE",
            Operation::Status => "GET",
        }
    }

    /// URL path for this operation
    ///
    /// Every operation except `create` addresses a specific channel; the
    /// id in the path must match the in-body `(txid, vout)`.
    pub fn path(self, channel_id: &str) -> String {
        match self {
            Operation::Create => "/rpc/create".to_string(),
            Operation::Open => format!("/rpc/open/{channel_id}"),
            Operation::Validate => format!("/rpc/validate/{channel_id}"),
            Operation::Send => format!("/rpc/send/{channel_id}"),
            Operation::Close => format!("/rpc/close/{channel_id}"),
            Operation::Status => format!("/rpc/status/{channel_id}"),
        }
    }

    /// Whether the operation must present a channel auth token
    ///
    /// `create` precedes any channel and `open` is what issues the
    /// token; everything after is gated.
    pub fn requires_auth(self) -> bool {
        matches!(
            self,
            Operation::Validate | Operation::Send | Operation::Close | Operation::Status
        )
    }
}

/// Maps an error onto the HTTP status code the RPC layer reports
///
/// Exposable protocol errors map to 400, authentication failures to 401,
/// unknown channels to 404; storage and chain failures stay internal.
pub fn http_status(err: &Error) -> u16 {
    match err {
        Error::Channel(_) => 400,
        Error::Service(ServiceError::Unauthorized) => 401,
        Error::Service(ServiceError::KeyDerivation(_)) => 500,
        Error::Service(_) => 400,
        Error::Store(StoreError::NotFound) => 404,
        Error::Store(StoreError::AlreadyExists | StoreError::ConcurrentUpdate) => 400,
        Error::Store(_) => 500,
        Error::Chain(ChainError::Backend(_)) => 500,
    }
}

/// Suppresses internal error detail before it reaches a client
pub fn exposable_message(err: &Error) -> String {
    match http_status(err) {
        500 => "internal error".to_string(),
        _ => err.to_string(),
    }
}
