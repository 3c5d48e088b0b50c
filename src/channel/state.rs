//! Shared channel state
//!
//! This module defines the authoritative record of a payment channel as
//! agreed by both parties: the negotiated parameters, the funding
//! outpoint, and the latest balance, payment count, payments hash and
//! sender signature. The record has value semantics; transitions clone,
//! mutate and then compare-and-swap through the registry.
//!
//! # Invariants
//!
//! - Status only moves forward: Created -> Open -> Closing -> Closed
//! - `balance` never decreases while the channel is open
//! - `count` strictly increases on each accepted payment
//! - `0 <= balance` and `balance + fee <= capacity`

use std::fmt;
use std::str::FromStr;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, AddressType, Network, PublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{ChannelError, Result};
use crate::types::{PaymentsHash, DUST_THRESHOLD};

/// Channel lifecycle status
///
/// The four states form a line: a channel is proposed (Created), funded
/// and active (Open), settling (Closing), and finally settled (Closed).
/// No backward transition exists. The wire protocol encodes the variants
/// as the integer codes 1 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Channel terms are being negotiated; nothing is on chain yet
    Created,
    /// Funding output confirmed and zero-balance closure signed
    Open,
    /// A close transaction has been co-signed and broadcast
    Closing,
    /// The close transaction is confirmed on chain
    Closed,
}

impl Status {
    /// Integer wire code for this status
    pub fn code(self) -> u8 {
        match self {
            Status::Created => 1,
            Status::Open => 2,
            Status::Closing => 3,
            Status::Closed => 4,
        }
    }

    /// Decodes an integer wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Status::Created),
            2 => Some(Status::Open),
            3 => Some(Status::Closing),
            4 => Some(Status::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Created => "CREATED",
            Status::Open => "OPEN",
            Status::Closing => "CLOSING",
            Status::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

impl Serialize for Status {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Status::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid status code {code}")))
    }
}

/// Bitcoin network a channel lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Net {
    /// Bitcoin mainnet
    #[serde(rename = "mainnet")]
    Mainnet,
    /// Bitcoin testnet3
    #[serde(rename = "testnet3")]
    Testnet3,
}

impl Net {
    /// Wire name of the network
    pub fn as_str(self) -> &'static str {
        match self {
            Net::Mainnet => "mainnet",
            Net::Testnet3 => "testnet3",
        }
    }

    /// Corresponding `bitcoin` crate network parameters
    pub fn network(self) -> Network {
        match self {
            Net::Mainnet => Network::Bitcoin,
            Net::Testnet3 => Network::Testnet,
        }
    }
}

impl fmt::Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Net {
    type Err = ChannelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Net::Mainnet),
            "testnet3" => Ok(Net::Testnet3),
            _ => Err(ChannelError::UnsupportedNet),
        }
    }
}

/// The channel state shared between sender and receiver
///
/// Both roles hold a copy of this record and advance it in lockstep.
/// The receiver's copy is the source of truth; the registry persists it
/// and guards transitions with an optimistic compare-and-swap over
/// `(status, count, balance, payments_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    /// Protocol version (currently 1)
    pub version: i64,
    /// Network the channel lives on
    pub net: Net,
    /// Relative timeout of the refund branch in blocks
    pub timeout: i64,
    /// Absolute close transaction fee in satoshis
    pub fee: i64,
    /// Lifecycle status
    pub status: Status,
    /// Sender's 33-byte compressed public key
    #[serde(with = "hex::serde")]
    pub sender_pubkey: Vec<u8>,
    /// Receiver's 33-byte compressed public key
    #[serde(with = "hex::serde")]
    pub receiver_pubkey: Vec<u8>,
    /// Sender's payout address (P2PKH or P2SH, net-matched)
    pub sender_output: String,
    /// Receiver's payout address (P2PKH or P2SH, net-matched)
    pub receiver_output: String,
    /// Funding transaction id, lower-case hex
    pub funding_txid: String,
    /// Funding output index
    pub funding_vout: u32,
    /// Satoshis locked in the funding output
    pub capacity: i64,
    /// Height at which the funding transaction was mined
    pub block_height: u64,
    /// Satoshis committed to the receiver so far
    pub balance: i64,
    /// Number of accepted payments
    pub count: i64,
    /// Rolling digest over the accepted payments
    #[serde(with = "hex::serde")]
    pub payments_hash: PaymentsHash,
    /// Sender's signature over the closure transaction for the current
    /// `(balance, payments_hash)`
    #[serde(with = "hex::serde")]
    pub sender_sig: Vec<u8>,
}

impl SharedState {
    /// Validates a proposed payment amount against the current state
    ///
    /// # Returns
    /// The balance the channel would have after accepting the amount.
    ///
    /// # Errors
    /// * `ChannelError::AmountTooSmall` - amount is non-positive, or the
    ///   new balance would be below the dust threshold
    /// * `ChannelError::InsufficientCapacity` - amount or new balance
    ///   plus fee exceeds capacity (overflow-safe)
    pub fn validate_amount(&self, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(ChannelError::AmountTooSmall.into());
        }
        if amount > self.capacity {
            return Err(ChannelError::InsufficientCapacity.into());
        }

        let new_balance =
            self.balance.checked_add(amount).ok_or(ChannelError::InsufficientCapacity)?;

        if new_balance < DUST_THRESHOLD {
            return Err(ChannelError::AmountTooSmall.into());
        }

        let settled = new_balance.checked_add(self.fee).ok_or(ChannelError::InsufficientCapacity)?;
        if settled > self.capacity {
            return Err(ChannelError::InsufficientCapacity.into());
        }

        Ok(new_balance)
    }

    /// Sender's public key parsed from its compressed encoding
    pub fn sender_public_key(&self) -> Result<PublicKey> {
        parse_pubkey(&self.sender_pubkey)
    }

    /// Receiver's public key parsed from its compressed encoding
    pub fn receiver_public_key(&self) -> Result<PublicKey> {
        parse_pubkey(&self.receiver_pubkey)
    }

    /// The tuple guarded by the registry's compare-and-swap
    pub fn cas_tuple(&self) -> (Status, i64, i64, PaymentsHash) {
        (self.status, self.count, self.balance, self.payments_hash)
    }

    /// Checks internal consistency of a state loaded from storage
    ///
    /// # Errors
    /// * `ChannelError::InvalidState` - a field combination violates the
    ///   channel invariants
    pub fn sanity_check(&self) -> Result<()> {
        if self.balance < 0 {
            return Err(ChannelError::InvalidState("negative balance".into()).into());
        }
        if self.count < 0 {
            return Err(ChannelError::InvalidState("negative count".into()).into());
        }
        if self.capacity < 0 {
            return Err(ChannelError::InvalidState("negative capacity".into()).into());
        }
        if self.fee < 0 {
            return Err(ChannelError::InvalidState("negative fee".into()).into());
        }
        // Sub-policy channels recorded straight into Closing may carry a
        // fee larger than their capacity; the bound only holds while Open.
        if self.status == Status::Open
            && self.capacity > 0
            && self.balance.checked_add(self.fee).map_or(true, |s| s > self.capacity)
        {
            return Err(
                ChannelError::InvalidState("balance plus fee exceeds capacity".into()).into()
            );
        }
        Ok(())
    }
}

/// Advances the payments hash chain by one accepted payment
///
/// `chain_hash(prev, p) = SHA256(p || prev)`, with the chain anchored at
/// the all-zero hash before the first payment.
pub fn chain_hash(prev: PaymentsHash, payment: &[u8]) -> PaymentsHash {
    let mut hasher = Sha256::new();
    hasher.update(payment);
    hasher.update(prev);
    hasher.finalize().into()
}

/// Parses a 33-byte compressed secp256k1 public key
pub(crate) fn parse_pubkey(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != 33 {
        return Err(ChannelError::InvalidPubKey.into());
    }
    PublicKey::from_slice(bytes).map_err(|_| ChannelError::InvalidPubKey.into())
}

/// Parses and validates a payout address for the given network
///
/// Only P2PKH and P2SH script classes are supported for channel payouts;
/// anything else, or an address for another network, is rejected.
pub(crate) fn check_supported_address(net: Net, addr: &str) -> Result<Address> {
    let parsed: Address<NetworkUnchecked> =
        addr.parse().map_err(|_| ChannelError::InvalidAddress)?;
    let address = parsed.require_network(net.network()).map_err(|_| ChannelError::InvalidAddress)?;
    match address.address_type() {
        Some(AddressType::P2pkh) | Some(AddressType::P2sh) => Ok(address),
        _ => Err(ChannelError::InvalidAddress.into()),
    }
}
