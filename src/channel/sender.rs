//! Sender role
//!
//! The sender drives the channel: it proposes terms, funds the channel
//! on chain, signs every balance update, initiates the cooperative
//! close, and can always fall back to the CSV-delayed refund. Each
//! operation asserts the lifecycle state it requires and fails with
//! `WrongStatus` otherwise, so the state machine can only move forward.

use bitcoin::secp256k1::Secp256k1;
use bitcoin::PrivateKey;

use crate::channel::state::{
    chain_hash, check_supported_address, parse_pubkey, Net, SharedState, Status,
};
use crate::errors::{ChannelError, Result};
use crate::types::{validate_payment_size, PROTOCOL_VERSION, TYPICAL_CLOSE_TX_SIZE};
use crate::wire::{
    CloseRequest, CloseResponse, CreateRequest, CreateResponse, OpenRequest, OpenResponse,
    SendRequest, SendResponse,
};

/// Acceptance policy for the terms a receiver may dictate
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Network the sender is willing to open channels on
    pub net: Net,
    /// Smallest refund timeout the sender accepts, in blocks
    pub min_timeout: i64,
    /// Largest refund timeout the sender accepts, in blocks
    pub max_timeout: i64,
    /// Smallest close fee rate the sender accepts, in sat/byte
    pub min_fee_rate: i64,
    /// Largest close fee rate the sender accepts, in sat/byte
    pub max_fee_rate: i64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            net: Net::Testnet3,
            min_timeout: 144,
            max_timeout: 1008,
            min_fee_rate: 10,
            max_fee_rate: 300,
        }
    }
}

/// The sender's half of a payment channel
#[derive(Debug, Clone)]
pub struct Sender {
    config: SenderConfig,
    privkey: PrivateKey,
    state: SharedState,
    receiver_data: Vec<u8>,
}

/// Serializes the compressed public key for a private key
pub(crate) fn derive_pubkey(privkey: &PrivateKey) -> Vec<u8> {
    let secp = Secp256k1::new();
    privkey.inner.public_key(&secp).serialize().to_vec()
}

impl Sender {
    /// Creates a fresh sender in the Created state
    pub fn new(config: SenderConfig, privkey: PrivateKey) -> Result<Self> {
        let state = SharedState {
            version: PROTOCOL_VERSION,
            net: config.net,
            timeout: 0,
            fee: 0,
            status: Status::Created,
            sender_pubkey: derive_pubkey(&privkey),
            receiver_pubkey: vec![],
            sender_output: String::new(),
            receiver_output: String::new(),
            funding_txid: String::new(),
            funding_vout: 0,
            capacity: 0,
            block_height: 0,
            balance: 0,
            count: 0,
            payments_hash: [0u8; 32],
            sender_sig: vec![],
        };

        Ok(Self { config, privkey, state, receiver_data: vec![] })
    }

    /// Re-hydrates a sender from persisted state
    ///
    /// # Errors
    /// * `ChannelError::InvalidState` - the state does not belong to
    ///   this configuration or key, or is internally inconsistent
    pub fn load(config: SenderConfig, state: SharedState, privkey: PrivateKey) -> Result<Self> {
        if config.net != state.net {
            return Err(
                ChannelError::InvalidState("state net differs from config net".into()).into()
            );
        }
        if derive_pubkey(&privkey) != state.sender_pubkey {
            return Err(
                ChannelError::InvalidState("state sender pubkey differs from privkey".into())
                    .into(),
            );
        }
        state.sanity_check()?;

        Ok(Self { config, privkey, state, receiver_data: vec![] })
    }

    /// The sender's view of the shared state
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Builds the channel proposal
    ///
    /// Records the payout address and returns the request to post to the
    /// receiver's `create` endpoint.
    pub fn get_create_request(&mut self, output_addr: &str) -> Result<CreateRequest> {
        self.require_status(Status::Created)?;
        check_supported_address(self.state.net, output_addr)?;

        self.state.sender_output = output_addr.to_string();

        Ok(CreateRequest {
            version: PROTOCOL_VERSION,
            net: self.state.net,
            sender_pub_key: self.state.sender_pubkey.clone(),
            sender_output: self.state.sender_output.clone(),
        })
    }

    /// Evaluates the receiver's terms
    ///
    /// The terms are accepted only if they fall inside the configured
    /// policy window and the advertised funding address matches the
    /// locally recomputed P2SH address.
    pub fn got_create_response(&mut self, resp: &CreateResponse) -> Result<()> {
        self.require_status(Status::Created)?;
        if self.state.sender_output.is_empty() {
            return Err(ChannelError::InvalidState("sender output not set".into()).into());
        }

        if resp.version != PROTOCOL_VERSION {
            return Err(ChannelError::UnsupportedVersion.into());
        }
        if resp.net != self.config.net {
            return Err(ChannelError::UnsupportedNet.into());
        }
        if resp.timeout < self.config.min_timeout || resp.timeout > self.config.max_timeout {
            return Err(ChannelError::TimeoutOutOfRange.into());
        }
        if resp.fee < TYPICAL_CLOSE_TX_SIZE * self.config.min_fee_rate
            || resp.fee > TYPICAL_CLOSE_TX_SIZE * self.config.max_fee_rate
        {
            return Err(ChannelError::FeeOutOfRange.into());
        }
        check_supported_address(self.state.net, &resp.receiver_output)?;
        parse_pubkey(&resp.receiver_pub_key)?;

        let mut new_state = self.state.clone();
        new_state.version = resp.version;
        new_state.timeout = resp.timeout;
        new_state.fee = resp.fee;
        new_state.receiver_pubkey = resp.receiver_pub_key.clone();
        new_state.receiver_output = resp.receiver_output.clone();

        let (_, funding_address) = new_state.funding_script()?;
        if funding_address.to_string() != resp.funding_address {
            return Err(ChannelError::FundingAddressMismatch.into());
        }

        self.state = new_state;
        self.receiver_data = resp.receiver_data.clone();
        Ok(())
    }

    /// Binds the funding outpoint and signs the zero-balance closure
    ///
    /// Called once the funding transaction has been broadcast; the
    /// signature lets the receiver settle at balance zero from the
    /// moment it accepts the channel.
    pub fn get_open_request(&mut self, txid: &str, vout: u32, amount: i64) -> Result<OpenRequest> {
        self.require_status(Status::Created)?;

        if txid.parse::<bitcoin::Txid>().is_err() {
            return Err(ChannelError::InvalidTxId.into());
        }
        if amount <= 0 {
            return Err(ChannelError::InvalidAmount.into());
        }

        self.state.funding_txid = txid.to_lowercase();
        self.state.funding_vout = vout;
        self.state.capacity = amount;

        let sig = self.state.sign_closure(0, self.state.payments_hash, &self.privkey)?;

        Ok(OpenRequest {
            version: self.state.version,
            net: self.state.net,
            timeout: self.state.timeout,
            fee: self.state.fee,
            sender_pub_key: self.state.sender_pubkey.clone(),
            sender_output: self.state.sender_output.clone(),
            receiver_pub_key: self.state.receiver_pubkey.clone(),
            receiver_output: self.state.receiver_output.clone(),
            txid: self.state.funding_txid.clone(),
            vout,
            sender_sig: sig,
            receiver_data: self.receiver_data.clone(),
        })
    }

    /// Marks the channel Open after the receiver accepted it
    pub fn got_open_response(&mut self, _resp: &OpenResponse) -> Result<()> {
        self.require_status(Status::Created)?;
        if self.state.funding_txid.is_empty() {
            return Err(ChannelError::InvalidState("funding txid not set".into()).into());
        }
        self.state.status = Status::Open;
        Ok(())
    }

    /// Signs a payment without advancing local state
    ///
    /// The returned request commits to the post-payment balance and
    /// payments hash; the local state only advances once the receiver
    /// acknowledges via [`Sender::got_send_response`].
    pub fn get_send_request(&mut self, amount: i64, payment: &[u8]) -> Result<SendRequest> {
        self.require_status(Status::Open)?;

        let new_balance = self.state.validate_amount(amount)?;
        if !validate_payment_size(payment.len()) {
            return Err(ChannelError::InvalidPayment.into());
        }

        let new_hash = chain_hash(self.state.payments_hash, payment);
        let sig = self.state.sign_closure(new_balance, new_hash, &self.privkey)?;

        Ok(SendRequest {
            txid: self.state.funding_txid.clone(),
            vout: self.state.funding_vout,
            payment: payment.to_vec(),
            sender_sig: sig,
        })
    }

    /// Advances balance, count and payments hash after acceptance
    pub fn got_send_response(
        &mut self,
        amount: i64,
        payment: &[u8],
        _resp: &SendResponse,
    ) -> Result<()> {
        self.require_status(Status::Open)?;

        self.state.payments_hash = chain_hash(self.state.payments_hash, payment);
        self.state.count += 1;
        self.state.balance += amount;
        Ok(())
    }

    /// Initiates the cooperative close
    pub fn get_close_request(&mut self) -> Result<CloseRequest> {
        if self.state.status != Status::Open && self.state.status != Status::Closing {
            return Err(ChannelError::WrongStatus { expected: Status::Open }.into());
        }
        self.state.status = Status::Closing;

        Ok(CloseRequest {
            txid: self.state.funding_txid.clone(),
            vout: self.state.funding_vout,
        })
    }

    /// Validates the co-signed close transaction from the receiver
    pub fn got_close_response(&mut self, resp: &CloseResponse) -> Result<()> {
        if self.state.status != Status::Open && self.state.status != Status::Closing {
            return Err(ChannelError::WrongStatus { expected: Status::Open }.into());
        }

        self.state.validate_tx(&resp.close_tx)?;

        if self.state.status == Status::Open {
            self.state.status = Status::Closing;
        }
        Ok(())
    }

    /// Builds the signed CSV refund transaction
    ///
    /// Available in any state once the funding outpoint is recorded; it
    /// only becomes broadcastable after the timeout elapses on chain.
    pub fn refund(&self) -> Result<Vec<u8>> {
        self.state.refund_tx_signed(&self.privkey)
    }

    /// Marks the channel Closed once the close transaction confirmed
    pub fn close_mined(&mut self) -> Result<()> {
        self.require_status(Status::Closing)?;
        self.state.status = Status::Closed;
        Ok(())
    }

    fn require_status(&self, expected: Status) -> Result<()> {
        if self.state.status != expected {
            return Err(ChannelError::WrongStatus { expected }.into());
        }
        Ok(())
    }
}
