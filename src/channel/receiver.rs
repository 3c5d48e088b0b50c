//! Receiver role
//!
//! The receiver mirrors the sender's state machine but is the transition
//! authority: it dictates the channel terms, verifies every sender
//! signature by reconstructing the closure transaction and running the
//! script interpreter on it, and co-signs the final settlement. Sub-policy
//! channels (timeout, fee or capacity below the configured floor) are
//! accepted but recorded as Closing immediately, so no payment is ever
//! processed on them.

use bitcoin::{PrivateKey, TxOut};

use crate::channel::sender::derive_pubkey;
use crate::channel::state::{
    chain_hash, check_supported_address, parse_pubkey, Net, SharedState, Status,
};
use crate::channel::tx::validate_sender_sig;
use crate::errors::{ChannelError, Result};
use crate::types::{
    validate_payment_size, DUST_THRESHOLD, PROTOCOL_VERSION, TYPICAL_CLOSE_TX_SIZE,
};
use crate::wire::{
    CloseRequest, CloseResponse, CreateRequest, CreateResponse, OpenRequest, OpenResponse,
    SendRequest, SendResponse, StatusResponse,
};

/// Terms the receiver dictates for new channels
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Network the receiver accepts channels on
    pub net: Net,
    /// Refund timeout demanded of new channels, in blocks
    pub timeout: i64,
    /// Close fee rate demanded of new channels, in sat/byte
    pub fee_rate: i64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self { net: Net::Testnet3, timeout: 1008, fee_rate: 300 }
    }
}

impl ReceiverConfig {
    /// Absolute close fee implied by the configured fee rate
    pub fn fee(&self) -> i64 {
        self.fee_rate * TYPICAL_CLOSE_TX_SIZE
    }
}

/// The receiver's half of a payment channel
#[derive(Debug, Clone)]
pub struct Receiver {
    config: ReceiverConfig,
    privkey: PrivateKey,
    state: SharedState,
}

impl Receiver {
    /// Creates a fresh receiver in the Created state
    ///
    /// # Arguments
    /// * `config` - Policy the receiver enforces
    /// * `receiver_output` - Payout address for the receiver's balance
    /// * `privkey` - Receiver's channel key
    pub fn new(config: ReceiverConfig, receiver_output: &str, privkey: PrivateKey) -> Result<Self> {
        check_supported_address(config.net, receiver_output)?;

        let state = SharedState {
            version: PROTOCOL_VERSION,
            net: config.net,
            timeout: 0,
            fee: 0,
            status: Status::Created,
            sender_pubkey: vec![],
            receiver_pubkey: derive_pubkey(&privkey),
            sender_output: String::new(),
            receiver_output: receiver_output.to_string(),
            funding_txid: String::new(),
            funding_vout: 0,
            capacity: 0,
            block_height: 0,
            balance: 0,
            count: 0,
            payments_hash: [0u8; 32],
            sender_sig: vec![],
        };

        Ok(Self { config, privkey, state })
    }

    /// Re-hydrates a receiver from persisted state
    pub fn load(config: ReceiverConfig, state: SharedState, privkey: PrivateKey) -> Result<Self> {
        if config.net != state.net {
            return Err(
                ChannelError::InvalidState("state net differs from config net".into()).into()
            );
        }
        if derive_pubkey(&privkey) != state.receiver_pubkey {
            return Err(
                ChannelError::InvalidState("state receiver pubkey differs from privkey".into())
                    .into(),
            );
        }
        state.sanity_check()?;

        Ok(Self { config, privkey, state })
    }

    /// The receiver's view of the shared state
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Mutable access for the service layer's bookkeeping (funding
    /// height, forced status) between role operations
    pub(crate) fn state_mut(&mut self) -> &mut SharedState {
        &mut self.state
    }

    /// Answers a channel proposal with this receiver's terms
    ///
    /// The response is a proposal, not a commitment: nothing is recorded
    /// until the sender comes back with a funded `open`.
    pub fn create(&self, req: &CreateRequest) -> Result<CreateResponse> {
        self.require_status(Status::Created)?;

        if req.version != PROTOCOL_VERSION {
            return Err(ChannelError::UnsupportedVersion.into());
        }
        if req.net != self.config.net {
            return Err(ChannelError::UnsupportedNet.into());
        }
        check_supported_address(self.config.net, &req.sender_output)?;
        parse_pubkey(&req.sender_pub_key)?;

        let mut proposal = self.state.clone();
        proposal.version = PROTOCOL_VERSION;
        proposal.timeout = self.config.timeout;
        proposal.fee = self.config.fee();
        proposal.sender_pubkey = req.sender_pub_key.clone();
        proposal.sender_output = req.sender_output.clone();

        let (_, funding_address) = proposal.funding_script()?;

        Ok(CreateResponse {
            version: proposal.version,
            net: proposal.net,
            timeout: proposal.timeout,
            fee: proposal.fee,
            receiver_pub_key: proposal.receiver_pubkey.clone(),
            receiver_output: proposal.receiver_output.clone(),
            funding_address: funding_address.to_string(),
            receiver_data: vec![],
        })
    }

    /// Accepts a funded channel
    ///
    /// Rebuilds the shared state from the request, checks the funding
    /// UTXO's script against the locally derived P2SH, and verifies the
    /// sender's zero-balance signature under the script interpreter.
    /// Channels whose terms fall below policy (timeout, fee, version, or
    /// capacity under `fee + dust`) are recorded as Closing on the spot
    /// rather than refused, so the funding can still be settled.
    pub fn open(&mut self, txout: &TxOut, req: &OpenRequest) -> Result<OpenResponse> {
        self.require_status(Status::Created)?;

        let capacity = i64::try_from(txout.value.to_sat())
            .map_err(|_| ChannelError::InvalidAmount)?;
        if capacity <= 0 {
            return Err(ChannelError::InvalidAmount.into());
        }
        if req.txid.parse::<bitcoin::Txid>().is_err() {
            return Err(ChannelError::InvalidTxId.into());
        }
        if req.sender_sig.is_empty() {
            return Err(ChannelError::InvalidSignature.into());
        }
        if req.net != self.config.net {
            return Err(ChannelError::UnsupportedNet.into());
        }
        if req.receiver_pub_key != self.state.receiver_pubkey {
            return Err(ChannelError::InvalidPubKey.into());
        }
        if req.receiver_output != self.state.receiver_output {
            return Err(ChannelError::InvalidAddress.into());
        }
        check_supported_address(self.config.net, &req.sender_output)?;
        parse_pubkey(&req.sender_pub_key)?;

        let mut state = SharedState {
            version: req.version,
            net: req.net,
            timeout: req.timeout,
            fee: req.fee,
            status: Status::Open,
            sender_pubkey: req.sender_pub_key.clone(),
            receiver_pubkey: req.receiver_pub_key.clone(),
            sender_output: req.sender_output.clone(),
            receiver_output: req.receiver_output.clone(),
            funding_txid: req.txid.to_lowercase(),
            funding_vout: req.vout,
            capacity,
            block_height: 0,
            balance: 0,
            count: 0,
            payments_hash: [0u8; 32],
            sender_sig: req.sender_sig.clone(),
        };

        // The funding output must pay the P2SH address derived from the
        // negotiated terms, or the settlement paths are worthless.
        let (script, _) = state.funding_script()?;
        let expected =
            bitcoin::ScriptBuf::new_p2sh(&script.script_hash());
        if txout.script_pubkey != expected {
            return Err(ChannelError::FundingAddressMismatch.into());
        }

        validate_sender_sig(&state, &self.privkey)?;

        let funded_enough = state
            .fee
            .checked_add(DUST_THRESHOLD)
            .map_or(false, |min_capacity| state.capacity >= min_capacity);
        let acceptable = state.version == PROTOCOL_VERSION
            && state.timeout >= self.config.timeout
            && state.fee >= self.config.fee()
            && funded_enough;

        if !acceptable {
            state.status = Status::Closing;
        }

        self.state = state;

        Ok(OpenResponse::default())
    }

    /// Dry-runs a payment against the current state
    ///
    /// Side-effect free; returns `false` rather than an error for
    /// payments that merely fail the amount or size rules.
    pub fn validate(&self, amount: i64, payment: &[u8]) -> Result<bool> {
        self.require_status(Status::Open)?;

        if self.state.validate_amount(amount).is_err() {
            return Ok(false);
        }
        if !validate_payment_size(payment.len()) {
            return Ok(false);
        }

        Ok(true)
    }

    /// Accepts a payment
    ///
    /// Validates the amount and payment size, reconstructs the closure
    /// transaction for the advanced `(balance, payments_hash)`, and
    /// verifies the sender's signature by executing the script
    /// interpreter on it. Only then is the state advanced.
    pub fn send(&mut self, amount: i64, req: &SendRequest) -> Result<SendResponse> {
        self.require_status(Status::Open)?;

        let new_balance = self.state.validate_amount(amount)?;
        if !validate_payment_size(req.payment.len()) {
            return Err(ChannelError::InvalidPayment.into());
        }

        let new_hash = chain_hash(self.state.payments_hash, &req.payment);

        let mut candidate = self.state.clone();
        candidate.balance = new_balance;
        candidate.payments_hash = new_hash;
        candidate.sender_sig = req.sender_sig.clone();
        validate_sender_sig(&candidate, &self.privkey)?;

        candidate.count += 1;
        self.state = candidate;

        Ok(SendResponse::default())
    }

    /// Co-signs the current-balance closure and moves to Closing
    ///
    /// Idempotent while Closing: a repeated close re-serializes the same
    /// settlement transaction.
    pub fn close(&mut self, _req: &CloseRequest) -> Result<CloseResponse> {
        if self.state.status != Status::Open && self.state.status != Status::Closing {
            return Err(ChannelError::WrongStatus { expected: Status::Open }.into());
        }

        let raw = self.state.closure_tx_signed(
            self.state.balance,
            self.state.payments_hash,
            &self.state.sender_sig,
            &self.privkey,
        )?;

        self.state.status = Status::Closing;

        Ok(CloseResponse { close_tx: raw })
    }

    /// The receiver's view of the channel, in wire form
    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            status: self.state.status.code(),
            balance: self.state.balance,
            payments_hash: self.state.payments_hash.to_vec(),
        }
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

#[cfg(test)]
mod tests {
    use bitcoin::consensus::encode::deserialize;
    use bitcoin::Transaction;

    use super::*;
    use crate::channel::test_utils::{
        close_channel, open_channel, open_channel_with, test_keys, TEST_CAPACITY, TEST_PAYMENT,
    };
    use crate::errors::Error;

    #[test]
    fn test_immediate_close() {
        let (sender, mut receiver) = open_channel(TEST_CAPACITY);
        let close_tx = close_channel(sender, &mut receiver);

        // Zero payments: single output returning capacity minus fee to
        // the sender, receiver output dust-omitted
        let tx: Transaction = deserialize(&close_tx).expect("decode");
        assert_eq!(tx.output.len(), 1);
        assert_eq!(
            tx.output[0].value.to_sat() as i64,
            TEST_CAPACITY - receiver.state().fee
        );
    }

    #[test]
    fn test_send() {
        let (mut sender, mut receiver) = open_channel(TEST_CAPACITY);
        let amount = 1000;

        assert!(receiver.validate(amount, TEST_PAYMENT).expect("validate"));

        let req = sender.get_send_request(amount, TEST_PAYMENT).expect("request");
        let resp = receiver.send(amount, &req).expect("send");
        sender.got_send_response(amount, TEST_PAYMENT, &resp).expect("response");

        assert_eq!(receiver.state().balance, amount);
        assert_eq!(sender.state().balance, amount);

        let req = sender.get_send_request(2 * amount, TEST_PAYMENT).expect("request");
        let resp = receiver.send(2 * amount, &req).expect("send");
        sender.got_send_response(2 * amount, TEST_PAYMENT, &resp).expect("response");

        assert_eq!(receiver.state().balance, 3 * amount);
        assert_eq!(sender.state().balance, 3 * amount);
        assert_eq!(receiver.state().count, 2);
        assert_eq!(sender.state().count, 2);
        assert_eq!(receiver.state().payments_hash, sender.state().payments_hash);

        let close_tx = close_channel(sender, &mut receiver);
        let tx: Transaction = deserialize(&close_tx).expect("decode");
        let payout: Vec<_> =
            tx.output.iter().filter(|o| !o.script_pubkey.is_op_return()).collect();
        assert_eq!(payout.len(), 2);
        assert_eq!(payout[0].value.to_sat(), 3000);
        assert_eq!(
            payout[1].value.to_sat() as i64,
            TEST_CAPACITY - 3000 - receiver.state().fee
        );
    }

    #[test]
    fn test_invalid_send_sig() {
        let (mut sender, mut receiver) = open_channel(TEST_CAPACITY);
        let amount = 1000;

        // Missing signature
        let req = SendRequest {
            txid: receiver.state().funding_txid.clone(),
            vout: receiver.state().funding_vout,
            payment: TEST_PAYMENT.to_vec(),
            sender_sig: vec![],
        };
        assert!(receiver.send(amount, &req).is_err());

        // Signature over amount A presented for amount 2A
        let req = sender.get_send_request(amount, TEST_PAYMENT).expect("request");
        assert!(matches!(
            receiver.send(2 * amount, &req),
            Err(Error::Channel(ChannelError::InvalidSignature))
        ));

        // Nothing advanced on either side
        assert_eq!(receiver.state().balance, 0);
        assert_eq!(receiver.state().count, 0);
    }

    #[test]
    fn test_send_dust() {
        let (mut sender, mut receiver) = open_channel(TEST_CAPACITY);
        let amount = 100;

        assert!(matches!(
            sender.get_send_request(amount, TEST_PAYMENT),
            Err(Error::Channel(ChannelError::AmountTooSmall))
        ));

        // Even a hand-signed dust balance must be rejected by the
        // receiver's amount validation
        let new_hash = chain_hash(sender.state().payments_hash, TEST_PAYMENT);
        let sig = sender
            .state()
            .sign_closure(amount, new_hash, &test_keys().0.privkey)
            .expect("sign");
        let req = SendRequest {
            txid: receiver.state().funding_txid.clone(),
            vout: receiver.state().funding_vout,
            payment: TEST_PAYMENT.to_vec(),
            sender_sig: sig,
        };
        assert!(matches!(
            receiver.send(amount, &req),
            Err(Error::Channel(ChannelError::AmountTooSmall))
        ));
    }

    #[test]
    fn test_low_capacity_close() {
        // A channel funded below fee + dust is accepted but immediately
        // recorded as Closing; it can still be settled cleanly.
        let (_, mut receiver) = open_channel_with(DUST_THRESHOLD, Status::Closing);

        let resp = receiver
            .close(&CloseRequest {
                txid: receiver.state().funding_txid.clone(),
                vout: receiver.state().funding_vout,
            })
            .expect("close");

        // Both payouts fall below dust, leaving only the settlement spend
        let tx: Transaction = deserialize(&resp.close_tx).expect("decode");
        assert!(tx.output.is_empty());
        assert_eq!(receiver.state().status, Status::Closing);
    }

    #[test]
    fn test_close_idempotent() {
        let (sender, mut receiver) = open_channel(TEST_CAPACITY);
        let req = CloseRequest {
            txid: receiver.state().funding_txid.clone(),
            vout: receiver.state().funding_vout,
        };
        drop(sender);

        let first = receiver.close(&req).expect("close");
        assert_eq!(receiver.state().status, Status::Closing);

        let second = receiver.close(&req).expect("repeat close");
        assert_eq!(first.close_tx, second.close_tx);
        assert_eq!(receiver.state().status, Status::Closing);
    }

    #[test]
    fn test_close_mined() {
        let (mut sender, mut receiver) = open_channel(TEST_CAPACITY);

        assert!(receiver.close_mined().is_err());

        let req = sender.get_close_request().expect("close request");
        let resp = receiver.close(&req).expect("close");
        sender.got_close_response(&resp).expect("close response");

        receiver.close_mined().expect("mined");
        sender.close_mined().expect("mined");
        assert_eq!(receiver.state().status, Status::Closed);
        assert_eq!(sender.state().status, Status::Closed);
    }
}
