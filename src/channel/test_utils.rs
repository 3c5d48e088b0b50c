//! Shared test utilities for channel module tests
//!
//! This module provides common fixtures and helper functions used across
//! the channel module tests: deterministic keys, a funded shared state,
//! and the full create/open handshake.

use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Amount, PrivateKey, PublicKey, TxOut};

use crate::channel::receiver::{Receiver, ReceiverConfig};
use crate::channel::sender::{Sender, SenderConfig};
use crate::channel::state::{Net, SharedState, Status};

/// Sender payout address (testnet P2PKH)
pub const ADDR_SENDER: &str = "mrreYyaosje7fxCLi3pzknasHiSfziX9GY";

/// Receiver payout address (testnet P2PKH)
pub const ADDR_RECEIVER: &str = "mnRYb3Zpn6CUR9TNDL6GGGNY9jjU1XURD5";

/// Funding outpoint used by channel fixtures
pub const FUNDING_TXID: &str = "5b2c6c349612986a3e012bbc79e5e04d5ba965f0e8f968cf28c91681acbbeb34";

/// Funding output index used by channel fixtures
pub const FUNDING_VOUT: u32 = 1;

/// Default channel capacity for tests, in satoshis
pub const TEST_CAPACITY: i64 = 1_000_000;

/// Opaque payment blob accepted by the channel layer
pub const TEST_PAYMENT: &[u8] = &[1, 2, 3];

const SENDER_WIF: &str = "cRTgZtoTP8ueH4w7nob5reYTKpFLHvDV9UfUfa67f3SMCaZkGB6L";
const RECEIVER_WIF: &str = "cUkJhR6V9Gjrw1enLJ7AHk37Bhtmfk3AyWkRLVhvHGYXSPj3mDLq";

/// A test key pair
pub struct TestKey {
    /// Private key decoded from the fixture WIF
    pub privkey: PrivateKey,
    /// Matching compressed public key
    pub public_key: PublicKey,
}

fn key_from_wif(wif: &str) -> TestKey {
    let secp = Secp256k1::new();
    let privkey = PrivateKey::from_wif(wif).expect("fixture WIF should decode");
    let public_key = privkey.public_key(&secp);
    TestKey { privkey, public_key }
}

/// Deterministic (sender, receiver) key pair for tests
pub fn test_keys() -> (TestKey, TestKey) {
    (key_from_wif(SENDER_WIF), key_from_wif(RECEIVER_WIF))
}

/// A funded Open state with default terms, for script and tx tests
pub fn test_state() -> SharedState {
    let (sender, receiver) = test_keys();
    let config = ReceiverConfig::default();

    SharedState {
        version: 1,
        net: Net::Testnet3,
        timeout: config.timeout,
        fee: config.fee(),
        status: Status::Open,
        sender_pubkey: sender.public_key.inner.serialize().to_vec(),
        receiver_pubkey: receiver.public_key.inner.serialize().to_vec(),
        sender_output: ADDR_SENDER.to_string(),
        receiver_output: ADDR_RECEIVER.to_string(),
        funding_txid: FUNDING_TXID.to_string(),
        funding_vout: FUNDING_VOUT,
        capacity: TEST_CAPACITY,
        block_height: 0,
        balance: 0,
        count: 0,
        payments_hash: [0u8; 32],
        sender_sig: vec![],
    }
}

/// Runs the full create/open handshake at the given capacity
///
/// Panics unless both sides end up Open.
pub fn open_channel(capacity: i64) -> (Sender, Receiver) {
    open_channel_with(capacity, Status::Open)
}

/// Runs the create/open handshake, asserting the receiver's post-open
/// status (sub-policy channels land in Closing)
pub fn open_channel_with(capacity: i64, expected_receiver_status: Status) -> (Sender, Receiver) {
    let (sender_key, receiver_key) = test_keys();

    let mut sender =
        Sender::new(SenderConfig::default(), sender_key.privkey).expect("sender setup");
    let create_req = sender.get_create_request(ADDR_SENDER).expect("create request");

    let mut receiver = Receiver::new(ReceiverConfig::default(), ADDR_RECEIVER, receiver_key.privkey)
        .expect("receiver setup");
    let create_resp = receiver.create(&create_req).expect("create");
    sender.got_create_response(&create_resp).expect("create response");

    let open_req =
        sender.get_open_request(FUNDING_TXID, FUNDING_VOUT, capacity).expect("open request");

    let (_, funding_address) = sender.state().funding_script().expect("funding script");
    let txout = TxOut {
        value: Amount::from_sat(capacity as u64),
        script_pubkey: funding_address.script_pubkey(),
    };

    let open_resp = receiver.open(&txout, &open_req).expect("open");
    sender.got_open_response(&open_resp).expect("open response");

    assert_eq!(sender.state().status, Status::Open);
    assert_eq!(receiver.state().status, expected_receiver_status);

    (sender, receiver)
}

/// Drives the cooperative close on both sides and returns the close tx
pub fn close_channel(mut sender: Sender, receiver: &mut Receiver) -> Vec<u8> {
    let close_req = sender.get_close_request().expect("close request");
    let close_resp = receiver.close(&close_req).expect("close");
    sender.got_close_response(&close_resp).expect("close response");

    assert_eq!(sender.state().status, Status::Closing);
    assert_eq!(receiver.state().status, Status::Closing);

    close_resp.close_tx
}
