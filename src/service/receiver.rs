//! Receiver service
//!
//! Aggregates many payment channels on behalf of a hosted domain. The
//! service wires the channel-level receiver role to its collaborators:
//! the chain backend for funding lookups and broadcast, the registry
//! store for durable optimistically-concurrent state, the HD key chain
//! for per-channel keys, and the token issuer for call authentication.
//!
//! Worker tasks may call into the service concurrently; per-channel
//! linearizability comes from the store's compare-and-swap, so no lock
//! is held across chain or storage calls.

use bitcoin::{Address, Amount, Txid, TxOut};
use tracing::info;

use crate::chain::ChainBackend;
use crate::channel::receiver::{Receiver, ReceiverConfig};
use crate::channel::state::Status;
use crate::errors::{ChannelError, Result, ServiceError};
use crate::service::auth::TokenIssuer;
use crate::service::directory::Directory;
use crate::service::keys::KeyChain;
use crate::service::policy::{policy_for, Policy};
use crate::store::{Record, Store};
use crate::wire::{
    channel_id, CloseRequest, CloseResponse, CreateRequest, CreateResponse, OpenRequest,
    OpenResponse, Payment, SendRequest, SendResponse, StatusRequest, StatusResponse,
    ValidateRequest, ValidateResponse,
};

/// Configuration of the receiver service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Channel terms dictated to senders
    pub channel: ReceiverConfig,
    /// Fixed payout address; when unset, a fresh P2PKH payout is derived
    /// from each channel's child key
    pub destination: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { channel: ReceiverConfig::default(), destination: None }
    }
}

/// The hosted receiving service
pub struct ReceiverService<C, S> {
    config: ServiceConfig,
    keys: KeyChain,
    chain: C,
    store: S,
    directory: Directory,
    tokens: TokenIssuer,
}

impl<C: ChainBackend, S: Store> ReceiverService<C, S> {
    /// Wires up a service from its collaborators
    pub fn new(
        config: ServiceConfig,
        keys: KeyChain,
        chain: C,
        store: S,
        directory: Directory,
        auth_secret: impl Into<Vec<u8>>,
    ) -> Self {
        Self { config, keys, chain, store, directory, tokens: TokenIssuer::new(auth_secret) }
    }

    pub(crate) fn chain(&self) -> &C {
        &self.chain
    }

    pub(crate) fn policy(&self) -> Policy {
        policy_for(self.config.channel.net)
    }

    /// Checks a bearer token against a channel
    pub fn authorize(&self, txid: &str, vout: u32, token: &str) -> Result<()> {
        if self.tokens.validate(&channel_id(txid, vout), token) {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized.into())
        }
    }

    fn payout_address(&self, privkey: &bitcoin::PrivateKey) -> Result<String> {
        if let Some(destination) = &self.config.destination {
            return Ok(destination.clone());
        }
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let pubkey = privkey.public_key(&secp);
        Ok(Address::p2pkh(&pubkey, self.config.channel.net.network()).to_string())
    }

    fn channel_receiver(&self, key_path: u32) -> Result<Receiver> {
        let privkey = self.keys.child_key(key_path)?;
        let payout = self.payout_address(&privkey)?;
        Receiver::new(self.config.channel.clone(), &payout, privkey)
    }

    async fn load(&self, id: &str) -> Result<(Receiver, Record)> {
        let record = self.store.get(id).await?;
        let privkey = self.keys.child_key(record.key_path)?;
        let receiver =
            Receiver::load(self.config.channel.clone(), record.state.clone(), privkey)?;
        Ok((receiver, record))
    }

    /// Answers a channel proposal
    ///
    /// Reserves a fresh key path, derives the channel key and payout,
    /// and returns the terms; nothing is persisted until `open`.
    pub async fn create(&self, req: CreateRequest) -> Result<CreateResponse> {
        let key_path = self.store.reserve_key_path().await?;
        let receiver = self.channel_receiver(key_path)?;

        let mut resp = receiver.create(&req)?;
        resp.receiver_data = key_path.to_string().into_bytes();

        Ok(resp)
    }

    /// Opens a funded channel
    ///
    /// Looks up the funding UTXO on chain, enforces the confirmation
    /// policy, runs the channel-level open (funding script and signature
    /// checks), persists the record, and issues the channel's auth
    /// token. Funding that has already aged past the watcher's soft
    /// timeout is accepted directly into Closing.
    pub async fn open(&self, req: OpenRequest) -> Result<OpenResponse> {
        let key_path: u32 = std::str::from_utf8(&req.receiver_data)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ChannelError::InvalidState("invalid receiver data".into()))?;

        let txid: Txid = req.txid.parse().map_err(|_| ChannelError::InvalidTxId)?;

        let utxo = self
            .chain
            .get_tx_out(&txid, req.vout)
            .await?
            .ok_or(ServiceError::UtxoNotFound)?;
        if utxo.coinbase {
            return Err(ServiceError::CoinbaseForbidden.into());
        }

        let policy = self.policy();
        if utxo.confirmations < policy.funding_min_conf {
            return Err(ServiceError::TooFewConfirmations {
                have: utxo.confirmations,
                need: policy.funding_min_conf,
            }
            .into());
        }

        let header = self.chain.get_block_header(&utxo.best_block).await?;
        let funding_height = header.height.saturating_sub(utxo.confirmations.saturating_sub(1));

        let mut receiver = self.channel_receiver(key_path)?;

        let value = u64::try_from(utxo.value).map_err(|_| ChannelError::InvalidAmount)?;
        let txout = TxOut { value: Amount::from_sat(value), script_pubkey: utxo.script_pubkey };

        let mut resp = receiver.open(&txout, &req)?;

        receiver.state_mut().block_height = funding_height;
        if utxo.confirmations > policy.soft_timeout {
            // Too little of the timeout window remains to be worth
            // accepting payments on.
            receiver.state_mut().status = Status::Closing;
        }

        let id = channel_id(&req.txid, req.vout);
        let record =
            Record { id: id.clone(), key_path, state: receiver.state().clone() };
        self.store.create(record).await?;

        info!(channel = %id, capacity = receiver.state().capacity, "channel opened");

        resp.auth_token = self.tokens.issue(&id);
        Ok(resp)
    }

    /// Parses a payment blob and checks it against channel and directory
    fn parse_payment(&self, receiver: &Receiver, payment: &[u8]) -> Result<(bool, Payment)> {
        let parsed: Payment =
            serde_json::from_slice(payment).map_err(|_| ChannelError::InvalidPayment)?;

        let valid = receiver.validate(parsed.amount, payment)?
            && self.directory.has_target(&parsed.target);

        Ok((valid, parsed))
    }

    /// Dry-runs a payment without touching state
    pub async fn validate(&self, req: ValidateRequest) -> Result<ValidateResponse> {
        let id = channel_id(&req.txid, req.vout);
        let (receiver, _) = self.load(&id).await?;

        let (valid, _) = self.parse_payment(&receiver, &req.payment)?;
        Ok(ValidateResponse { valid })
    }

    /// Accepts a payment
    ///
    /// Verification happens at the channel level; persistence goes
    /// through the registry's compare-and-swap against the state the
    /// operation started from. A failed swap is returned to the caller
    /// as-is, never retried here.
    pub async fn send(&self, req: SendRequest) -> Result<SendResponse> {
        let id = channel_id(&req.txid, req.vout);
        let (mut receiver, record) = self.load(&id).await?;

        let (valid, payment) = self.parse_payment(&receiver, &req.payment)?;
        if !valid {
            return Err(ChannelError::InvalidPayment.into());
        }

        let resp = receiver.send(payment.amount, &req)?;

        self.store
            .update(&id, &record.state, receiver.state(), Some(&req.payment))
            .await?;

        info!(channel = %id, amount = payment.amount, balance = receiver.state().balance, "payment accepted");

        Ok(resp)
    }

    /// Settles a channel cooperatively
    ///
    /// Co-signs the current-balance closure, persists the Closing state,
    /// and broadcasts the transaction. Repeating the call while Closing
    /// re-broadcasts the same settlement.
    pub async fn close(&self, req: CloseRequest) -> Result<CloseResponse> {
        let id = channel_id(&req.txid, req.vout);
        let (mut receiver, record) = self.load(&id).await?;

        let resp = receiver.close(&req)?;

        if record.state.status != receiver.state().status {
            self.store.update(&id, &record.state, receiver.state(), None).await?;
        }

        let txid = self.chain.send_raw_transaction(&resp.close_tx).await?;
        info!(channel = %id, close_txid = %txid, "close transaction broadcast");

        Ok(resp)
    }

    /// Reports the receiver's view of a channel
    pub async fn status(&self, req: StatusRequest) -> Result<StatusResponse> {
        let id = channel_id(&req.txid, req.vout);
        let (receiver, _) = self.load(&id).await?;
        Ok(receiver.status())
    }

    /// Marks a channel Closed once its close transaction confirmed
    pub async fn close_mined(&self, txid: &str, vout: u32) -> Result<()> {
        let id = channel_id(txid, vout);
        let (mut receiver, record) = self.load(&id).await?;

        receiver.close_mined()?;
        self.store.update(&id, &record.state, receiver.state(), None).await?;

        info!(channel = %id, "close transaction confirmed");
        Ok(())
    }

    /// Fetches one hosted channel
    pub async fn get(&self, txid: &str, vout: u32) -> Result<Record> {
        self.store.get(&channel_id(txid, vout)).await
    }

    /// Lists all hosted channels
    pub async fn list(&self) -> Result<Vec<Record>> {
        self.store.list().await
    }

    /// Lists the payments accepted on a channel
    pub async fn list_payments(&self, txid: &str, vout: u32) -> Result<Vec<Vec<u8>>> {
        self.store.list_payments(&channel_id(txid, vout)).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::address;
    use crate::chain::mock::MockChain;
    use crate::chain::TxOutInfo;
    use crate::channel::sender::{Sender, SenderConfig};
    use crate::channel::test_utils::{
        test_keys, ADDR_RECEIVER, ADDR_SENDER, FUNDING_TXID, FUNDING_VOUT, TEST_CAPACITY,
    };
    use crate::channel::Net;
    use crate::errors::Error;
    use crate::store::MemoryStore;

    pub(crate) const DOMAIN: &str = "example.com";
    const TIP_HEIGHT: u64 = 1000;

    pub(crate) fn test_service() -> Arc<ReceiverService<MockChain, MemoryStore>> {
        let keys = KeyChain::from_seed(Net::Testnet3, &[7u8; 32]).expect("seed");
        Arc::new(ReceiverService::new(
            ServiceConfig::default(),
            keys,
            MockChain::new(TIP_HEIGHT),
            MemoryStore::new(),
            Directory::new(DOMAIN),
            *b"server secret",
        ))
    }

    pub(crate) fn payment_blob(amount: i64) -> Vec<u8> {
        let target = address::encode(ADDR_RECEIVER, DOMAIN).expect("target");
        serde_json::to_vec(&Payment { amount, target }).expect("payment json")
    }

    fn add_funding(
        service: &ReceiverService<MockChain, MemoryStore>,
        sender: &Sender,
        confirmations: u64,
        coinbase: bool,
    ) {
        let (_, funding_address) = sender.state().funding_script().expect("funding script");
        let txid: Txid = FUNDING_TXID.parse().expect("txid");
        service.chain().add_utxo(
            txid,
            FUNDING_VOUT,
            TxOutInfo {
                value: TEST_CAPACITY,
                script_pubkey: funding_address.script_pubkey(),
                confirmations,
                coinbase,
                best_block: "00".repeat(32),
            },
        );
    }

    async fn negotiate(
        service: &ReceiverService<MockChain, MemoryStore>,
    ) -> (Sender, OpenRequest) {
        let (sender_key, _) = test_keys();
        let mut sender =
            Sender::new(SenderConfig::default(), sender_key.privkey).expect("sender");

        let create_req = sender.get_create_request(ADDR_SENDER).expect("create request");
        let create_resp = service.create(create_req).await.expect("create");
        sender.got_create_response(&create_resp).expect("create response");

        let open_req = sender
            .get_open_request(FUNDING_TXID, FUNDING_VOUT, TEST_CAPACITY)
            .expect("open request");
        (sender, open_req)
    }

    pub(crate) async fn open_channel(
        service: &ReceiverService<MockChain, MemoryStore>,
    ) -> (Sender, String) {
        let (mut sender, open_req) = negotiate(service).await;
        add_funding(service, &sender, 3, false);

        let open_resp = service.open(open_req).await.expect("open");
        sender.got_open_response(&open_resp).expect("open response");

        (sender, open_resp.auth_token)
    }

    #[tokio::test]
    async fn test_open_send_close_flow() {
        let service = test_service();
        let (mut sender, token) = open_channel(&service).await;

        assert!(!token.is_empty());
        service.authorize(FUNDING_TXID, FUNDING_VOUT, &token).expect("token valid");

        let record = service.get(FUNDING_TXID, FUNDING_VOUT).await.expect("record");
        assert_eq!(record.state.status, Status::Open);
        assert_eq!(record.state.capacity, TEST_CAPACITY);
        // Tip 1000, 3 confirmations: mined at height 998
        assert_eq!(record.state.block_height, 998);

        // Validate then pay
        let blob = payment_blob(1000);
        let valid = service
            .validate(ValidateRequest {
                txid: FUNDING_TXID.into(),
                vout: FUNDING_VOUT,
                payment: blob.clone(),
            })
            .await
            .expect("validate");
        assert!(valid.valid);

        let send_req = sender.get_send_request(1000, &blob).expect("send request");
        let resp = service.send(send_req).await.expect("send");
        sender.got_send_response(1000, &blob, &resp).expect("send response");

        let record = service.get(FUNDING_TXID, FUNDING_VOUT).await.expect("record");
        assert_eq!(record.state.balance, 1000);
        assert_eq!(record.state.count, 1);
        assert_eq!(record.state.payments_hash, sender.state().payments_hash);
        assert_eq!(
            service.list_payments(FUNDING_TXID, FUNDING_VOUT).await.expect("payments"),
            vec![blob]
        );

        // Close and broadcast
        let close_req = sender.get_close_request().expect("close request");
        let close_resp = service.close(close_req).await.expect("close");
        sender.got_close_response(&close_resp).expect("close response");

        let broadcasts = service.chain().broadcasts();
        assert_eq!(broadcasts.len(), 1);

        let status = service
            .status(StatusRequest { txid: FUNDING_TXID.into(), vout: FUNDING_VOUT })
            .await
            .expect("status");
        assert_eq!(status.status, Status::Closing.code());
        assert_eq!(status.balance, 1000);

        service.close_mined(FUNDING_TXID, FUNDING_VOUT).await.expect("mined");
        let record = service.get(FUNDING_TXID, FUNDING_VOUT).await.expect("record");
        assert_eq!(record.state.status, Status::Closed);
    }

    #[tokio::test]
    async fn test_open_requires_confirmed_utxo() {
        let service = test_service();

        // Unknown outpoint
        let (_, open_req) = negotiate(&service).await;
        assert!(matches!(
            service.open(open_req).await,
            Err(Error::Service(ServiceError::UtxoNotFound))
        ));
    }

    #[tokio::test]
    async fn test_open_requires_confirmations() {
        let service = test_service();
        let (sender, open_req) = negotiate(&service).await;
        add_funding(&service, &sender, 0, false);

        assert!(matches!(
            service.open(open_req).await,
            Err(Error::Service(ServiceError::TooFewConfirmations { have: 0, need: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_coinbase() {
        let service = test_service();
        let (sender, open_req) = negotiate(&service).await;
        add_funding(&service, &sender, 3, true);

        assert!(matches!(
            service.open(open_req).await,
            Err(Error::Service(ServiceError::CoinbaseForbidden))
        ));
    }

    #[tokio::test]
    async fn test_open_stale_funding_lands_in_closing() {
        let service = test_service();
        let (sender, open_req) = negotiate(&service).await;
        // Aged past the testnet soft timeout of 32 blocks
        add_funding(&service, &sender, 100, false);

        service.open(open_req).await.expect("open");
        let record = service.get(FUNDING_TXID, FUNDING_VOUT).await.expect("record");
        assert_eq!(record.state.status, Status::Closing);
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let service = test_service();
        let (_, token) = open_channel(&service).await;

        assert!(matches!(
            service.authorize(FUNDING_TXID, FUNDING_VOUT + 1, &token),
            Err(Error::Service(ServiceError::Unauthorized))
        ));
        assert!(matches!(
            service.authorize(FUNDING_TXID, FUNDING_VOUT, "bogus"),
            Err(Error::Service(ServiceError::Unauthorized))
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_foreign_target() {
        let service = test_service();
        let (_, _) = open_channel(&service).await;

        let target = address::encode(ADDR_RECEIVER, "elsewhere.org").expect("target");
        let blob = serde_json::to_vec(&Payment { amount: 1000, target }).expect("json");

        let resp = service
            .validate(ValidateRequest {
                txid: FUNDING_TXID.into(),
                vout: FUNDING_VOUT,
                payment: blob,
            })
            .await
            .expect("validate");
        assert!(!resp.valid);
    }

    #[tokio::test]
    async fn test_send_with_mismatched_amount_rejected() {
        let service = test_service();
        let (mut sender, _) = open_channel(&service).await;

        // Signature covers 1000 but the blob claims 2000
        let blob_signed = payment_blob(1000);
        let send_req = sender.get_send_request(1000, &blob_signed).expect("send request");
        let forged = SendRequest { payment: payment_blob(2000), ..send_req };

        assert!(matches!(
            service.send(forged).await,
            Err(Error::Channel(ChannelError::InvalidSignature))
        ));

        // Nothing advanced
        let record = service.get(FUNDING_TXID, FUNDING_VOUT).await.expect("record");
        assert_eq!(record.state.balance, 0);
        assert_eq!(record.state.count, 0);
    }

    #[tokio::test]
    async fn test_create_reserves_distinct_key_paths() {
        let service = test_service();

        let (sender_key, _) = test_keys();
        let mut sender =
            Sender::new(SenderConfig::default(), sender_key.privkey).expect("sender");
        let req = sender.get_create_request(ADDR_SENDER).expect("create request");

        let a = service.create(req.clone()).await.expect("create");
        let b = service.create(req).await.expect("create");

        assert_eq!(a.receiver_data, b"0".to_vec());
        assert_eq!(b.receiver_data, b"1".to_vec());
        // Fresh payouts are derived per channel
        assert_ne!(a.receiver_output, b.receiver_output);
        assert_ne!(a.receiver_pub_key, b.receiver_pub_key);
    }
}
