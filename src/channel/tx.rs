//! Settlement transaction builders
//!
//! This module builds and signs the two transactions that can spend a
//! channel's funding output: the cooperative closure transaction (both
//! signatures, IF branch) and the sender's unilateral refund transaction
//! (CSV-delayed ELSE branch). It also validates serialized settlement
//! transactions by executing the script interpreter, so acceptance here
//! matches exactly what a full node enforces at broadcast time.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::opcodes::{OP_FALSE, OP_TRUE};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, EcdsaSighashType, OutPoint, PrivateKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};

use crate::channel::state::{check_supported_address, Net, SharedState};
use crate::errors::{ChannelError, Result};
use crate::types::{PaymentsHash, DUST_THRESHOLD, MAX_STANDARD_TX_SIZE};

impl SharedState {
    /// Funding outpoint parsed from the recorded txid and vout
    pub fn funding_outpoint(&self) -> Result<OutPoint> {
        let txid: Txid = self.funding_txid.parse().map_err(|_| ChannelError::InvalidTxId)?;
        Ok(OutPoint { txid, vout: self.funding_vout })
    }

    /// Version-2 transaction skeleton spending the funding output
    fn spend_funding_tx(&self) -> Result<Transaction> {
        let input = TxIn {
            previous_output: self.funding_outpoint()?,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        };

        Ok(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![input],
            output: vec![],
        })
    }

    /// Builds the unsigned closure transaction for a balance and
    /// payments hash
    ///
    /// The receiver is paid `balance`, the sender the remaining capacity
    /// net of the close fee. Outputs below the dust threshold are
    /// omitted, so the result can have one or even zero payout outputs.
    /// A non-zero payments hash is committed through a data output so
    /// that signatures over the transaction also commit to the payment
    /// history.
    pub fn closure_tx(&self, balance: i64, payments_hash: PaymentsHash) -> Result<Transaction> {
        let receive_amount = balance;
        let sender_amount = self
            .capacity
            .checked_sub(balance)
            .and_then(|v| v.checked_sub(self.fee))
            .ok_or(ChannelError::InvalidAmount)?;

        let mut tx = self.spend_funding_tx()?;

        if receive_amount >= DUST_THRESHOLD {
            tx.output.push(pay_to(self.net, receive_amount, &self.receiver_output)?);
        }
        if sender_amount >= DUST_THRESHOLD {
            tx.output.push(pay_to(self.net, sender_amount, &self.sender_output)?);
        }
        if payments_hash != [0u8; 32] {
            tx.output.push(TxOut {
                value: Amount::ZERO,
                script_pubkey: ScriptBuf::new_op_return(payments_hash),
            });
        }

        Ok(tx)
    }

    /// Signs the closure transaction for a balance and payments hash
    ///
    /// Returns the DER-encoded signature with the SIGHASH_ALL byte
    /// appended, computed over the legacy P2SH sighash against the
    /// funding redeem script.
    pub(crate) fn sign_closure(
        &self,
        balance: i64,
        payments_hash: PaymentsHash,
        privkey: &PrivateKey,
    ) -> Result<Vec<u8>> {
        let tx = self.closure_tx(balance, payments_hash)?;
        let (script, _) = self.funding_script()?;
        raw_tx_in_signature(&tx, 0, &script, privkey)
    }

    /// Co-signs and serializes the closure transaction
    ///
    /// The sender's signature must already cover the same
    /// `(balance, payments_hash)` pair; the receiver contributes the
    /// second signature and assembles the final signature script
    /// selecting the cooperative branch.
    pub fn closure_tx_signed(
        &self,
        balance: i64,
        payments_hash: PaymentsHash,
        sender_sig: &[u8],
        receiver_privkey: &PrivateKey,
    ) -> Result<Vec<u8>> {
        let mut tx = self.closure_tx(balance, payments_hash)?;
        let (script, _) = self.funding_script()?;

        let receiver_sig = raw_tx_in_signature(&tx, 0, &script, receiver_privkey)?;

        // OP_FALSE is the CHECKMULTISIG dummy, the trailing OP_TRUE
        // selects the cooperative IF branch of the redeem script.
        let script_sig = Builder::new()
            .push_opcode(OP_FALSE)
            .push_slice(push_bytes(sender_sig)?)
            .push_slice(push_bytes(&receiver_sig)?)
            .push_opcode(OP_TRUE)
            .push_slice(push_bytes(script.as_bytes())?)
            .into_script();

        tx.input[0].script_sig = script_sig;

        Ok(serialize(&tx))
    }

    /// Builds, signs and serializes the sender's refund transaction
    ///
    /// The refund pays `capacity - fee` back to the sender's output and
    /// becomes valid once `timeout` relative blocks have elapsed; the
    /// input sequence carries the timeout so CHECKSEQUENCEVERIFY
    /// accepts the spend.
    pub fn refund_tx_signed(&self, sender_privkey: &PrivateKey) -> Result<Vec<u8>> {
        let amount =
            self.capacity.checked_sub(self.fee).ok_or(ChannelError::InvalidAmount)?;

        let mut tx = self.spend_funding_tx()?;
        tx.output.push(pay_to(self.net, amount, &self.sender_output)?);
        tx.input[0].sequence = Sequence::from_consensus(
            u32::try_from(self.timeout).map_err(|_| ChannelError::InvalidState("timeout".into()))?,
        );

        let (script, _) = self.funding_script()?;
        let sig = raw_tx_in_signature(&tx, 0, &script, sender_privkey)?;

        let sender_pubkey = self.sender_public_key()?;

        // OP_FALSE selects the timeout ELSE branch.
        let script_sig = Builder::new()
            .push_slice(push_bytes(&sig)?)
            .push_slice(sender_pubkey.inner.serialize())
            .push_opcode(OP_FALSE)
            .push_slice(push_bytes(script.as_bytes())?)
            .into_script();

        tx.input[0].script_sig = script_sig;

        Ok(serialize(&tx))
    }

    /// Validates a serialized settlement transaction
    ///
    /// The transaction must decode, spend exactly the funding output,
    /// satisfy the script interpreter against the expected P2SH
    /// scriptPubKey, stay under the standard size ceiling, and pay only
    /// to above-dust P2PKH or P2SH outputs (data outputs carrying the
    /// payments hash are exempt from the payout checks).
    ///
    /// # Errors
    /// * `ChannelError::InvalidSignature` - the script interpreter
    ///   rejected the spend
    /// * `ChannelError::InvalidTx` - any structural check failed
    pub fn validate_tx(&self, raw: &[u8]) -> Result<()> {
        let (script, _) = self.funding_script()?;
        let script_pubkey = ScriptBuf::new_p2sh(&script.script_hash());

        let tx: Transaction =
            deserialize(raw).map_err(|e| ChannelError::InvalidTx(e.to_string()))?;

        if tx.input.len() != 1 {
            return Err(ChannelError::InvalidTx("wrong number of inputs".into()).into());
        }

        let capacity =
            u64::try_from(self.capacity).map_err(|_| ChannelError::InvalidAmount)?;
        script_pubkey
            .verify(0, Amount::from_sat(capacity), raw)
            .map_err(|_| ChannelError::InvalidSignature)?;

        // The transaction must be standard or it will not be relayed.
        if raw.len() >= MAX_STANDARD_TX_SIZE {
            return Err(ChannelError::InvalidTx("transaction too large".into()).into());
        }
        for txout in &tx.output {
            if txout.script_pubkey.is_op_return() {
                continue;
            }
            if txout.value.to_sat() < DUST_THRESHOLD as u64 {
                return Err(ChannelError::InvalidTx("dust output".into()).into());
            }
            if !txout.script_pubkey.is_p2pkh() && !txout.script_pubkey.is_p2sh() {
                return Err(
                    ChannelError::InvalidTx("unsupported output script class".into()).into()
                );
            }
        }

        Ok(())
    }
}

/// Builds a payout output to a supported address
fn pay_to(net: Net, amount: i64, addr: &str) -> Result<TxOut> {
    let address = check_supported_address(net, addr)?;
    let value = u64::try_from(amount).map_err(|_| ChannelError::InvalidAmount)?;
    Ok(TxOut { value: Amount::from_sat(value), script_pubkey: address.script_pubkey() })
}

/// Signs one input of a transaction over the legacy P2SH sighash
fn raw_tx_in_signature(
    tx: &Transaction,
    input_index: usize,
    script: &ScriptBuf,
    privkey: &PrivateKey,
) -> Result<Vec<u8>> {
    let sighash = SighashCache::new(tx)
        .legacy_signature_hash(input_index, script, EcdsaSighashType::All.to_u32())
        .map_err(|e| ChannelError::Script(e.to_string()))?;

    let secp = Secp256k1::new();
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = secp.sign_ecdsa(&message, &privkey.inner);

    let mut bytes = signature.serialize_der().to_vec();
    bytes.push(EcdsaSighashType::All.to_u32() as u8);
    Ok(bytes)
}

/// Converts arbitrary bytes into a script push
fn push_bytes(bytes: &[u8]) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(bytes.to_vec())
        .map_err(|_| ChannelError::Script("push too large".into()).into())
}

/// Verifies the sender's signature recorded in a state by co-signing
/// the closure transaction and executing the script interpreter on it
pub(crate) fn validate_sender_sig(state: &SharedState, receiver_privkey: &PrivateKey) -> Result<()> {
    let raw = state.closure_tx_signed(
        state.balance,
        state.payments_hash,
        &state.sender_sig,
        receiver_privkey,
    )?;
    state.validate_tx(&raw)
}
