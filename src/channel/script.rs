//! Funding script construction
//!
//! The funding output is a P2SH wrapping a two-branch redeem script:
//!
//! ```text
//! IF
//!   2 <sender_pubkey> <receiver_pubkey> 2 CHECKMULTISIG
//! ELSE
//!   <timeout> CHECKSEQUENCEVERIFY DROP
//!   DUP HASH160 <hash160(sender_pubkey)> EQUALVERIFY CHECKSIG
//! ENDIF
//! ```
//!
//! The IF branch settles the channel cooperatively with both signatures.
//! The ELSE branch lets the sender recover the funds unilaterally once
//! `timeout` relative blocks have elapsed (BIP-112).

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::{
    OP_CHECKMULTISIG, OP_CHECKSIG, OP_CSV, OP_DROP, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY,
    OP_HASH160, OP_IF,
};
use bitcoin::script::Builder;
use bitcoin::{Address, PublicKey, ScriptBuf};

use crate::channel::state::SharedState;
use crate::errors::{ChannelError, Result};

/// Builds the funding redeem script for a channel
///
/// # Arguments
/// * `sender_pubkey` - Sender's compressed public key
/// * `receiver_pubkey` - Receiver's compressed public key
/// * `timeout` - Relative refund timeout in blocks
pub fn funding_script(
    sender_pubkey: &PublicKey,
    receiver_pubkey: &PublicKey,
    timeout: i64,
) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_IF)
        .push_int(2)
        .push_slice(sender_pubkey.inner.serialize())
        .push_slice(receiver_pubkey.inner.serialize())
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .push_opcode(OP_ELSE)
        .push_int(timeout)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(sender_pubkey.pubkey_hash().to_byte_array())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script()
}

impl SharedState {
    /// Redeem script and P2SH funding address for this channel's terms
    ///
    /// Both parties derive these independently from the shared state;
    /// the sender verifies the receiver's advertised funding address
    /// against this computation before funding anything.
    ///
    /// # Errors
    /// * `ChannelError::InvalidPubKey` - either stored pubkey is malformed
    /// * `ChannelError::Script` - the redeem script exceeds P2SH limits
    pub fn funding_script(&self) -> Result<(ScriptBuf, Address)> {
        let sender_pubkey = self.sender_public_key()?;
        let receiver_pubkey = self.receiver_public_key()?;

        let script = funding_script(&sender_pubkey, &receiver_pubkey, self.timeout);
        let address = Address::p2sh(&script, self.net.network())
            .map_err(|e| ChannelError::Script(e.to_string()))?;

        Ok((script, address))
    }
}
