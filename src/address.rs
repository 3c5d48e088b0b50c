//! Moonbeam address handling
//!
//! A moonbeam address embeds a bitcoin payout address and the hosted
//! domain it is reachable at:
//!
//! ```text
//! <bitcoin-addr>+mb<V><CC>@<domain>
//! ```
//!
//! where `<V>` is the first character and `<CC>` the last four characters
//! of `Base58Check_v1(<bitcoin-addr> + "+mb@" + <domain>)`. The embedded
//! checksum covers the whole pair, so a single-character edit anywhere in
//! the address is detected with overwhelming probability.

use bitcoin::base58;

use crate::errors::{ChannelError, Result};

/// Version byte of the moonbeam checksum encoding
const CHECKSUM_VERSION: u8 = 1;

/// Infix separating the bitcoin address from the checksum
const INFIX: &str = "+mb";

/// Encodes a moonbeam address for a bitcoin address and domain
///
/// # Errors
/// * `ChannelError::InvalidAddress` - the bitcoin address fails
///   base58check, or the domain contains `@`
pub fn encode(bitcoin_addr: &str, domain: &str) -> Result<String> {
    if base58::decode_check(bitcoin_addr).is_err() {
        return Err(ChannelError::InvalidAddress.into());
    }
    if domain.contains('@') {
        return Err(ChannelError::InvalidAddress.into());
    }

    let mut payload = vec![CHECKSUM_VERSION];
    payload.extend_from_slice(format!("{bitcoin_addr}{INFIX}@{domain}").as_bytes());
    let encoded = base58::encode_check(&payload);

    let version = &encoded[..1];
    let checksum = &encoded[encoded.len() - 4..];

    Ok(format!("{bitcoin_addr}{INFIX}{version}{checksum}@{domain}"))
}

/// Decodes a moonbeam address into its bitcoin address and domain
///
/// Decoding splits the address, re-encodes the components and requires
/// exact equality, which validates the checksum. Returns `None` for
/// anything that does not round-trip.
pub fn decode(addr: &str) -> Option<(String, String)> {
    let at = addr.find('@')?;
    let (before, domain) = (&addr[..at], &addr[at + 1..]);

    let plus = before.find('+')?;
    let bitcoin_addr = &before[..plus];

    let expected = encode(bitcoin_addr, domain).ok()?;
    if addr != expected {
        return None;
    }

    Some((bitcoin_addr.to_string(), domain.to_string()))
}
