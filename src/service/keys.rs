//! HD key chain for the receiver service
//!
//! The receiver derives one child key per channel from a process-wide
//! master extended private key; the child index is the `key_path`
//! recorded with the channel. Child keys are never cached, they are
//! re-derived from the path on each use. The master key material is
//! wiped when the chain is dropped.

use std::fmt;

use bitcoin::bip32::{ChildNumber, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::PrivateKey;
use zeroize::Zeroize;

use crate::channel::Net;
use crate::errors::{Result, ServiceError};

/// Process-wide master key, immutable after start
pub struct KeyChain {
    master: Xpriv,
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain").field("master", &"<redacted>").finish()
    }
}

impl KeyChain {
    /// Wraps an existing master extended private key
    pub fn new(master: Xpriv) -> Self {
        Self { master }
    }

    /// Derives a fresh master key from seed bytes
    pub fn from_seed(net: Net, seed: &[u8]) -> Result<Self> {
        let master = Xpriv::new_master(net.network(), seed)
            .map_err(|e| ServiceError::KeyDerivation(e.to_string()))?;
        Ok(Self { master })
    }

    /// Re-derives the channel key at a key path
    pub fn child_key(&self, path: u32) -> Result<PrivateKey> {
        let secp = Secp256k1::new();
        let child = ChildNumber::from_normal_idx(path)
            .map_err(|e| ServiceError::KeyDerivation(e.to_string()))?;
        let xpriv = self
            .master
            .derive_priv(&secp, &[child])
            .map_err(|e| ServiceError::KeyDerivation(e.to_string()))?;
        Ok(PrivateKey::new(xpriv.private_key, self.master.network))
    }
}

impl Zeroize for KeyChain {
    fn zeroize(&mut self) {
        // Wipe every secret-bearing component of the Xpriv. Depth,
        // child number and network are public parameters.
        self.master.depth.zeroize();
        {
            let fingerprint: &mut [u8; 4] = self.master.parent_fingerprint.as_mut();
            fingerprint.zeroize();
        }
        self.master.private_key.non_secure_erase();
        {
            let chain_code: &mut [u8; 32] = self.master.chain_code.as_mut();
            chain_code.zeroize();
        }
    }
}

impl Drop for KeyChain {
    fn drop(&mut self) {
        self.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_key_is_deterministic() {
        let keys = KeyChain::from_seed(Net::Testnet3, &[7u8; 32]).expect("seed");

        let a = keys.child_key(0).expect("derive");
        let b = keys.child_key(0).expect("derive");
        assert_eq!(a.inner, b.inner);

        let c = keys.child_key(1).expect("derive");
        assert_ne!(a.inner, c.inner);
    }

    #[test]
    fn test_zeroize_wipes_chain_code() {
        let mut keys = KeyChain::from_seed(Net::Testnet3, &[7u8; 32]).expect("seed");
        assert_ne!(*keys.master.chain_code.as_bytes(), [0u8; 32]);

        keys.zeroize();
        assert_eq!(*keys.master.chain_code.as_bytes(), [0u8; 32]);
    }
}
