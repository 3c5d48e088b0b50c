//! Per-network receiver policy
//!
//! Operational limits that depend on the network rather than on the
//! channel terms: how many confirmations a funding transaction needs
//! before a channel opens, and the safety margin the chain watcher keeps
//! ahead of the on-chain refund timeout.

use crate::channel::Net;

/// Operational policy for one network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Watcher safety margin in blocks ahead of the refund timeout
    pub soft_timeout: u64,
    /// Confirmations required on the funding transaction
    pub funding_min_conf: u64,
}

/// Policy table; mainnet values are the conservative baseline
pub fn policy_for(net: Net) -> Policy {
    match net {
        Net::Mainnet => Policy { soft_timeout: 144, funding_min_conf: 3 },
        Net::Testnet3 => Policy { soft_timeout: 32, funding_min_conf: 1 },
    }
}
