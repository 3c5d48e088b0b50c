//! Target directory
//!
//! Payments carry a moonbeam address naming their recipient. The
//! directory decides whether a target belongs to the hosted domain; a
//! hosted wallet would extend this with an account lookup.

use crate::address;

/// The set of payment targets this receiver accepts
#[derive(Debug, Clone)]
pub struct Directory {
    domain: String,
}

impl Directory {
    /// Creates a directory for a hosted domain
    pub fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into() }
    }

    /// Whether a payment target is addressable within this domain
    pub fn has_target(&self, target: &str) -> bool {
        match address::decode(target) {
            Some((_, domain)) => domain == self.domain,
            None => false,
        }
    }
}
