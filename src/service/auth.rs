//! Channel auth tokens
//!
//! On a successful open the service hands the sender a bearer token,
//! `base64(HMAC-SHA256(server_secret, channel_id))`, that must accompany
//! every later call for that channel. Tokens are deterministic per
//! channel and validated in constant time, so the registry never needs
//! to store them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Issues and validates per-channel bearer tokens
pub struct TokenIssuer {
    secret: Vec<u8>,
}

impl TokenIssuer {
    /// Creates an issuer over a read-only server secret
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn mac(&self, channel_id: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("hmac accepts keys of any length");
        mac.update(channel_id.as_bytes());
        mac
    }

    /// Token for a channel id
    pub fn issue(&self, channel_id: &str) -> String {
        STANDARD.encode(self.mac(channel_id).finalize().into_bytes())
    }

    /// Constant-time validation of a presented token
    pub fn validate(&self, channel_id: &str, token: &str) -> bool {
        let Ok(presented) = STANDARD.decode(token) else {
            return false;
        };
        self.mac(channel_id).verify_slice(&presented).is_ok()
    }
}
