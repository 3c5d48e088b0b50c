//! Receiver service layer
//!
//! Everything the hosted receiving side needs on top of the channel
//! state machine: per-channel HD keys, auth tokens, per-net policy, the
//! payment target directory, the service facade over the registry and
//! chain backend, and the chain watcher that force-closes channels
//! nearing their refund timeout.

pub mod auth;
pub mod directory;
pub mod keys;
pub mod policy;
pub mod receiver;
pub mod watcher;

pub use auth::TokenIssuer;
pub use directory::Directory;
pub use keys::KeyChain;
pub use policy::{policy_for, Policy};
pub use receiver::{ReceiverService, ServiceConfig};
pub use watcher::{ChainWatcher, WATCH_INTERVAL};
